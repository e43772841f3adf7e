//! IKE Fragmentation Configuration
//!
//! Configuration and builder for outbound message fragmentation (RFC 7383).

use super::ikev2::constants::{IKE_HEADER_SIZE, PAYLOAD_HEADER_SIZE, SKF_SUBHEADER_SIZE};
use super::{Error, Result};

/// Default maximum fragment size
///
/// Conservative value for IPv6 paths (RFC 7383 Section 2.5.1).
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 1280;

/// Largest fragment size expressible in an IKE message
pub const MAX_FRAGMENT_SIZE: usize = 65535;

/// Outbound fragmentation settings
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentationConfig {
    /// Whether the peer announced IKEV2_FRAGMENTATION_SUPPORTED
    pub supported: bool,

    /// Maximum size of one encoded IKE packet
    pub max_fragment_size: usize,
}

impl Default for FragmentationConfig {
    fn default() -> Self {
        FragmentationConfig {
            supported: false,
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
        }
    }
}

impl FragmentationConfig {
    /// Create builder for fragmentation configuration
    pub fn builder() -> FragmentationConfigBuilder {
        FragmentationConfigBuilder::new()
    }

    /// Fragmentation enabled with the given packet size
    pub fn enabled(max_fragment_size: usize) -> Result<Self> {
        Self::builder()
            .with_supported(true)
            .with_max_fragment_size(max_fragment_size)
            .build()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_fragment_size == 0 || self.max_fragment_size > MAX_FRAGMENT_SIZE {
            return Err(Error::InvalidParameter(format!(
                "max_fragment_size must be in 1..={}, got {}",
                MAX_FRAGMENT_SIZE, self.max_fragment_size
            )));
        }
        Ok(())
    }

    /// Plaintext bytes that fit into one SKF fragment
    ///
    /// ```text
    /// frag_size - IKE header - generic header - SKF sub-header - IV - checksum - block size
    /// ```
    ///
    /// The block size is subtracted in full to leave room for padding.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if no plaintext fits
    pub fn max_plaintext_per_fragment(
        &self,
        iv_len: usize,
        checksum_len: usize,
        block_size: usize,
    ) -> Result<usize> {
        let overhead = IKE_HEADER_SIZE
            + PAYLOAD_HEADER_SIZE
            + SKF_SUBHEADER_SIZE
            + iv_len
            + checksum_len
            + block_size;

        match self.max_fragment_size.checked_sub(overhead) {
            Some(len) if len > 0 => Ok(len),
            _ => Err(Error::InvalidParameter(format!(
                "Max fragment size {} is too small for an IKE fragment",
                self.max_fragment_size
            ))),
        }
    }
}

/// Builder for FragmentationConfig
#[derive(Default)]
pub struct FragmentationConfigBuilder {
    supported: Option<bool>,
    max_fragment_size: Option<usize>,
}

impl FragmentationConfigBuilder {
    /// Create new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the peer supports fragmentation
    pub fn with_supported(mut self, supported: bool) -> Self {
        self.supported = Some(supported);
        self
    }

    /// Set the maximum encoded packet size
    pub fn with_max_fragment_size(mut self, size: usize) -> Self {
        self.max_fragment_size = Some(size);
        self
    }

    /// Build configuration
    pub fn build(self) -> Result<FragmentationConfig> {
        let defaults = FragmentationConfig::default();
        let config = FragmentationConfig {
            supported: self.supported.unwrap_or(defaults.supported),
            max_fragment_size: self.max_fragment_size.unwrap_or(defaults.max_fragment_size),
        };

        config.validate()?;
        Ok(config)
    }
}
