//! Integrity algorithms for normal-mode encrypted payloads
//!
//! Truncated HMACs as defined in RFC 2404 and RFC 4868.

use super::prf::hmac_digest;
use super::IkeIntegrity;
use crate::ipsec::ikev2::proposal::IntegTransformId;
use crate::ipsec::{Error, Result};
use hmac::Hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

/// Integrity algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntegrityAlgorithm {
    /// HMAC-SHA1-96
    HmacSha1_96,
    /// HMAC-SHA2-256-128
    HmacSha256_128,
    /// HMAC-SHA2-384-192
    HmacSha384_192,
    /// HMAC-SHA2-512-256
    HmacSha512_256,
}

impl IntegrityAlgorithm {
    /// Map a negotiated integrity transform to its implementation
    pub fn from_transform(id: IntegTransformId) -> Option<Self> {
        match id {
            IntegTransformId::HmacSha1_96 => Some(IntegrityAlgorithm::HmacSha1_96),
            IntegTransformId::HmacSha256_128 => Some(IntegrityAlgorithm::HmacSha256_128),
            IntegTransformId::HmacSha384_192 => Some(IntegrityAlgorithm::HmacSha384_192),
            IntegTransformId::HmacSha512_256 => Some(IntegrityAlgorithm::HmacSha512_256),
            _ => None,
        }
    }

    /// Truncated output length in bytes
    pub fn checksum_len(self) -> usize {
        match self {
            IntegrityAlgorithm::HmacSha1_96 => 12,
            IntegrityAlgorithm::HmacSha256_128 => 16,
            IntegrityAlgorithm::HmacSha384_192 => 24,
            IntegrityAlgorithm::HmacSha512_256 => 32,
        }
    }

    /// Key length in bytes
    pub fn key_len(self) -> usize {
        match self {
            IntegrityAlgorithm::HmacSha1_96 => 20,
            IntegrityAlgorithm::HmacSha256_128 => 32,
            IntegrityAlgorithm::HmacSha384_192 => 48,
            IntegrityAlgorithm::HmacSha512_256 => 64,
        }
    }

    /// Compute the truncated checksum
    pub fn compute(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if key.len() != self.key_len() {
            return Err(Error::InvalidKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            });
        }

        let mut full = match self {
            IntegrityAlgorithm::HmacSha1_96 => hmac_digest::<Hmac<Sha1>>(key, data)?,
            IntegrityAlgorithm::HmacSha256_128 => hmac_digest::<Hmac<Sha256>>(key, data)?,
            IntegrityAlgorithm::HmacSha384_192 => hmac_digest::<Hmac<Sha384>>(key, data)?,
            IntegrityAlgorithm::HmacSha512_256 => hmac_digest::<Hmac<Sha512>>(key, data)?,
        };
        full.truncate(self.checksum_len());
        Ok(full)
    }
}

impl IkeIntegrity for IntegrityAlgorithm {
    fn checksum_len(&self) -> usize {
        IntegrityAlgorithm::checksum_len(*self)
    }

    fn key_len(&self) -> usize {
        IntegrityAlgorithm::key_len(*self)
    }

    fn sign(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        self.compute(key, data)
    }

    fn verify(&self, key: &[u8], data: &[u8], checksum: &[u8]) -> Result<bool> {
        let expected = self.compute(key, data)?;
        if expected.len() != checksum.len() {
            return Ok(false);
        }
        Ok(bool::from(expected.ct_eq(checksum)))
    }
}
