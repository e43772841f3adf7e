//! Error types for IKEv2 operations
//!
//! Protocol errors map 1:1 to IKEv2 error notify types (RFC 7296 Section 3.10.1).
//! The remaining variants are local failures that never reach the wire.

use crate::ipsec::ikev2::constants::notify;
use ike_platform::PlatformError;
use std::fmt;

/// Result type for IKEv2 operations
pub type Result<T> = std::result::Result<T, Error>;

/// IKEv2 protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Critical payload types this implementation does not understand
    UnsupportedCriticalPayload(Vec<u8>),

    /// Unrecognized destination IKE SPI
    InvalidIkeSpi,

    /// Peer speaks a newer major version
    UnsupportedVersion(u8),

    /// Malformed or out-of-range message content
    InvalidSyntax(String),

    /// Message ID outside the expected window
    InvalidMessageId(u32),

    /// ESP/AH packet with unrecognized SPI
    InvalidSpi(u32),

    /// No acceptable proposal found in negotiation
    NoProposalChosen,

    /// KE payload carries a D-H group other than the one selected
    InvalidKe {
        /// D-H group the responder accepts
        dh_group: u16,
    },

    /// AUTH payload did not verify or uses an unsupported method
    AuthenticationFailed(String),

    /// Peer requires a single traffic selector pair
    SinglePairRequired,

    /// Peer refuses additional Child SAs on this IKE SA
    NoAdditionalSas,

    /// Internal address assignment failed
    InternalAddressFailure,

    /// Configuration payload required but missing
    FailedCpRequired,

    /// Traffic selectors not acceptable
    TsUnacceptable,

    /// Packet did not match the selectors of the Child SA with this SPI
    InvalidSelectors(u32),

    /// Transient failure, retry later
    TemporaryFailure,

    /// Child SA with this SPI not found
    ChildSaNotFound(u32),

    /// Error notify with a type this implementation does not know
    UnrecognizedNotifyError(u16),

    /// Integrity check or decryption of an encrypted payload failed
    DecryptionFailed,

    /// Cryptographic primitive failure
    CryptoError(String),

    /// Invalid key length
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid IV length
    InvalidIvLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid packet length
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Buffer too short for operation
    BufferTooShort {
        /// Required length
        required: usize,
        /// Available length
        available: usize,
    },

    /// Caller supplied an invalid argument or configuration
    InvalidParameter(String),

    /// Operation not valid for this message or object state
    InvalidState(String),

    /// SPI or other resource could not be reserved
    ResourceUnavailable(String),

    /// Internal error (should not happen)
    Internal(String),
}

impl Error {
    /// Message used for truncated or overrunning payload data
    pub const MALFORMED_PAYLOAD: &'static str = "Malformed IKE Payload";

    /// Shorthand for `Error::InvalidSyntax`
    pub fn syntax(msg: impl Into<String>) -> Self {
        Error::InvalidSyntax(msg.into())
    }

    /// Normalize internal buffer shortfalls to a syntax error
    ///
    /// Decoders read through bounds-checked helpers that report
    /// `BufferTooShort`/`InvalidLength`. On the wire both are the peer's
    /// fault and surface as INVALID_SYNTAX.
    pub fn into_syntax(self) -> Self {
        match self {
            Error::BufferTooShort { .. } | Error::InvalidLength { .. } => {
                Error::InvalidSyntax(Self::MALFORMED_PAYLOAD.to_string())
            }
            other => other,
        }
    }

    /// Wire notify type for protocol errors, `None` for local failures
    pub fn notify_type(&self) -> Option<u16> {
        let code = match self {
            Error::UnsupportedCriticalPayload(_) => notify::UNSUPPORTED_CRITICAL_PAYLOAD,
            Error::InvalidIkeSpi => notify::INVALID_IKE_SPI,
            Error::UnsupportedVersion(_) => notify::INVALID_MAJOR_VERSION,
            Error::InvalidSyntax(_) => notify::INVALID_SYNTAX,
            Error::InvalidMessageId(_) => notify::INVALID_MESSAGE_ID,
            Error::InvalidSpi(_) => notify::INVALID_SPI,
            Error::NoProposalChosen => notify::NO_PROPOSAL_CHOSEN,
            Error::InvalidKe { .. } => notify::INVALID_KE_PAYLOAD,
            Error::AuthenticationFailed(_) => notify::AUTHENTICATION_FAILED,
            Error::SinglePairRequired => notify::SINGLE_PAIR_REQUIRED,
            Error::NoAdditionalSas => notify::NO_ADDITIONAL_SAS,
            Error::InternalAddressFailure => notify::INTERNAL_ADDRESS_FAILURE,
            Error::FailedCpRequired => notify::FAILED_CP_REQUIRED,
            Error::TsUnacceptable => notify::TS_UNACCEPTABLE,
            Error::InvalidSelectors(_) => notify::INVALID_SELECTORS,
            Error::TemporaryFailure => notify::TEMPORARY_FAILURE,
            Error::ChildSaNotFound(_) => notify::CHILD_SA_NOT_FOUND,
            _ => return None,
        };
        Some(code)
    }

    /// Notification data carried with the error notify
    pub fn notify_data(&self) -> Vec<u8> {
        match self {
            Error::UnsupportedCriticalPayload(types) => types.iter().take(1).copied().collect(),
            Error::UnsupportedVersion(_) => vec![crate::ipsec::ikev2::constants::IKE_MAJOR_VERSION],
            Error::InvalidMessageId(id) => id.to_be_bytes().to_vec(),
            Error::InvalidSpi(spi) => spi.to_be_bytes().to_vec(),
            Error::InvalidKe { dh_group } => dh_group.to_be_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Whether this is an IKE protocol error with a wire representation
    pub fn is_protocol_error(&self) -> bool {
        self.notify_type().is_some()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedCriticalPayload(types) => {
                write!(f, "Unsupported critical payload types: {:?}", types)
            }
            Error::InvalidIkeSpi => write!(f, "Invalid IKE SPI"),
            Error::UnsupportedVersion(v) => {
                write!(f, "Unsupported IKE major version: {}", v)
            }
            Error::InvalidSyntax(msg) => write!(f, "Invalid syntax: {}", msg),
            Error::InvalidMessageId(id) => write!(f, "Invalid message ID: {}", id),
            Error::InvalidSpi(spi) => write!(f, "Invalid SPI: 0x{:08x}", spi),
            Error::NoProposalChosen => {
                write!(f, "No acceptable proposal found in negotiation")
            }
            Error::InvalidKe { dh_group } => {
                write!(f, "Invalid KE payload, expected D-H group {}", dh_group)
            }
            Error::AuthenticationFailed(msg) => {
                write!(f, "Authentication failed: {}", msg)
            }
            Error::SinglePairRequired => write!(f, "Single traffic selector pair required"),
            Error::NoAdditionalSas => write!(f, "No additional SAs accepted"),
            Error::InternalAddressFailure => write!(f, "Internal address assignment failed"),
            Error::FailedCpRequired => write!(f, "Configuration payload required"),
            Error::TsUnacceptable => write!(f, "Traffic selectors unacceptable"),
            Error::InvalidSelectors(spi) => {
                write!(f, "Invalid selectors for SPI 0x{:08x}", spi)
            }
            Error::TemporaryFailure => write!(f, "Temporary failure"),
            Error::ChildSaNotFound(spi) => write!(f, "Child SA not found: 0x{:08x}", spi),
            Error::UnrecognizedNotifyError(t) => {
                write!(f, "Unrecognized error notify type: {}", t)
            }
            Error::DecryptionFailed => {
                write!(f, "Message authentication or decryption failed")
            }
            Error::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            Error::InvalidKeyLength { expected, actual } => {
                write!(f, "Invalid key length: expected {}, got {}", expected, actual)
            }
            Error::InvalidIvLength { expected, actual } => {
                write!(f, "Invalid IV length: expected {}, got {}", expected, actual)
            }
            Error::InvalidLength { expected, actual } => {
                write!(
                    f,
                    "Invalid length: expected {}, got {}",
                    expected, actual
                )
            }
            Error::BufferTooShort {
                required,
                available,
            } => {
                write!(
                    f,
                    "Buffer too short: need {} bytes, have {}",
                    required, available
                )
            }
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<PlatformError> for Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Config(msg) => Error::InvalidParameter(msg),
            PlatformError::ResourceUnavailable(msg) => Error::ResourceUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::syntax("test");
        assert_eq!(err.to_string(), "Invalid syntax: test");

        let err = Error::UnsupportedVersion(3);
        assert_eq!(err.to_string(), "Unsupported IKE major version: 3");

        let err = Error::InvalidLength {
            expected: 10,
            actual: 5,
        };
        assert_eq!(err.to_string(), "Invalid length: expected 10, got 5");
    }

    #[test]
    fn test_error_clone() {
        let err1 = Error::InvalidKe { dh_group: 14 };
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }

    #[test]
    fn test_into_syntax_normalizes_buffer_errors() {
        let err = Error::BufferTooShort {
            required: 100,
            available: 50,
        };
        assert_eq!(
            err.into_syntax(),
            Error::InvalidSyntax("Malformed IKE Payload".to_string())
        );

        let err = Error::NoProposalChosen;
        assert_eq!(err.into_syntax(), Error::NoProposalChosen);
    }

    #[test]
    fn test_notify_type_mapping() {
        assert_eq!(Error::syntax("x").notify_type(), Some(7));
        assert_eq!(Error::NoProposalChosen.notify_type(), Some(14));
        assert_eq!(Error::InvalidKe { dh_group: 14 }.notify_type(), Some(17));
        assert_eq!(Error::ChildSaNotFound(1).notify_type(), Some(44));
        assert_eq!(Error::DecryptionFailed.notify_type(), None);
        assert!(!Error::Internal("x".into()).is_protocol_error());
    }

    #[test]
    fn test_notify_data() {
        assert_eq!(Error::InvalidKe { dh_group: 14 }.notify_data(), vec![0, 14]);
        assert_eq!(
            Error::UnsupportedCriticalPayload(vec![50, 51]).notify_data(),
            vec![50]
        );
        assert_eq!(Error::UnsupportedVersion(3).notify_data(), vec![2]);
        assert!(Error::NoProposalChosen.notify_data().is_empty());
    }

    #[test]
    fn test_platform_error_conversion() {
        let err: Error = PlatformError::ResourceUnavailable("full".into()).into();
        assert_eq!(err, Error::ResourceUnavailable("full".to_string()));

        let err: Error = PlatformError::Config("width".into()).into();
        assert_eq!(err, Error::InvalidParameter("width".to_string()));
    }
}
