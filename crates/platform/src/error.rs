//! Error types for platform collaborators

use std::fmt;

/// Unified error type for platform operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Configuration error
    Config(String),

    /// A resource (SPI, port, key slot) could not be reserved
    ResourceUnavailable(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PlatformError::ResourceUnavailable(msg) => {
                write!(f, "Resource unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for PlatformError {}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::ResourceUnavailable("SPI 0x1234 in use".to_string());
        assert_eq!(err.to_string(), "Resource unavailable: SPI 0x1234 in use");

        let err = PlatformError::Config("bad width".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad width");
    }

    #[test]
    fn test_result_type() {
        fn example() -> PlatformResult<u64> {
            Ok(42)
        }

        assert_eq!(example().unwrap(), 42);
    }
}
