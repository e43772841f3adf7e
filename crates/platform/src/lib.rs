//! # IKE Platform
//!
//! Platform collaborators shared by the IKEv2 codec.
//!
//! This crate provides:
//! - Unified error type (`PlatformError`, `PlatformResult`)
//! - The `SpiGenerator` trait used by SA negotiation to reserve and release SPIs
//! - `RandomSpiGenerator`, an in-process reference allocator
//!
//! # Examples
//!
//! ```
//! use ike_platform::{RandomSpiGenerator, SpiGenerator};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! # fn main() -> ike_platform::PlatformResult<()> {
//! let generator = RandomSpiGenerator::ipsec();
//! let local = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
//!
//! let spi = generator.allocate(local)?;
//! assert!(generator.is_allocated(local, spi));
//!
//! generator.release(local, spi);
//! assert!(!generator.is_allocated(local, spi));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod traits;

pub use error::{PlatformError, PlatformResult};
pub use traits::{RandomSpiGenerator, SpiGenerator, SpiKind};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
