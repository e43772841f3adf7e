//! IKEv2 protocol implementation.
//!
//! This crate provides the message layer of the Internet Key Exchange
//! protocol version 2:
//!
//! - **Codec** - header, generic payload chain and every typed payload
//! - **Negotiation** - SA proposal verification and Child SA D-H accommodation
//! - **Authentication** - signed octets, PSK and digital signature AUTH data
//! - **Encryption** - SK/SKF payload protection, fragmentation and reassembly
//!
//! # Features
//!
//! - `ipsec` (default) - IKEv2 codec and negotiation
//! - `serde` - `Serialize`/`Deserialize` on configuration and algorithm types
//!
//! # Example
//!
//! ```rust
//! use ike_proto::ipsec::ikev2::{ExchangeType, IkeHeader, IkeMessage, IkePayload, NoncePayload, PayloadType};
//!
//! let header = IkeHeader::new(
//!     0x0102_0304_0506_0708,
//!     0,
//!     PayloadType::Nonce,
//!     ExchangeType::IkeSaInit,
//!     false,
//!     true,
//!     0,
//! );
//! let nonce = NoncePayload::new(vec![0xAB; 32]).unwrap();
//! let message = IkeMessage::new(header, vec![IkePayload::Nonce(nonce)]);
//!
//! let packet = message.encode().unwrap();
//! assert_eq!(packet.len(), 28 + 4 + 32);
//! ```
//!
//! # Security
//!
//! - All cryptographic operations use vetted libraries (`ring`, RustCrypto)
//! - Constant-time checksum comparison
//! - Secure memory handling with `zeroize`
//! - Fuzz target for the inbound decoder
//!
//! # References
//!
//! - [RFC 7296](https://datatracker.ietf.org/doc/html/rfc7296) - IKEv2
//! - [RFC 7383](https://datatracker.ietf.org/doc/html/rfc7383) - IKEv2 Message Fragmentation
//! - [RFC 7427](https://datatracker.ietf.org/doc/html/rfc7427) - Signature Authentication in IKEv2

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

#[cfg(feature = "ipsec")]
pub mod ipsec;
