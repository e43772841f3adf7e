//! IPSec key management (IKEv2 message layer)
//!
//! This module implements the message layer of the Internet Key Exchange
//! protocol version 2:
//!
//! - **Codec** - RFC 7296 header and payload chain
//! - **Negotiation** - SA proposal/transform selection rules
//! - **Authentication** - PSK and digital signature AUTH data (RFC 7427)
//! - **Fragmentation** - SKF payloads and reassembly (RFC 7383)
//!
//! # Architecture
//!
//! ```text
//! IkeMessage (header + payload list)
//!   ├── Payload chain codec (generic header, registry)
//!   │     └── Typed payloads (SA, KE, ID, CERT, AUTH, N, D, TS, CP, ...)
//!   ├── SK / SKF protection
//!   │     ├── Cipher (AES-CBC, AES-GCM, ChaCha20-Poly1305)
//!   │     └── Integrity (HMAC-SHA1/SHA2)
//!   └── Fragment reassembly
//!
//! SA Negotiation
//!   ├── Proposal verification (request vs response)
//!   ├── Child SA D-H accommodation
//!   └── SPI resources (platform SpiGenerator)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use ike_proto::ipsec::ikev2::{
//!     DecodeResult, ExchangeType, IkeHeader, IkeMessage, IkePayload, NoncePayload, PayloadType,
//! };
//!
//! let header = IkeHeader::new(
//!     0x1111_2222_3333_4444,
//!     0,
//!     PayloadType::Nonce,
//!     ExchangeType::IkeSaInit,
//!     false,
//!     true,
//!     0,
//! );
//! let message = IkeMessage::new(
//!     header,
//!     vec![IkePayload::Nonce(NoncePayload::new(vec![7; 32]).unwrap())],
//! );
//! let packet = message.encode().unwrap();
//!
//! let header = IkeHeader::from_bytes(&packet).unwrap();
//! match IkeMessage::decode(0, &header, &packet) {
//!     DecodeResult::Ok { message, .. } => assert_eq!(message.payloads.len(), 1),
//!     other => panic!("unexpected outcome: {:?}", other),
//! }
//! ```
//!
//! # References
//!
//! - [RFC 7296](https://datatracker.ietf.org/doc/html/rfc7296) - IKEv2 Protocol
//! - [RFC 7383](https://datatracker.ietf.org/doc/html/rfc7383) - IKEv2 Message Fragmentation
//! - [RFC 7427](https://datatracker.ietf.org/doc/html/rfc7427) - Signature Authentication
//! - [RFC 5282](https://datatracker.ietf.org/doc/html/rfc5282) - AEAD in IKEv2
//!
//! # Security
//!
//! - No unsafe code
//! - Constant-time checksum comparison
//! - Secure memory handling with zeroization
//! - Authentication and decryption failures are reported as one error kind

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod ikev2;
pub mod logging;

// Re-export commonly used types
pub use config::FragmentationConfig;
pub use error::{Error, Result};
