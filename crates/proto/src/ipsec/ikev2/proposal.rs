//! IKEv2 Proposal and Transform structures
//!
//! Implements the SA payload substructures defined in RFC 7296 Section 3.3.
//!
//! # Structure
//!
//! ```text
//! SA Payload
//!   └── Proposal(s)
//!         └── Transform(s)
//!               └── Attribute(s)
//! ```
//!
//! Inbound proposals keep every transform in one of five typed lists. A
//! response proposal is checked against the request with
//! [`SaProposal::is_negotiated_from`].

use super::constants::{ProtocolId, SPI_LEN_IKE, SPI_LEN_IPSEC};
use super::payload::{length_u16, ByteReader};
use super::spi::SpiResource;
use crate::ipsec::logging;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use ike_platform::{SpiGenerator, SpiKind};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

/// Key length value meaning "no Key Length attribute"
pub const KEY_LEN_UNSPECIFIED: u16 = 0;

/// 128-bit AES key
pub const KEY_LEN_AES_128: u16 = 128;

/// 192-bit AES key
pub const KEY_LEN_AES_192: u16 = 192;

/// 256-bit AES key
pub const KEY_LEN_AES_256: u16 = 256;

/// Transform Type (RFC 7296 Section 3.3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TransformType {
    /// Encryption Algorithm (ENCR)
    Encr = 1,
    /// Pseudo-random Function (PRF)
    Prf = 2,
    /// Integrity Algorithm (INTEG)
    Integ = 3,
    /// Diffie-Hellman Group (D-H)
    Dh = 4,
    /// Extended Sequence Numbers (ESN)
    Esn = 5,
}

impl TransformType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TransformType::Encr),
            2 => Some(TransformType::Prf),
            3 => Some(TransformType::Integ),
            4 => Some(TransformType::Dh),
            5 => Some(TransformType::Esn),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    fn is_supported_id(self, id: u16) -> bool {
        match self {
            TransformType::Encr => EncrTransformId::from_u16(id).is_some(),
            TransformType::Prf => PrfTransformId::from_u16(id).is_some(),
            TransformType::Integ => IntegTransformId::from_u16(id).is_some(),
            TransformType::Dh => DhTransformId::from_u16(id).is_some(),
            TransformType::Esn => EsnTransformId::from_u16(id).is_some(),
        }
    }
}

/// Transform ID for Encryption (ENCR) algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum EncrTransformId {
    /// 3DES (fixed 192-bit key)
    TripleDes = 3,
    /// AES-CBC
    AesCbc = 12,
    /// AES-CTR
    AesCtr = 13,
    /// AES-GCM with 8-byte ICV
    AesGcm8 = 18,
    /// AES-GCM with 12-byte ICV
    AesGcm12 = 19,
    /// AES-GCM with 16-byte ICV
    AesGcm16 = 20,
    /// ChaCha20-Poly1305 (fixed 256-bit key)
    ChaCha20Poly1305 = 28,
}

impl EncrTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            3 => Some(EncrTransformId::TripleDes),
            12 => Some(EncrTransformId::AesCbc),
            13 => Some(EncrTransformId::AesCtr),
            18 => Some(EncrTransformId::AesGcm8),
            19 => Some(EncrTransformId::AesGcm12),
            20 => Some(EncrTransformId::AesGcm16),
            28 => Some(EncrTransformId::ChaCha20Poly1305),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Check if this is an AEAD cipher
    pub fn is_aead(self) -> bool {
        matches!(
            self,
            EncrTransformId::AesGcm8
                | EncrTransformId::AesGcm12
                | EncrTransformId::AesGcm16
                | EncrTransformId::ChaCha20Poly1305
        )
    }

    /// Whether the algorithm takes a Key Length attribute
    pub fn has_variable_key_length(self) -> bool {
        !matches!(
            self,
            EncrTransformId::TripleDes | EncrTransformId::ChaCha20Poly1305
        )
    }

    /// Check a key length against the algorithm's rules
    ///
    /// Variable-key algorithms need 128, 192 or 256. Fixed-key algorithms
    /// need [`KEY_LEN_UNSPECIFIED`].
    pub fn validate_key_length(self, key_length: u16) -> std::result::Result<(), String> {
        if self.has_variable_key_length() {
            if key_length == KEY_LEN_UNSPECIFIED {
                return Err(format!(
                    "Must set Key Length value for encryption algorithm {}",
                    self.to_u16()
                ));
            }
            if !matches!(key_length, KEY_LEN_AES_128 | KEY_LEN_AES_192 | KEY_LEN_AES_256) {
                return Err(format!(
                    "Invalid key length {} for encryption algorithm {}",
                    key_length,
                    self.to_u16()
                ));
            }
        } else if key_length != KEY_LEN_UNSPECIFIED {
            return Err(format!(
                "Must not set Key Length value for encryption algorithm {}",
                self.to_u16()
            ));
        }
        Ok(())
    }
}

/// Transform ID for PRF algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum PrfTransformId {
    /// HMAC-SHA1
    HmacSha1 = 2,
    /// AES128-XCBC
    Aes128Xcbc = 4,
    /// HMAC-SHA2-256
    HmacSha256 = 5,
    /// HMAC-SHA2-384
    HmacSha384 = 6,
    /// HMAC-SHA2-512
    HmacSha512 = 7,
    /// AES128-CMAC
    Aes128Cmac = 8,
}

impl PrfTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            2 => Some(PrfTransformId::HmacSha1),
            4 => Some(PrfTransformId::Aes128Xcbc),
            5 => Some(PrfTransformId::HmacSha256),
            6 => Some(PrfTransformId::HmacSha384),
            7 => Some(PrfTransformId::HmacSha512),
            8 => Some(PrfTransformId::Aes128Cmac),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Integrity algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum IntegTransformId {
    /// No integrity (AEAD proposals)
    None = 0,
    /// HMAC-SHA1-96
    HmacSha1_96 = 2,
    /// AES-XCBC-96
    AesXcbc96 = 5,
    /// AES-CMAC-96
    AesCmac96 = 8,
    /// HMAC-SHA2-256-128 (128-bit ICV)
    HmacSha256_128 = 12,
    /// HMAC-SHA2-384-192 (192-bit ICV)
    HmacSha384_192 = 13,
    /// HMAC-SHA2-512-256 (256-bit ICV)
    HmacSha512_256 = 14,
}

impl IntegTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(IntegTransformId::None),
            2 => Some(IntegTransformId::HmacSha1_96),
            5 => Some(IntegTransformId::AesXcbc96),
            8 => Some(IntegTransformId::AesCmac96),
            12 => Some(IntegTransformId::HmacSha256_128),
            13 => Some(IntegTransformId::HmacSha384_192),
            14 => Some(IntegTransformId::HmacSha512_256),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Diffie-Hellman groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum DhTransformId {
    /// No key exchange
    None = 0,
    /// 1024-bit MODP Group
    Group2 = 2,
    /// 1536-bit MODP Group
    Group5 = 5,
    /// 2048-bit MODP Group
    Group14 = 14,
    /// 3072-bit MODP Group
    Group15 = 15,
    /// 4096-bit MODP Group
    Group16 = 16,
    /// Curve25519
    Group31 = 31,
}

impl DhTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(DhTransformId::None),
            2 => Some(DhTransformId::Group2),
            5 => Some(DhTransformId::Group5),
            14 => Some(DhTransformId::Group14),
            15 => Some(DhTransformId::Group15),
            16 => Some(DhTransformId::Group16),
            31 => Some(DhTransformId::Group31),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Length of the public value carried in a KE payload
    pub fn public_key_len(self) -> Option<usize> {
        match self {
            DhTransformId::None => None,
            DhTransformId::Group2 => Some(128),
            DhTransformId::Group5 => Some(192),
            DhTransformId::Group14 => Some(256),
            DhTransformId::Group15 => Some(384),
            DhTransformId::Group16 => Some(512),
            DhTransformId::Group31 => Some(32),
        }
    }
}

/// Transform ID for Extended Sequence Numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum EsnTransformId {
    /// 32-bit sequence numbers
    NoEsn = 0,
    /// 64-bit extended sequence numbers
    Esn = 1,
}

impl EsnTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(EsnTransformId::NoEsn),
            1 => Some(EsnTransformId::Esn),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform attribute (RFC 7296 Section 3.3.5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformAttribute {
    /// Key Length in bits, always TV encoded
    KeyLength(u16),
    /// Attribute type this implementation does not know
    Unrecognized {
        /// Attribute type (without the format bit)
        attr_type: u16,
        /// Whether the attribute used the TV format
        tv_format: bool,
        /// Raw value
        value: Vec<u8>,
    },
}

impl TransformAttribute {
    /// Key Length attribute type
    pub const KEY_LENGTH: u16 = 14;

    const FORMAT_TV: u16 = 0x8000;
    const TYPE_MASK: u16 = 0x7FFF;
    const TLV_HEADER_LEN: usize = 4;

    /// Attribute type code
    pub fn attr_type(&self) -> u16 {
        match self {
            TransformAttribute::KeyLength(_) => Self::KEY_LENGTH,
            TransformAttribute::Unrecognized { attr_type, .. } => *attr_type,
        }
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let format_and_type = reader.read_u16()?;
        let attr_type = format_and_type & Self::TYPE_MASK;

        if format_and_type & Self::FORMAT_TV != 0 {
            let value = reader.read_bytes(2)?;
            if attr_type == Self::KEY_LENGTH {
                return Ok(TransformAttribute::KeyLength(u16::from_be_bytes([value[0], value[1]])));
            }
            return Ok(TransformAttribute::Unrecognized {
                attr_type,
                tv_format: true,
                value: value.to_vec(),
            });
        }

        if attr_type == Self::KEY_LENGTH {
            return Err(Error::syntax("Wrong format in Transform Attribute"));
        }
        let length = reader.read_u16()? as usize;
        let value_len = length
            .checked_sub(Self::TLV_HEADER_LEN)
            .ok_or_else(|| Error::syntax(format!("Invalid Transform Attribute length: {}", length)))?;
        let value = reader.read_bytes(value_len)?;
        Ok(TransformAttribute::Unrecognized {
            attr_type,
            tv_format: false,
            value: value.to_vec(),
        })
    }

    fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            TransformAttribute::KeyLength(bits) => {
                buf.put_u16(Self::FORMAT_TV | Self::KEY_LENGTH);
                buf.put_u16(*bits);
            }
            TransformAttribute::Unrecognized {
                attr_type,
                tv_format: true,
                value,
            } => {
                buf.put_u16(Self::FORMAT_TV | attr_type);
                buf.put_slice(value);
            }
            TransformAttribute::Unrecognized { attr_type, value, .. } => {
                buf.put_u16(*attr_type);
                buf.put_u16(length_u16(Self::TLV_HEADER_LEN + value.len(), "Attribute length")?);
                buf.put_slice(value);
            }
        }
        Ok(())
    }
}

/// IKE Transform
///
/// Represents a single cryptographic algorithm choice. Equality compares
/// type, ID and key length.
#[derive(Debug, Clone)]
pub struct Transform {
    /// Transform type
    pub transform_type: TransformType,

    /// Transform ID
    pub transform_id: u16,

    /// Attributes (e.g., key length)
    pub attributes: Vec<TransformAttribute>,

    /// Recognized ID without unrecognized attributes
    pub is_supported: bool,
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.transform_type == other.transform_type
            && self.transform_id == other.transform_id
            && self.key_length() == other.key_length()
    }
}

impl Eq for Transform {}

impl Transform {
    const LAST: u8 = 0;
    const NOT_LAST: u8 = 3;
    const BASIC_LEN: usize = 8;

    fn basic(transform_type: TransformType, transform_id: u16) -> Self {
        Transform {
            transform_type,
            transform_id,
            attributes: Vec::new(),
            is_supported: true,
        }
    }

    /// Create encryption transform
    ///
    /// # Errors
    ///
    /// Returns `InvalidSyntax` if `key_length` breaks the algorithm's key
    /// length rules
    pub fn encr(id: EncrTransformId, key_length: u16) -> Result<Self> {
        id.validate_key_length(key_length).map_err(Error::InvalidSyntax)?;
        Ok(Transform::encr_unchecked(id, key_length))
    }

    fn encr_unchecked(id: EncrTransformId, key_length: u16) -> Self {
        let mut transform = Transform::basic(TransformType::Encr, id.to_u16());
        if key_length != KEY_LEN_UNSPECIFIED {
            transform.attributes.push(TransformAttribute::KeyLength(key_length));
        }
        transform
    }

    /// Create PRF transform
    pub fn prf(id: PrfTransformId) -> Self {
        Transform::basic(TransformType::Prf, id.to_u16())
    }

    /// Create integrity transform
    pub fn integ(id: IntegTransformId) -> Self {
        Transform::basic(TransformType::Integ, id.to_u16())
    }

    /// Create DH group transform
    pub fn dh(id: DhTransformId) -> Self {
        Transform::basic(TransformType::Dh, id.to_u16())
    }

    /// Create ESN transform
    pub fn esn(id: EsnTransformId) -> Self {
        Transform::basic(TransformType::Esn, id.to_u16())
    }

    /// Key Length attribute value, [`KEY_LEN_UNSPECIFIED`] if absent
    pub fn key_length(&self) -> u16 {
        self.attributes
            .iter()
            .find_map(|attr| match attr {
                TransformAttribute::KeyLength(bits) => Some(*bits),
                _ => None,
            })
            .unwrap_or(KEY_LEN_UNSPECIFIED)
    }

    /// Decode one transform substructure
    ///
    /// Returns `None` for a transform of an unrecognized type; its bytes are
    /// consumed.
    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Option<Self>> {
        let marker = reader.read_u8()?;
        if marker != Self::LAST && marker != Self::NOT_LAST {
            return Err(Error::syntax(format!(
                "Invalid value of Last Transform Substructure: {}",
                marker
            )));
        }
        reader.skip(1)?;
        let length = reader.read_u16()? as usize;
        let raw_type = reader.read_u8()?;
        reader.skip(1)?;
        let transform_id = reader.read_u16()?;

        let attr_len = length
            .checked_sub(Self::BASIC_LEN)
            .ok_or_else(|| Error::syntax(format!("Invalid Transform length: {}", length)))?;
        let mut attr_reader = ByteReader::new(reader.read_bytes(attr_len)?);

        let mut attributes = Vec::new();
        let mut seen = HashSet::new();
        while !attr_reader.is_empty() {
            let attribute = TransformAttribute::decode(&mut attr_reader)?;
            if !seen.insert(attribute.attr_type()) {
                return Err(Error::syntax(format!(
                    "There are multiple Attributes of the same type: {}",
                    attribute.attr_type()
                )));
            }
            attributes.push(attribute);
        }

        let Some(transform_type) = TransformType::from_u8(raw_type) else {
            return Ok(None);
        };

        let has_unrecognized_attribute = match transform_type {
            TransformType::Encr => attributes
                .iter()
                .any(|attr| matches!(attr, TransformAttribute::Unrecognized { .. })),
            // PRF, INTEG, D-H and ESN take no attributes at all
            _ => !attributes.is_empty(),
        };
        let is_supported =
            transform_type.is_supported_id(transform_id) && !has_unrecognized_attribute;

        let transform = Transform {
            transform_type,
            transform_id,
            attributes,
            is_supported,
        };

        if transform_type == TransformType::Encr && is_supported {
            if let Some(id) = EncrTransformId::from_u16(transform_id) {
                id.validate_key_length(transform.key_length())
                    .map_err(Error::InvalidSyntax)?;
            }
        }

        Ok(Some(transform))
    }

    /// Serialize transform substructure (RFC 7296 Section 3.3.2)
    ///
    /// Format:
    /// - Byte 0: Last/More flag (0 = last, 3 = more)
    /// - Byte 1: Reserved
    /// - Bytes 2-3: Transform Length
    /// - Byte 4: Transform Type
    /// - Byte 5: Reserved
    /// - Bytes 6-7: Transform ID
    /// - Bytes 8+: Attributes (if any)
    pub fn encode_to(&self, buf: &mut BytesMut, is_last: bool) -> Result<()> {
        let mut attrs = BytesMut::new();
        for attr in &self.attributes {
            attr.encode_to(&mut attrs)?;
        }

        buf.put_u8(if is_last { Self::LAST } else { Self::NOT_LAST });
        buf.put_u8(0);
        buf.put_u16(length_u16(Self::BASIC_LEN + attrs.len(), "Transform length")?);
        buf.put_u8(self.transform_type.to_u8());
        buf.put_u8(0);
        buf.put_u16(self.transform_id);
        buf.put_slice(&attrs);
        Ok(())
    }
}

/// The algorithm sets of one proposal, grouped by transform type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaProposal {
    /// IKE, AH or ESP
    pub protocol_id: ProtocolId,

    /// ENCR transforms
    pub encryption: Vec<Transform>,

    /// PRF transforms (IKE only)
    pub prf: Vec<Transform>,

    /// INTEG transforms
    pub integrity: Vec<Transform>,

    /// D-H transforms
    pub dh_groups: Vec<Transform>,

    /// ESN transforms (Child only)
    pub esn: Vec<Transform>,
}

impl SaProposal {
    fn empty(protocol_id: ProtocolId) -> Self {
        SaProposal {
            protocol_id,
            encryption: Vec::new(),
            prf: Vec::new(),
            integrity: Vec::new(),
            dh_groups: Vec::new(),
            esn: Vec::new(),
        }
    }

    /// Start an IKE SA proposal
    pub fn ike_builder() -> SaProposalBuilder {
        SaProposalBuilder::new(ProtocolId::Ike)
    }

    /// Start an ESP Child SA proposal
    pub fn child_builder() -> SaProposalBuilder {
        SaProposalBuilder::new(ProtocolId::Esp)
    }

    /// Whether this proposal negotiates an IKE SA
    pub fn is_ike(&self) -> bool {
        self.protocol_id == ProtocolId::Ike
    }

    /// Whether every transform is of a supported algorithm
    pub fn is_fully_supported(&self) -> bool {
        self.transforms().all(|t| t.is_supported)
    }

    /// All transforms in wire order (ENCR, PRF, INTEG, D-H, ESN)
    pub fn transforms(&self) -> impl Iterator<Item = &Transform> {
        self.encryption
            .iter()
            .chain(&self.prf)
            .chain(&self.integrity)
            .chain(&self.dh_groups)
            .chain(&self.esn)
    }

    /// D-H group IDs in offer order
    pub fn dh_group_ids(&self) -> Vec<u16> {
        self.dh_groups.iter().map(|t| t.transform_id).collect()
    }

    /// Copy of this proposal carrying exactly one D-H group
    pub fn with_dh_group(&self, dh_group: u16) -> Self {
        let mut copy = self.clone();
        copy.dh_groups = vec![Transform {
            transform_type: TransformType::Dh,
            transform_id: dh_group,
            attributes: Vec::new(),
            is_supported: DhTransformId::from_u16(dh_group).is_some(),
        }];
        copy
    }

    /// Whether this (response) proposal can be selected from `request`
    ///
    /// Both must use the same protocol. For every transform type the
    /// response must pick exactly one offered value, or both lists must be
    /// empty.
    pub fn is_negotiated_from(&self, request: &SaProposal) -> bool {
        self.is_negotiated_from_except_dh(request)
            && is_transform_selected_from(&self.dh_groups, &request.dh_groups)
    }

    /// Same as [`is_negotiated_from`](Self::is_negotiated_from) ignoring D-H
    pub fn is_negotiated_from_except_dh(&self, request: &SaProposal) -> bool {
        self.protocol_id == request.protocol_id
            && is_transform_selected_from(&self.encryption, &request.encryption)
            && is_transform_selected_from(&self.prf, &request.prf)
            && is_transform_selected_from(&self.integrity, &request.integrity)
            && is_transform_selected_from(&self.esn, &request.esn)
    }
}

fn is_transform_selected_from(selected: &[Transform], offered: &[Transform]) -> bool {
    if offered.is_empty() {
        return selected.is_empty();
    }
    selected.len() == 1 && offered.contains(&selected[0])
}

/// Builder for locally configured [`SaProposal`]s
#[derive(Debug, Clone)]
pub struct SaProposalBuilder {
    proposal: SaProposal,
    error: Option<String>,
}

impl SaProposalBuilder {
    fn new(protocol_id: ProtocolId) -> Self {
        SaProposalBuilder {
            proposal: SaProposal::empty(protocol_id),
            error: None,
        }
    }

    fn push(mut self, transform: Transform) -> Self {
        if self.error.is_some() {
            return self;
        }
        let list = match transform.transform_type {
            TransformType::Encr => &mut self.proposal.encryption,
            TransformType::Prf => &mut self.proposal.prf,
            TransformType::Integ => &mut self.proposal.integrity,
            TransformType::Dh => &mut self.proposal.dh_groups,
            TransformType::Esn => &mut self.proposal.esn,
        };
        if list.contains(&transform) {
            self.error = Some(format!(
                "Already added transform {:?} {}",
                transform.transform_type, transform.transform_id
            ));
        } else {
            list.push(transform);
        }
        self
    }

    /// Add an encryption algorithm
    pub fn add_encryption(mut self, id: EncrTransformId, key_length: u16) -> Self {
        match id.validate_key_length(key_length) {
            Ok(()) => self.push(Transform::encr_unchecked(id, key_length)),
            Err(msg) => {
                if self.error.is_none() {
                    self.error = Some(msg);
                }
                self
            }
        }
    }

    /// Add a PRF (IKE proposals only)
    pub fn add_prf(self, id: PrfTransformId) -> Self {
        self.push(Transform::prf(id))
    }

    /// Add an integrity algorithm
    pub fn add_integrity(self, id: IntegTransformId) -> Self {
        self.push(Transform::integ(id))
    }

    /// Add a D-H group
    pub fn add_dh_group(self, id: DhTransformId) -> Self {
        self.push(Transform::dh(id))
    }

    /// Add an ESN option (Child proposals only)
    pub fn add_esn(self, id: EsnTransformId) -> Self {
        self.push(Transform::esn(id))
    }

    /// Validate the algorithm combination and build the proposal
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when:
    /// - no encryption algorithm was added;
    /// - AEAD and normal-mode encryption are mixed;
    /// - an AEAD proposal carries an integrity algorithm other than none;
    /// - an IKE proposal lacks a PRF, a D-H group, or integrity for a
    ///   normal-mode cipher;
    /// - an IKE proposal carries ESN or a Child proposal carries a PRF.
    pub fn build(self) -> Result<SaProposal> {
        if let Some(e) = self.error {
            return Err(Error::InvalidParameter(e));
        }
        let mut proposal = self.proposal;

        if proposal.encryption.is_empty() {
            return Err(Error::InvalidParameter(
                "Encryption algorithm must be proposed".into(),
            ));
        }
        let aead_count = proposal
            .encryption
            .iter()
            .filter(|t| {
                EncrTransformId::from_u16(t.transform_id).map_or(false, EncrTransformId::is_aead)
            })
            .count();
        let is_aead = aead_count == proposal.encryption.len();
        if aead_count != 0 && !is_aead {
            return Err(Error::InvalidParameter(
                "Proposal cannot mix normal and combined-mode encryption algorithms".into(),
            ));
        }

        let none_integ = Transform::integ(IntegTransformId::None);
        if is_aead {
            if proposal.integrity.iter().any(|t| *t != none_integ) {
                return Err(Error::InvalidParameter(
                    "Only INTEGRITY_ALGORITHM_NONE can be proposed with combined-mode encryption"
                        .into(),
                ));
            }
        } else if proposal.integrity.contains(&none_integ) {
            return Err(Error::InvalidParameter(
                "INTEGRITY_ALGORITHM_NONE requires combined-mode encryption".into(),
            ));
        }

        if proposal.is_ike() {
            if proposal.prf.is_empty() {
                return Err(Error::InvalidParameter("PRF must be proposed for IKE SA".into()));
            }
            if proposal.dh_groups.is_empty() {
                return Err(Error::InvalidParameter(
                    "D-H group must be proposed for IKE SA".into(),
                ));
            }
            if !is_aead && proposal.integrity.is_empty() {
                return Err(Error::InvalidParameter(
                    "Integrity algorithm must be proposed with normal-mode encryption".into(),
                ));
            }
            if !proposal.esn.is_empty() {
                return Err(Error::InvalidParameter("ESN cannot be proposed for IKE SA".into()));
            }
        } else {
            if !proposal.prf.is_empty() {
                return Err(Error::InvalidParameter("PRF cannot be proposed for Child SA".into()));
            }
            if proposal.esn.is_empty() {
                proposal.esn.push(Transform::esn(EsnTransformId::NoEsn));
            }
        }

        Ok(proposal)
    }
}

/// IKE Proposal substructure
///
/// Equality ignores the owned SPI resource.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Proposal number (1-based)
    pub number: u8,

    /// SPI size in bytes (0, 4 or 8)
    pub spi_size: u8,

    /// SPI, absent when `spi_size` is 0
    pub spi: Option<u64>,

    /// Algorithm sets
    pub sa_proposal: SaProposal,

    /// Whether a transform of unrecognized type was dropped while decoding
    pub has_unrecognized_transform: bool,

    /// Locally reserved SPI backing `spi`
    pub spi_resource: Option<Arc<SpiResource>>,
}

impl PartialEq for Proposal {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            && self.spi_size == other.spi_size
            && self.spi == other.spi
            && self.sa_proposal == other.sa_proposal
            && self.has_unrecognized_transform == other.has_unrecognized_transform
    }
}

impl Eq for Proposal {}

impl Proposal {
    const LAST: u8 = 0;
    const NOT_LAST: u8 = 2;
    const HEADER_LEN: usize = 8;

    /// Proposal without SPI (initial IKE SA negotiation)
    pub fn without_spi(number: u8, sa_proposal: SaProposal) -> Self {
        Proposal {
            number,
            spi_size: 0,
            spi: None,
            sa_proposal,
            has_unrecognized_transform: false,
            spi_resource: None,
        }
    }

    /// Proposal whose SPI is backed by a reserved resource
    pub fn with_spi_resource(number: u8, sa_proposal: SaProposal, resource: SpiResource) -> Self {
        Proposal {
            number,
            spi_size: resource.kind().size() as u8,
            spi: Some(resource.spi()),
            sa_proposal,
            has_unrecognized_transform: false,
            spi_resource: Some(Arc::new(resource)),
        }
    }

    /// Protocol of this proposal
    pub fn protocol_id(&self) -> ProtocolId {
        self.sa_proposal.protocol_id
    }

    /// Whether this proposal negotiates an IKE SA
    pub fn is_ike(&self) -> bool {
        self.sa_proposal.is_ike()
    }

    /// Whether this response proposal can be selected from `request`
    ///
    /// The proposal numbers must match as well.
    pub fn is_negotiated_from(&self, request: &Proposal) -> bool {
        self.number == request.number && self.sa_proposal.is_negotiated_from(&request.sa_proposal)
    }

    /// Release the owned SPI resource, if any
    pub fn release_spi_resource(&mut self) {
        if let Some(resource) = self.spi_resource.take() {
            resource.release();
        }
    }

    /// Reserve the peer's SPI in `generator` unless a resource is already held
    ///
    /// IKE proposals without SPI need no reservation.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if the generator kind does not match the SPI size
    /// - `InvalidSyntax` for a Child proposal without SPI
    /// - the generator's error if the SPI is in use
    pub fn allocate_remote_spi(
        &mut self,
        generator: &Arc<dyn SpiGenerator>,
        remote: IpAddr,
    ) -> Result<()> {
        if self.spi_resource.is_some() {
            return Ok(());
        }
        let Some(spi) = self.spi else {
            if self.is_ike() {
                return Ok(());
            }
            return Err(Error::syntax("Child SA proposal without SPI"));
        };
        if generator.kind().size() != self.spi_size as usize {
            return Err(Error::InvalidParameter(format!(
                "SPI generator of kind {:?} cannot hold a {}-byte SPI",
                generator.kind(),
                self.spi_size
            )));
        }
        let resource = SpiResource::allocate_known(generator.clone(), remote, spi)?;
        self.spi_resource = Some(Arc::new(resource));
        Ok(())
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let marker = reader.read_u8()?;
        if marker != Self::LAST && marker != Self::NOT_LAST {
            return Err(Error::syntax(format!(
                "Invalid value of Last Proposal Substructure: {}",
                marker
            )));
        }
        reader.skip(1)?;
        let length = reader.read_u16()? as usize;
        let number = reader.read_u8()?;
        let raw_protocol = reader.read_u8()?;
        let spi_size = reader.read_u8()?;
        let transform_count = reader.read_u8()?;

        let protocol_id = ProtocolId::from_u8(raw_protocol)
            .ok_or_else(|| Error::syntax(format!("Unrecognized Protocol ID: {}", raw_protocol)))?;

        let body_len = length
            .checked_sub(Self::HEADER_LEN)
            .ok_or_else(|| Error::syntax(format!("Invalid Proposal length: {}", length)))?;
        let mut body = ByteReader::new(reader.read_bytes(body_len)?);

        let spi = match spi_size as usize {
            0 => None,
            SPI_LEN_IPSEC => Some(u64::from(body.read_u32()?)),
            SPI_LEN_IKE => Some(body.read_uint(SPI_LEN_IKE)?),
            _ => {
                return Err(Error::syntax(format!(
                    "Invalid value of spiSize in Proposal Substructure: {}",
                    spi_size
                )))
            }
        };

        let mut sa_proposal = SaProposal::empty(protocol_id);
        let mut has_unrecognized_transform = false;
        for _ in 0..transform_count {
            let Some(transform) = Transform::decode(&mut body)? else {
                has_unrecognized_transform = true;
                continue;
            };
            match transform.transform_type {
                TransformType::Encr => sa_proposal.encryption.push(transform),
                TransformType::Prf => sa_proposal.prf.push(transform),
                TransformType::Integ => sa_proposal.integrity.push(transform),
                TransformType::Dh => sa_proposal.dh_groups.push(transform),
                TransformType::Esn => sa_proposal.esn.push(transform),
            }
        }
        if !body.is_empty() {
            return Err(Error::syntax(format!(
                "Proposal {} has {} bytes beyond its transforms",
                number,
                body.remaining()
            )));
        }

        Ok(Proposal {
            number,
            spi_size,
            spi,
            sa_proposal,
            has_unrecognized_transform,
            spi_resource: None,
        })
    }

    /// Serialize proposal substructure (RFC 7296 Section 3.3.1)
    pub fn encode_to(&self, buf: &mut BytesMut, is_last: bool) -> Result<()> {
        let transforms: Vec<&Transform> = self.sa_proposal.transforms().collect();
        let num_transforms = u8::try_from(transforms.len()).map_err(|_| {
            Error::InvalidParameter(format!("Too many transforms: {}", transforms.len()))
        })?;
        let mut body = BytesMut::new();
        let spi_size = match (self.spi_size as usize, self.spi) {
            (SPI_LEN_IPSEC, Some(spi)) => {
                body.put_u32(spi as u32);
                SPI_LEN_IPSEC as u8
            }
            (SPI_LEN_IKE, Some(spi)) => {
                body.put_u64(spi);
                SPI_LEN_IKE as u8
            }
            _ => 0,
        };
        for (i, transform) in transforms.iter().enumerate() {
            transform.encode_to(&mut body, i + 1 == transforms.len())?;
        }

        buf.put_u8(if is_last { Self::LAST } else { Self::NOT_LAST });
        buf.put_u8(0);
        buf.put_u16(length_u16(Self::HEADER_LEN + body.len(), "Proposal length")?);
        buf.put_u8(self.number);
        buf.put_u8(self.protocol_id().to_u8());
        buf.put_u8(spi_size);
        buf.put_u8(num_transforms);
        buf.put_slice(&body);
        Ok(())
    }
}

/// Security Association Payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaPayload {
    /// Whether this payload belongs to a response
    pub is_response: bool,

    /// Proposals in wire order
    pub proposals: Vec<Proposal>,
}

impl SaPayload {
    /// Parse SA payload from data (without header)
    ///
    /// # Errors
    ///
    /// Returns `InvalidSyntax` for zero proposals, a response with more than
    /// one proposal, or a malformed substructure
    pub fn from_payload_data(data: &[u8], is_response: bool) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let mut proposals = Vec::new();
        while !reader.is_empty() {
            proposals.push(Proposal::decode(&mut reader)?);
        }

        if proposals.is_empty() {
            return Err(Error::syntax("Found no SA Proposal in this SA Payload"));
        }
        if is_response && proposals.len() != 1 {
            return Err(Error::syntax(format!(
                "Expected only one negotiated proposal from SA response, found {}",
                proposals.len()
            )));
        }

        let first_is_ike = proposals[0].is_ike();
        if proposals.iter().any(|p| p.is_ike() != first_is_ike) {
            warn!("Found both IKE proposals and Child proposals in this SA Payload");
        }

        logging::log_sa_payload(is_response, &proposals);
        Ok(SaPayload {
            is_response,
            proposals,
        })
    }

    /// Serialize SA payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        for (i, proposal) in self.proposals.iter().enumerate() {
            proposal.encode_to(buf, i + 1 == self.proposals.len())?;
        }
        Ok(())
    }

    /// Request for initial IKE SA creation (no SPI)
    pub fn initial_ike_request(sa_proposals: &[SaProposal]) -> Result<Self> {
        check_proposals(sa_proposals, true)?;
        let proposals = sa_proposals
            .iter()
            .zip(1u8..)
            .map(|(sa, number)| Proposal::without_spi(number, sa.clone()))
            .collect();
        Ok(SaPayload {
            is_response: false,
            proposals,
        })
    }

    /// Request for IKE SA rekey, one fresh local SPI per proposal
    pub fn ike_rekey_request(
        sa_proposals: &[SaProposal],
        generator: &Arc<dyn SpiGenerator>,
        local: IpAddr,
    ) -> Result<Self> {
        check_proposals(sa_proposals, true)?;
        Self::with_local_spis(false, sa_proposals, 1, SpiKind::Ike, generator, local)
    }

    /// Response for IKE SA rekey selecting proposal `number`
    pub fn ike_rekey_response(
        number: u8,
        sa_proposal: &SaProposal,
        generator: &Arc<dyn SpiGenerator>,
        local: IpAddr,
    ) -> Result<Self> {
        let sa_proposals = std::slice::from_ref(sa_proposal);
        check_proposals(sa_proposals, true)?;
        Self::with_local_spis(true, sa_proposals, number, SpiKind::Ike, generator, local)
    }

    /// Request for Child SA creation or rekey, one fresh local SPI per proposal
    pub fn child_request(
        sa_proposals: &[SaProposal],
        generator: &Arc<dyn SpiGenerator>,
        local: IpAddr,
    ) -> Result<Self> {
        check_proposals(sa_proposals, false)?;
        Self::with_local_spis(false, sa_proposals, 1, SpiKind::Ipsec, generator, local)
    }

    /// Response for Child SA creation selecting proposal `number`
    pub fn child_response(
        number: u8,
        sa_proposal: &SaProposal,
        generator: &Arc<dyn SpiGenerator>,
        local: IpAddr,
    ) -> Result<Self> {
        let sa_proposals = std::slice::from_ref(sa_proposal);
        check_proposals(sa_proposals, false)?;
        Self::with_local_spis(true, sa_proposals, number, SpiKind::Ipsec, generator, local)
    }

    fn with_local_spis(
        is_response: bool,
        sa_proposals: &[SaProposal],
        first_number: u8,
        kind: SpiKind,
        generator: &Arc<dyn SpiGenerator>,
        local: IpAddr,
    ) -> Result<Self> {
        if generator.kind() != kind {
            return Err(Error::InvalidParameter(format!(
                "Expected {:?} SPI generator, got {:?}",
                kind,
                generator.kind()
            )));
        }

        let mut proposals: Vec<Proposal> = Vec::with_capacity(sa_proposals.len());
        for (sa, number) in sa_proposals.iter().zip(first_number..) {
            match SpiResource::allocate(generator.clone(), local) {
                Ok(resource) => {
                    proposals.push(Proposal::with_spi_resource(number, sa.clone(), resource))
                }
                Err(e) => {
                    proposals.iter_mut().for_each(Proposal::release_spi_resource);
                    return Err(e);
                }
            }
        }
        Ok(SaPayload {
            is_response,
            proposals,
        })
    }

    /// Release the Child SPIs of an abandoned outbound request
    pub fn release_child_spi_resources(&mut self) {
        self.proposals
            .iter_mut()
            .filter(|p| !p.is_ike())
            .for_each(Proposal::release_spi_resource);
    }

    /// Release every owned SPI
    pub fn release_spi_resources(&mut self) {
        self.proposals
            .iter_mut()
            .for_each(Proposal::release_spi_resource);
    }
}

fn check_proposals(sa_proposals: &[SaProposal], ike: bool) -> Result<()> {
    if sa_proposals.is_empty() || sa_proposals.len() > u8::MAX as usize {
        return Err(Error::InvalidParameter(format!(
            "Invalid number of SA proposals: {}",
            sa_proposals.len()
        )));
    }
    if sa_proposals.iter().any(|p| p.is_ike() != ike) {
        return Err(Error::InvalidParameter(format!(
            "Expected only {} SA proposals",
            if ike { "IKE" } else { "Child" }
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ike_platform::RandomSpiGenerator;

    fn local() -> IpAddr {
        "198.51.100.7".parse().unwrap()
    }

    fn ike_proposal() -> SaProposal {
        SaProposal::ike_builder()
            .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_128)
            .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_256)
            .add_prf(PrfTransformId::HmacSha256)
            .add_integrity(IntegTransformId::HmacSha256_128)
            .add_dh_group(DhTransformId::Group14)
            .add_dh_group(DhTransformId::Group31)
            .build()
            .unwrap()
    }

    fn child_proposal() -> SaProposal {
        SaProposal::child_builder()
            .add_encryption(EncrTransformId::AesGcm16, KEY_LEN_AES_256)
            .build()
            .unwrap()
    }

    fn encode(sa: &SaPayload) -> Vec<u8> {
        let mut buf = BytesMut::new();
        sa.encode_to(&mut buf).unwrap();
        buf.to_vec()
    }

    //
    // Test Cases - Transform decoding
    //

    fn encode_transform(transform_type: u8, id: u16, attrs: &[u8]) -> Vec<u8> {
        let mut data = vec![0, 0];
        data.extend_from_slice(&((8 + attrs.len()) as u16).to_be_bytes());
        data.push(transform_type);
        data.push(0);
        data.extend_from_slice(&id.to_be_bytes());
        data.extend_from_slice(attrs);
        data
    }

    fn decode_transform(data: &[u8]) -> Result<Option<Transform>> {
        Transform::decode(&mut ByteReader::new(data))
    }

    #[test]
    fn test_transform_key_length_tv() {
        let data = encode_transform(1, 12, &[0x80, 0x0E, 0x00, 0x80]);
        let transform = decode_transform(&data).unwrap().unwrap();
        assert_eq!(transform.transform_type, TransformType::Encr);
        assert_eq!(transform.key_length(), 128);
        assert!(transform.is_supported);

        let mut buf = BytesMut::new();
        transform.encode_to(&mut buf, true).unwrap();
        assert_eq!(buf.to_vec(), data);
    }

    #[test]
    fn test_variable_key_without_key_length() {
        let data = encode_transform(1, 12, &[]);
        assert!(matches!(decode_transform(&data), Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_fixed_key_with_key_length() {
        let data = encode_transform(1, 3, &[0x80, 0x0E, 0x00, 0xC0]);
        assert!(matches!(decode_transform(&data), Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_invalid_aes_key_length() {
        let data = encode_transform(1, 20, &[0x80, 0x0E, 0x00, 0x40]);
        assert!(matches!(decode_transform(&data), Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_key_length_tlv_rejected() {
        let data = encode_transform(1, 12, &[0x00, 0x0E, 0x00, 0x06, 0x00, 0x80]);
        assert!(matches!(decode_transform(&data), Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let data = encode_transform(1, 12, &[0x80, 0x0E, 0x00, 0x80, 0x80, 0x0E, 0x01, 0x00]);
        assert!(matches!(decode_transform(&data), Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_attribute_on_prf_unsupported() {
        let data = encode_transform(2, 5, &[0x80, 0x0E, 0x00, 0x80]);
        let transform = decode_transform(&data).unwrap().unwrap();
        assert!(!transform.is_supported);
    }

    #[test]
    fn test_unrecognized_attribute_skips_key_check() {
        // Unsupported transforms are not held to the key length rules
        let data = encode_transform(1, 12, &[0x00, 0x10, 0x00, 0x05, 0xAA]);
        let transform = decode_transform(&data).unwrap().unwrap();
        assert!(!transform.is_supported);
    }

    #[test]
    fn test_unknown_transform_id_unsupported() {
        let transform = decode_transform(&encode_transform(3, 99, &[])).unwrap().unwrap();
        assert!(!transform.is_supported);
    }

    #[test]
    fn test_unknown_transform_type() {
        assert_eq!(decode_transform(&encode_transform(6, 1, &[])).unwrap(), None);
    }

    #[test]
    fn test_invalid_transform_marker() {
        let mut data = encode_transform(2, 5, &[]);
        data[0] = 2;
        assert!(matches!(decode_transform(&data), Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_encr_key_length_rules() {
        assert!(matches!(
            Transform::encr(EncrTransformId::AesCbc, KEY_LEN_UNSPECIFIED),
            Err(Error::InvalidSyntax(_))
        ));
        assert!(matches!(
            Transform::encr(EncrTransformId::AesGcm16, 64),
            Err(Error::InvalidSyntax(_))
        ));
        assert!(matches!(
            Transform::encr(EncrTransformId::TripleDes, KEY_LEN_AES_128),
            Err(Error::InvalidSyntax(_))
        ));

        let des = Transform::encr(EncrTransformId::TripleDes, KEY_LEN_UNSPECIFIED).unwrap();
        assert!(des.attributes.is_empty());
        let aes = Transform::encr(EncrTransformId::AesCbc, KEY_LEN_AES_192).unwrap();
        assert_eq!(aes.key_length(), KEY_LEN_AES_192);
    }

    //
    // Test Cases - Proposals and SA payload
    //

    #[test]
    fn test_sa_payload_roundtrip() {
        let sa = SaPayload::initial_ike_request(&[ike_proposal()]).unwrap();
        let parsed = SaPayload::from_payload_data(&encode(&sa), false).unwrap();
        assert_eq!(parsed, sa);
        assert_eq!(parsed.proposals[0].number, 1);
        assert_eq!(parsed.proposals[0].spi, None);
        assert!(parsed.proposals[0].sa_proposal.is_fully_supported());
    }

    #[test]
    fn test_proposal_unrecognized_transform_type() {
        let mut transforms = encode_transform(1, 28, &[]);
        transforms[0] = 3;
        transforms.extend_from_slice(&encode_transform(9, 1, &[]));

        let mut data = vec![0, 0];
        data.extend_from_slice(&((8 + 4 + transforms.len()) as u16).to_be_bytes());
        data.extend_from_slice(&[1, 3, 4, 2]);
        data.extend_from_slice(&0x1234_5678u32.to_be_bytes());
        data.extend_from_slice(&transforms);

        let sa = SaPayload::from_payload_data(&data, true).unwrap();
        let proposal = &sa.proposals[0];
        assert!(proposal.has_unrecognized_transform);
        assert_eq!(proposal.spi, Some(0x1234_5678));
        assert_eq!(proposal.protocol_id(), ProtocolId::Esp);
        assert_eq!(proposal.sa_proposal.encryption.len(), 1);
    }

    #[test]
    fn test_no_proposal_rejected() {
        assert!(matches!(
            SaPayload::from_payload_data(&[], false),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_response_with_two_proposals_rejected() {
        let sa = SaPayload::initial_ike_request(&[ike_proposal(), ike_proposal()]).unwrap();
        let data = encode(&sa);
        assert!(SaPayload::from_payload_data(&data, false).is_ok());
        assert!(matches!(
            SaPayload::from_payload_data(&data, true),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_invalid_spi_size() {
        let mut data = encode(&SaPayload::initial_ike_request(&[ike_proposal()]).unwrap());
        data[6] = 2;
        assert!(matches!(
            SaPayload::from_payload_data(&data, false),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_invalid_proposal_marker() {
        let mut data = encode(&SaPayload::initial_ike_request(&[ike_proposal()]).unwrap());
        data[0] = 3;
        assert!(SaPayload::from_payload_data(&data, false).is_err());
    }

    //
    // Test Cases - Negotiation predicates
    //

    #[test]
    fn test_is_negotiated_from() {
        let request = ike_proposal();
        let response = SaProposal {
            protocol_id: ProtocolId::Ike,
            encryption: vec![Transform::encr(EncrTransformId::AesCbc, KEY_LEN_AES_256).unwrap()],
            prf: vec![Transform::prf(PrfTransformId::HmacSha256)],
            integrity: vec![Transform::integ(IntegTransformId::HmacSha256_128)],
            dh_groups: vec![Transform::dh(DhTransformId::Group31)],
            esn: vec![],
        };
        assert!(response.is_negotiated_from(&request));

        // Two values for one type
        let mut greedy = response.clone();
        greedy.dh_groups = request.dh_groups.clone();
        assert!(!greedy.is_negotiated_from(&request));

        // Key length is part of the match
        let mut other_key = response.clone();
        other_key.encryption =
            vec![Transform::encr(EncrTransformId::AesCbc, KEY_LEN_AES_192).unwrap()];
        assert!(!other_key.is_negotiated_from(&request));

        let mut no_dh = response.clone();
        no_dh.dh_groups.clear();
        assert!(!no_dh.is_negotiated_from(&request));
        assert!(no_dh.is_negotiated_from_except_dh(&request));

        // Class mismatch
        assert!(!child_proposal().is_negotiated_from(&request));

        // Same transforms under another Child protocol
        let esp = child_proposal();
        let mut ah = esp.clone();
        ah.protocol_id = ProtocolId::Ah;
        assert!(esp.is_negotiated_from(&esp));
        assert!(!ah.is_negotiated_from(&esp));
        assert!(!ah.is_negotiated_from_except_dh(&esp));
    }

    #[test]
    fn test_proposal_number_must_match() {
        let request = Proposal::without_spi(1, child_proposal());
        let mut response = request.clone();
        assert!(response.is_negotiated_from(&request));
        response.number = 2;
        assert!(!response.is_negotiated_from(&request));
    }

    #[test]
    fn test_with_dh_group() {
        let proposal = child_proposal().with_dh_group(14);
        assert_eq!(proposal.dh_group_ids(), vec![14]);
        assert!(proposal.dh_groups[0].is_supported);
    }

    //
    // Test Cases - Builder validation
    //

    #[test]
    fn test_ike_builder_requirements() {
        assert!(SaProposal::ike_builder()
            .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_128)
            .add_prf(PrfTransformId::HmacSha1)
            .add_dh_group(DhTransformId::Group14)
            .build()
            .is_err());

        let aead = SaProposal::ike_builder()
            .add_encryption(EncrTransformId::AesGcm16, KEY_LEN_AES_128)
            .add_prf(PrfTransformId::HmacSha256)
            .add_dh_group(DhTransformId::Group14)
            .build()
            .unwrap();
        assert!(aead.integrity.is_empty());

        assert!(SaProposal::ike_builder()
            .add_encryption(EncrTransformId::AesGcm16, KEY_LEN_AES_128)
            .add_integrity(IntegTransformId::HmacSha256_128)
            .add_prf(PrfTransformId::HmacSha256)
            .add_dh_group(DhTransformId::Group14)
            .build()
            .is_err());
    }

    #[test]
    fn test_builder_rejects_mixed_and_duplicates() {
        assert!(SaProposal::child_builder()
            .add_encryption(EncrTransformId::AesGcm16, KEY_LEN_AES_128)
            .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_128)
            .build()
            .is_err());

        assert!(SaProposal::child_builder()
            .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_128)
            .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_128)
            .build()
            .is_err());

        assert!(matches!(
            SaProposal::child_builder()
                .add_encryption(EncrTransformId::ChaCha20Poly1305, KEY_LEN_AES_256)
                .build(),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_child_builder_default_esn() {
        let proposal = child_proposal();
        assert_eq!(proposal.esn, vec![Transform::esn(EsnTransformId::NoEsn)]);
    }

    //
    // Test Cases - Outbound builders and SPI ownership
    //

    #[test]
    fn test_child_request_allocates_spis() {
        let generator: Arc<dyn SpiGenerator> = Arc::new(RandomSpiGenerator::ipsec());
        let mut sa =
            SaPayload::child_request(&[child_proposal(), child_proposal()], &generator, local())
                .unwrap();

        assert_eq!(sa.proposals[0].number, 1);
        assert_eq!(sa.proposals[1].number, 2);
        assert!(sa
            .proposals
            .iter()
            .all(|p| p.spi_size == 4 && p.spi_resource.is_some()));

        let parsed = SaPayload::from_payload_data(&encode(&sa), false).unwrap();
        assert_eq!(parsed, sa);

        sa.release_child_spi_resources();
        assert!(sa.proposals.iter().all(|p| p.spi_resource.is_none()));
    }

    #[test]
    fn test_rekey_response_number() {
        let generator: Arc<dyn SpiGenerator> = Arc::new(RandomSpiGenerator::ike());
        let sa = SaPayload::ike_rekey_response(3, &ike_proposal(), &generator, local()).unwrap();
        assert!(sa.is_response);
        assert_eq!(sa.proposals.len(), 1);
        assert_eq!(sa.proposals[0].number, 3);
        assert_eq!(sa.proposals[0].spi_size, 8);
    }

    #[test]
    fn test_builder_generator_kind_mismatch() {
        let generator: Arc<dyn SpiGenerator> = Arc::new(RandomSpiGenerator::ipsec());
        assert!(matches!(
            SaPayload::ike_rekey_request(&[ike_proposal()], &generator, local()),
            Err(Error::InvalidParameter(_))
        ));
        assert!(SaPayload::child_request(&[ike_proposal()], &generator, local()).is_err());
    }
}
