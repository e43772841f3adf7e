//! IKEv2 Payload structures and parsing
//!
//! Implements the generic payload chain defined in RFC 7296 Section 3.2 and
//! dispatches each payload body to its typed codec.

mod auth;
mod config;
mod delete;
mod id;
mod notify;
mod simple;
mod ts;

pub use auth::{AuthMethod, AuthPayload};
pub use config::{ConfigAttribute, ConfigPayload, ConfigType};
pub use delete::DeletePayload;
pub use id::{IdPayload, IdType};
pub use notify::NotifyPayload;
pub use simple::{CertEncoding, CertPayload, CertReqPayload, EapPayload, KePayload, NoncePayload, VendorPayload};
pub use ts::{TrafficSelector, TsPayload, TsType};

use super::constants::{PayloadType, PAYLOAD_HEADER_SIZE};
use super::proposal::SaPayload;
use crate::ipsec::logging;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::collections::HashSet;
use tracing::debug;

/// Generic IKE payload header (4 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Next payload type code
    pub next_payload: u8,

    /// Critical bit (if set, must understand this payload)
    pub critical: bool,

    /// Total payload length including header (4 bytes + data)
    pub length: u16,
}

impl PayloadHeader {
    /// Payload header size
    pub const SIZE: usize = PAYLOAD_HEADER_SIZE;

    /// Critical flag bit
    pub const CRITICAL_BIT: u8 = 0x80;

    /// Create new payload header
    pub fn new(next_payload: u8, critical: bool, length: u16) -> Self {
        PayloadHeader {
            next_payload,
            critical,
            length,
        }
    }

    /// Parse payload header from bytes
    ///
    /// # Errors
    ///
    /// Returns `InvalidSyntax` if fewer than 4 bytes are available or the
    /// declared length does not exceed the header size
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::syntax("Truncated generic payload header"));
        }

        let next_payload = data[0];
        // Reserved bits are ignored on receipt
        let critical = (data[1] & Self::CRITICAL_BIT) != 0;
        let length = u16::from_be_bytes([data[2], data[3]]);

        if (length as usize) <= Self::SIZE {
            return Err(Error::syntax(format!("Invalid payload length: {}", length)));
        }

        Ok(PayloadHeader {
            next_payload,
            critical,
            length,
        })
    }

    /// Serialize payload header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.next_payload;
        bytes[1] = if self.critical { Self::CRITICAL_BIT } else { 0x00 };
        bytes[2..4].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }

    /// Get payload data length (excluding header)
    pub fn data_length(&self) -> usize {
        self.length as usize - Self::SIZE
    }
}

/// Fit `len` into a 16-bit length or count field
///
/// Returns `InvalidParameter` when the value does not fit.
pub fn length_u16(len: usize, field: &str) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| Error::InvalidParameter(format!("{} does not fit 16 bits: {}", field, len)))
}

/// Bounds-checked big-endian reader over a payload body
///
/// Every read that runs past the end yields `BufferTooShort`, which the
/// payload list decoder normalizes to `InvalidSyntax`.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `data`
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether all bytes were consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Current offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Consume `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::BufferTooShort {
                required: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Consume everything that is left
    pub fn read_rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    /// Skip `len` reserved bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a big-endian u16
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a big-endian u32
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian unsigned integer of `len` bytes (at most 8)
    pub fn read_uint(&mut self, len: usize) -> Result<u64> {
        if len > 8 {
            return Err(Error::Internal(format!("Integer width {} exceeds 8", len)));
        }
        Ok(self
            .read_bytes(len)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

/// IKE Payload types
///
/// SK and SKF are message-level wrappers handled by
/// [`encrypted`](super::encrypted) and never appear in a decoded chain.
#[derive(Debug, Clone, PartialEq)]
pub enum IkePayload {
    /// Security Association payload
    SA(SaPayload),

    /// Key Exchange payload
    KE(KePayload),

    /// Identification payload (Initiator)
    IDi(IdPayload),

    /// Identification payload (Responder)
    IDr(IdPayload),

    /// Certificate payload
    CERT(CertPayload),

    /// Certificate Request payload
    CERTREQ(CertReqPayload),

    /// Authentication payload
    AUTH(AuthPayload),

    /// Nonce payload
    Nonce(NoncePayload),

    /// Notify payload
    N(NotifyPayload),

    /// Delete payload
    D(DeletePayload),

    /// Vendor ID payload
    V(VendorPayload),

    /// Traffic Selector payload (Initiator)
    TSi(TsPayload),

    /// Traffic Selector payload (Responder)
    TSr(TsPayload),

    /// Configuration payload
    CP(ConfigPayload),

    /// EAP payload
    EAP(EapPayload),

    /// Payload of a type this implementation does not understand
    Unsupported {
        /// Payload type code
        payload_type: u8,
        /// Critical bit from the generic header
        critical: bool,
        /// Raw payload data (excluding header)
        data: Vec<u8>,
    },
}

impl IkePayload {
    /// Wire type code of this payload
    pub fn type_code(&self) -> u8 {
        match self {
            IkePayload::SA(_) => PayloadType::SA.to_u8(),
            IkePayload::KE(_) => PayloadType::KE.to_u8(),
            IkePayload::IDi(_) => PayloadType::IDi.to_u8(),
            IkePayload::IDr(_) => PayloadType::IDr.to_u8(),
            IkePayload::CERT(_) => PayloadType::CERT.to_u8(),
            IkePayload::CERTREQ(_) => PayloadType::CERTREQ.to_u8(),
            IkePayload::AUTH(_) => PayloadType::AUTH.to_u8(),
            IkePayload::Nonce(_) => PayloadType::Nonce.to_u8(),
            IkePayload::N(_) => PayloadType::N.to_u8(),
            IkePayload::D(_) => PayloadType::D.to_u8(),
            IkePayload::V(_) => PayloadType::V.to_u8(),
            IkePayload::TSi(_) => PayloadType::TSi.to_u8(),
            IkePayload::TSr(_) => PayloadType::TSr.to_u8(),
            IkePayload::CP(_) => PayloadType::CP.to_u8(),
            IkePayload::EAP(_) => PayloadType::EAP.to_u8(),
            IkePayload::Unsupported { payload_type, .. } => *payload_type,
        }
    }

    /// Known payload type, `None` for unsupported payloads
    pub fn payload_type(&self) -> Option<PayloadType> {
        match self {
            IkePayload::Unsupported { .. } => None,
            other => PayloadType::from_u8(other.type_code()),
        }
    }

    /// Critical flag to put on the wire
    pub fn is_critical(&self) -> bool {
        matches!(self, IkePayload::Unsupported { critical: true, .. })
    }

    /// Decode a payload body of the given type
    ///
    /// # Arguments
    ///
    /// * `payload_type` - Type code announced by the previous header
    /// * `critical` - Critical bit of this payload's header
    /// * `body` - Payload data without the generic header
    /// * `is_response` - Whether the containing message is a response
    pub fn decode(payload_type: u8, critical: bool, body: &[u8], is_response: bool) -> Result<Self> {
        let Some(known) = PayloadType::from_u8(payload_type) else {
            return Ok(IkePayload::Unsupported {
                payload_type,
                critical,
                data: body.to_vec(),
            });
        };

        let payload = match known {
            PayloadType::SA => IkePayload::SA(SaPayload::from_payload_data(body, is_response)?),
            PayloadType::KE => IkePayload::KE(KePayload::from_payload_data(body)?),
            PayloadType::IDi => IkePayload::IDi(IdPayload::from_payload_data(body)?),
            PayloadType::IDr => IkePayload::IDr(IdPayload::from_payload_data(body)?),
            PayloadType::CERT => IkePayload::CERT(CertPayload::from_payload_data(body)?),
            PayloadType::CERTREQ => IkePayload::CERTREQ(CertReqPayload::from_payload_data(body)?),
            PayloadType::AUTH => IkePayload::AUTH(AuthPayload::from_payload_data(body)?),
            PayloadType::Nonce => IkePayload::Nonce(NoncePayload::from_payload_data(body)?),
            PayloadType::N => IkePayload::N(NotifyPayload::from_payload_data(body)?),
            PayloadType::D => IkePayload::D(DeletePayload::from_payload_data(body)?),
            PayloadType::V => IkePayload::V(VendorPayload::from_payload_data(body)),
            PayloadType::TSi => IkePayload::TSi(TsPayload::from_payload_data(body)?),
            PayloadType::TSr => IkePayload::TSr(TsPayload::from_payload_data(body)?),
            PayloadType::CP => IkePayload::CP(ConfigPayload::from_payload_data(body)?),
            PayloadType::EAP => IkePayload::EAP(EapPayload::from_payload_data(body)),
            PayloadType::SK | PayloadType::SKF => {
                return Err(Error::syntax("Encrypted payload inside a payload chain"));
            }
            PayloadType::None => {
                return Err(Error::Internal("No payload to decode".into()));
            }
        };
        Ok(payload)
    }

    /// Append this payload's body (without generic header) to `buf`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if a length field of the body overflows
    pub fn encode_body(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            IkePayload::SA(p) => p.encode_to(buf)?,
            IkePayload::KE(p) => p.encode_to(buf),
            IkePayload::IDi(p) | IkePayload::IDr(p) => p.encode_to(buf),
            IkePayload::CERT(p) => p.encode_to(buf),
            IkePayload::CERTREQ(p) => p.encode_to(buf),
            IkePayload::AUTH(p) => p.encode_to(buf),
            IkePayload::Nonce(p) => p.encode_to(buf),
            IkePayload::N(p) => p.encode_to(buf),
            IkePayload::D(p) => p.encode_to(buf)?,
            IkePayload::V(p) => p.encode_to(buf),
            IkePayload::TSi(p) | IkePayload::TSr(p) => p.encode_to(buf),
            IkePayload::CP(p) => p.encode_to(buf)?,
            IkePayload::EAP(p) => p.encode_to(buf),
            IkePayload::Unsupported { data, .. } => buf.put_slice(data),
        }
        Ok(())
    }

    /// Append generic header plus body, announcing `next_payload`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the payload exceeds the 16-bit length field
    pub fn encode_to(&self, buf: &mut BytesMut, next_payload: u8) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;

        let length = length_u16(PayloadHeader::SIZE + body.len(), "Payload length")?;
        let header = PayloadHeader::new(next_payload, self.is_critical(), length);
        buf.put_slice(&header.to_bytes());
        buf.put_slice(&body);
        Ok(())
    }
}

/// Decode a payload chain
///
/// # Arguments
///
/// * `first_type` - Type of the first payload (from the IKE or SK header)
/// * `is_response` - Whether the containing message is a response
/// * `data` - Concatenated payloads
///
/// # Errors
///
/// - `InvalidSyntax` for malformed lengths, duplicated non-repeatable
///   payloads, trailing bytes or malformed payload bodies
/// - `UnsupportedCriticalPayload` listing every unknown critical type
pub fn decode_payload_list(first_type: u8, is_response: bool, data: &[u8]) -> Result<Vec<IkePayload>> {
    decode_chain(first_type, is_response, data).map_err(Error::into_syntax)
}

fn decode_chain(first_type: u8, is_response: bool, data: &[u8]) -> Result<Vec<IkePayload>> {
    let mut payloads = Vec::new();
    let mut seen = HashSet::new();
    let mut unsupported_critical = Vec::new();

    let mut current_type = first_type;
    let mut offset = 0;

    while current_type != PayloadType::None.to_u8() {
        let header = PayloadHeader::from_bytes(&data[offset..])?;
        let end = offset + header.length as usize;
        if end > data.len() {
            return Err(Error::syntax(format!(
                "Payload length {} exceeds remaining {} bytes",
                header.length,
                data.len() - offset
            )));
        }
        let body = &data[offset + PayloadHeader::SIZE..end];

        match IkePayload::decode(current_type, header.critical, body, is_response)? {
            IkePayload::Unsupported { payload_type, critical: true, .. } => {
                unsupported_critical.push(payload_type);
            }
            IkePayload::Unsupported { payload_type, .. } => {
                debug!(payload_type, "Dropping unsupported non-critical payload");
            }
            payload => {
                if let Some(known) = payload.payload_type() {
                    if !known.is_repeatable() && !seen.insert(known) {
                        return Err(Error::syntax(format!(
                            "It is not allowed to have multiple payload of type: {}",
                            current_type
                        )));
                    }
                }
                payloads.push(payload);
            }
        }

        current_type = header.next_payload;
        offset = end;
    }

    if offset != data.len() {
        return Err(Error::syntax(format!(
            "Unexpected {} trailing bytes after last payload",
            data.len() - offset
        )));
    }

    if !unsupported_critical.is_empty() {
        return Err(Error::UnsupportedCriticalPayload(unsupported_critical));
    }

    let types: Vec<u8> = payloads.iter().map(IkePayload::type_code).collect();
    logging::log_decoded_payloads(&types);

    Ok(payloads)
}

/// Encode a payload chain
///
/// Each generic header announces the type of the following payload; the
/// last one announces "no next payload".
///
/// # Errors
///
/// Returns `InvalidParameter` if any payload overflows a length field
pub fn encode_payload_list(payloads: &[IkePayload]) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();
    for (i, payload) in payloads.iter().enumerate() {
        let next = payloads
            .get(i + 1)
            .map(IkePayload::type_code)
            .unwrap_or(PayloadType::None.to_u8());
        payload.encode_to(&mut buf, next)?;
    }
    Ok(buf.to_vec())
}

/// Type code of the first payload, "no next payload" for an empty list
pub fn first_payload_type(payloads: &[IkePayload]) -> u8 {
    payloads
        .first()
        .map(IkePayload::type_code)
        .unwrap_or(PayloadType::None.to_u8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonce(byte: u8) -> IkePayload {
        IkePayload::Nonce(NoncePayload::new(vec![byte; 16]).unwrap())
    }

    fn vendor(data: &[u8]) -> IkePayload {
        IkePayload::V(VendorPayload::new(data.to_vec()))
    }

    #[test]
    fn test_payload_header_parse() {
        let data = [33, 0x80, 0, 50];

        let header = PayloadHeader::from_bytes(&data).unwrap();
        assert_eq!(header.next_payload, 33);
        assert!(header.critical);
        assert_eq!(header.length, 50);
        assert_eq!(header.data_length(), 46);
    }

    #[test]
    fn test_payload_header_reserved_bits_ignored() {
        let header = PayloadHeader::from_bytes(&[40, 0x7F, 0, 20]).unwrap();
        assert!(!header.critical);
    }

    #[test]
    fn test_payload_header_roundtrip() {
        let header = PayloadHeader::new(PayloadType::Nonce.to_u8(), true, 100);
        let parsed = PayloadHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(header, parsed);
    }

    #[test]
    fn test_payload_header_invalid_length() {
        assert!(matches!(
            PayloadHeader::from_bytes(&[33, 0, 0, 4]),
            Err(Error::InvalidSyntax(_))
        ));
        assert!(matches!(
            PayloadHeader::from_bytes(&[1, 2]),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_byte_reader() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 0x01);
        assert_eq!(reader.read_u16().unwrap(), 0x0203);
        assert_eq!(reader.read_uint(3).unwrap(), 0x040506);
        assert_eq!(reader.remaining(), 1);
        assert!(matches!(
            reader.read_u16(),
            Err(Error::BufferTooShort { required: 2, available: 1 })
        ));
        assert_eq!(reader.read_rest(), &[0x07]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_encode_chain_links_next_types() {
        let payloads = vec![nonce(1), vendor(b"vid")];
        let encoded = encode_payload_list(&payloads).unwrap();

        // First header announces Vendor, last announces none
        assert_eq!(encoded[0], PayloadType::V.to_u8());
        assert_eq!(encoded[20], PayloadType::None.to_u8());
        assert_eq!(first_payload_type(&payloads), PayloadType::Nonce.to_u8());
        assert_eq!(first_payload_type(&[]), 0);
    }

    #[test]
    fn test_oversized_payload_not_encoded() {
        let cert = IkePayload::CERT(CertPayload::x509(vec![0x30; 65_531]));
        assert!(matches!(
            encode_payload_list(&[nonce(1), cert]),
            Err(Error::InvalidParameter(_))
        ));

        // Largest body that fits the 16-bit length
        let cert = IkePayload::CERT(CertPayload::x509(vec![0x30; 65_530]));
        let encoded = encode_payload_list(&[cert]).unwrap();
        assert_eq!(&encoded[2..4], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_decode_chain_roundtrip() {
        let payloads = vec![nonce(1), vendor(b"a"), vendor(b"b")];
        let encoded = encode_payload_list(&payloads).unwrap();

        let decoded = decode_payload_list(PayloadType::Nonce.to_u8(), false, &encoded).unwrap();
        assert_eq!(decoded, payloads);
    }

    #[test]
    fn test_duplicate_non_repeatable_rejected() {
        let encoded = encode_payload_list(&[nonce(1), nonce(2)]).unwrap();
        let result = decode_payload_list(PayloadType::Nonce.to_u8(), false, &encoded);
        assert!(matches!(result, Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_unsupported_critical_collects_all() {
        let payloads = vec![
            IkePayload::Unsupported { payload_type: 200, critical: true, data: vec![1] },
            nonce(1),
            IkePayload::Unsupported { payload_type: 201, critical: true, data: vec![2] },
        ];
        let encoded = encode_payload_list(&payloads).unwrap();

        let result = decode_payload_list(200, false, &encoded);
        assert_eq!(result, Err(Error::UnsupportedCriticalPayload(vec![200, 201])));
    }

    #[test]
    fn test_unsupported_non_critical_dropped() {
        let payloads = vec![
            IkePayload::Unsupported { payload_type: 200, critical: false, data: vec![9, 9] },
            nonce(3),
        ];
        let encoded = encode_payload_list(&payloads).unwrap();

        let decoded = decode_payload_list(200, false, &encoded).unwrap();
        assert_eq!(decoded, vec![nonce(3)]);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = encode_payload_list(&[nonce(1)]).unwrap();
        encoded.extend_from_slice(&[0, 0]);

        let result = decode_payload_list(PayloadType::Nonce.to_u8(), false, &encoded);
        assert!(matches!(result, Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_length_overrun_rejected() {
        let mut encoded = encode_payload_list(&[nonce(1)]).unwrap();
        encoded[3] = 0xFF;

        let result = decode_payload_list(PayloadType::Nonce.to_u8(), false, &encoded);
        assert!(matches!(result, Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_truncated_body_normalized_to_syntax() {
        // KE body needs at least 4 bytes
        let data = [0, 0, 0, 6, 0, 14];
        let result = decode_payload_list(PayloadType::KE.to_u8(), false, &data);
        assert_eq!(
            result,
            Err(Error::InvalidSyntax("Malformed IKE Payload".to_string()))
        );
    }

    #[test]
    fn test_encrypted_payload_in_chain_rejected() {
        let data = [0, 0, 0, 8, 1, 2, 3, 4];
        let result = decode_payload_list(PayloadType::SK.to_u8(), false, &data);
        assert!(matches!(result, Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_empty_chain() {
        assert!(decode_payload_list(0, false, &[]).unwrap().is_empty());
        assert!(decode_payload_list(0, false, &[1]).is_err());
    }
}
