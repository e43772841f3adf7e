//! Identification payloads (IDi / IDr)

use super::ByteReader;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// ID Type for Identification Payload (RFC 7296 Section 3.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IdType {
    /// IPv4 address
    Ipv4Addr = 1,
    /// Fully-qualified domain name
    Fqdn = 2,
    /// RFC 822 email address
    Rfc822Addr = 3,
    /// IPv6 address
    Ipv6Addr = 5,
    /// DER encoded ASN.1 X.500 Distinguished Name
    DerAsn1Dn = 9,
    /// Key ID
    KeyId = 11,
}

impl IdType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(IdType::Ipv4Addr),
            2 => Some(IdType::Fqdn),
            3 => Some(IdType::Rfc822Addr),
            5 => Some(IdType::Ipv6Addr),
            9 => Some(IdType::DerAsn1Dn),
            11 => Some(IdType::KeyId),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Identification Payload (RFC 7296 Section 3.5)
///
/// Used for IDi (Initiator) and IDr (Responder) payloads.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   ID Type     |                 RESERVED                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~                   Identification Data                         ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The body (ID type, reserved octets and data) is what the PRF covers when
/// building AUTH signed octets, see [`encoded_body`](Self::encoded_body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPayload {
    /// ID type
    pub id_type: IdType,

    /// Identification data
    pub data: Vec<u8>,
}

impl IdPayload {
    /// Create new ID payload
    pub fn new(id_type: IdType, data: Vec<u8>) -> Self {
        IdPayload { id_type, data }
    }

    /// Create ID from FQDN
    pub fn from_fqdn(fqdn: &str) -> Self {
        IdPayload::new(IdType::Fqdn, fqdn.as_bytes().to_vec())
    }

    /// Create ID from email address
    pub fn from_email(email: &str) -> Self {
        IdPayload::new(IdType::Rfc822Addr, email.as_bytes().to_vec())
    }

    /// Create ID from Key ID
    pub fn from_key_id(key_id: &[u8]) -> Self {
        IdPayload::new(IdType::KeyId, key_id.to_vec())
    }

    /// Create ID from an IP address
    pub fn from_ip(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IdPayload::new(IdType::Ipv4Addr, v4.octets().to_vec()),
            IpAddr::V6(v6) => IdPayload::new(IdType::Ipv6Addr, v6.octets().to_vec()),
        }
    }

    /// Parse ID payload from data (without header)
    ///
    /// # Errors
    ///
    /// Unknown ID types and address identities of the wrong size fail
    /// authentication
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let raw_type = reader.read_u8()?;
        reader.skip(3)?;
        let id_data = reader.read_rest().to_vec();

        let id_type = IdType::from_u8(raw_type).ok_or_else(|| {
            Error::AuthenticationFailed(format!("Unsupported ID type: {}", raw_type))
        })?;

        let expected = match id_type {
            IdType::Ipv4Addr => Some(4),
            IdType::Ipv6Addr => Some(16),
            _ => None,
        };
        if let Some(len) = expected {
            if id_data.len() != len {
                return Err(Error::AuthenticationFailed(format!(
                    "Invalid address identification length: {}",
                    id_data.len()
                )));
            }
        }

        Ok(IdPayload {
            id_type,
            data: id_data,
        })
    }

    /// Serialize ID payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.id_type.to_u8());
        buf.put_slice(&[0u8; 3]);
        buf.put_slice(&self.data);
    }

    /// ID payload body as covered by the AUTH PRF
    pub fn encoded_body(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.data.len());
        self.encode_to(&mut buf);
        buf.to_vec()
    }

    /// Get ID as string (if applicable)
    pub fn as_string(&self) -> Option<String> {
        match self.id_type {
            IdType::Fqdn | IdType::Rfc822Addr => String::from_utf8(self.data.clone()).ok(),
            _ => None,
        }
    }

    /// Get ID as IP address (if applicable)
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self.id_type {
            IdType::Ipv4Addr => <[u8; 4]>::try_from(self.data.as_slice())
                .ok()
                .map(|o| IpAddr::V4(Ipv4Addr::from(o))),
            IdType::Ipv6Addr => <[u8; 16]>::try_from(self.data.as_slice())
                .ok()
                .map(|o| IpAddr::V6(Ipv6Addr::from(o))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_payload_fqdn() {
        let id = IdPayload::from_fqdn("vpn.example.com");
        assert_eq!(id.id_type, IdType::Fqdn);
        assert_eq!(id.as_string().unwrap(), "vpn.example.com");
        assert_eq!(id.encoded_body().len(), 4 + 15);
    }

    #[test]
    fn test_id_payload_key_id() {
        let id = IdPayload::from_key_id(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(id.id_type, IdType::KeyId);
        assert!(id.as_string().is_none());
    }

    #[test]
    fn test_id_payload_roundtrip() {
        let original = IdPayload::from_email("user@example.com");
        let parsed = IdPayload::from_payload_data(&original.encoded_body()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_id_payload_ip() {
        let addr: IpAddr = "2001:db8::1".parse().unwrap();
        let id = IdPayload::from_ip(addr);
        let parsed = IdPayload::from_payload_data(&id.encoded_body()).unwrap();
        assert_eq!(parsed.as_ip(), Some(addr));
    }

    #[test]
    fn test_id_payload_bad_ipv4_length() {
        let data = [1, 0, 0, 0, 10, 0, 0];
        assert!(matches!(
            IdPayload::from_payload_data(&data),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_id_payload_unknown_type() {
        let data = [99, 0, 0, 0, 1];
        assert!(matches!(
            IdPayload::from_payload_data(&data),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_id_type_conversion() {
        assert_eq!(IdType::from_u8(2), Some(IdType::Fqdn));
        assert_eq!(IdType::from_u8(9), Some(IdType::DerAsn1Dn));
        assert_eq!(IdType::from_u8(10), None);
        assert_eq!(IdType::Fqdn.to_u8(), 2);
    }
}
