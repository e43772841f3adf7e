//! Payloads with flat bodies: KE, Nonce, Vendor ID, EAP, CERT and CERTREQ

use super::ByteReader;
use crate::ipsec::ikev2::proposal::DhTransformId;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Key Exchange Payload (RFC 7296 Section 3.4)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Diffie-Hellman Group Num    |           RESERVED            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~                       Key Exchange Data                       ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KePayload {
    /// Diffie-Hellman group number
    pub dh_group: u16,

    /// Key exchange data (public key)
    pub key_data: Vec<u8>,
}

impl KePayload {
    /// Create new KE payload
    pub fn new(dh_group: u16, key_data: Vec<u8>) -> Self {
        KePayload { dh_group, key_data }
    }

    /// Whether the D-H group is one this implementation recognizes
    pub fn is_supported(&self) -> bool {
        DhTransformId::from_u16(self.dh_group).is_some()
    }

    /// Parse KE payload from data (without header)
    ///
    /// Key data of a recognized group must have that group's public value
    /// length. Unrecognized groups are kept so the caller can answer with
    /// INVALID_KE_PAYLOAD.
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let dh_group = reader.read_u16()?;
        reader.skip(2)?;
        let key_data = reader.read_rest().to_vec();

        if let Some(expected) = DhTransformId::from_u16(dh_group).and_then(DhTransformId::public_key_len) {
            if key_data.len() != expected {
                return Err(Error::syntax(format!(
                    "Invalid key exchange data length {} for D-H group {}",
                    key_data.len(),
                    dh_group
                )));
            }
        }

        Ok(KePayload { dh_group, key_data })
    }

    /// Serialize KE payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.dh_group);
        buf.put_u16(0);
        buf.put_slice(&self.key_data);
    }
}

/// Nonce Payload (RFC 7296 Section 3.9)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoncePayload {
    /// Nonce data
    pub nonce: Vec<u8>,
}

impl NoncePayload {
    /// Minimum nonce size (16 bytes)
    pub const MIN_SIZE: usize = 16;

    /// Maximum nonce size (256 bytes)
    pub const MAX_SIZE: usize = 256;

    /// Create new nonce payload
    pub fn new(nonce: Vec<u8>) -> Result<Self> {
        if nonce.len() < Self::MIN_SIZE || nonce.len() > Self::MAX_SIZE {
            return Err(Error::syntax(format!(
                "Invalid nonce length: {} bytes (allowed {}..={})",
                nonce.len(),
                Self::MIN_SIZE,
                Self::MAX_SIZE
            )));
        }

        Ok(NoncePayload { nonce })
    }

    /// Generate a random nonce of `len` bytes
    pub fn random(len: usize) -> Result<Self> {
        use rand::RngCore;

        let mut nonce = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self::new(nonce)
    }

    /// Parse nonce payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        Self::new(data.to_vec())
    }

    /// Serialize nonce payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.nonce);
    }
}

/// Vendor ID Payload (RFC 7296 Section 3.12)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPayload {
    /// Vendor ID data
    pub vendor_id: Vec<u8>,
}

impl VendorPayload {
    /// Create new vendor payload
    pub fn new(vendor_id: Vec<u8>) -> Self {
        VendorPayload { vendor_id }
    }

    /// Parse vendor payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    /// Serialize vendor payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.vendor_id);
    }
}

/// EAP Payload (RFC 7296 Section 3.16)
///
/// The EAP message is carried opaquely; EAP method handling lives above the
/// message layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPayload {
    /// Raw EAP message
    pub eap_message: Vec<u8>,
}

impl EapPayload {
    /// Create new EAP payload
    pub fn new(eap_message: Vec<u8>) -> Self {
        EapPayload { eap_message }
    }

    /// Parse EAP payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    /// Serialize EAP payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.eap_message);
    }
}

/// Certificate Encoding (RFC 7296 Section 3.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CertEncoding {
    /// PKCS #7 wrapped X.509 certificate
    Pkcs7WrappedX509 = 1,
    /// PGP certificate
    Pgp = 2,
    /// DNS signed key
    DnsSignedKey = 3,
    /// X.509 certificate - signature
    X509Signature = 4,
    /// Kerberos token
    Kerberos = 6,
    /// Certificate revocation list
    Crl = 7,
    /// Authority revocation list
    Arl = 8,
    /// SPKI certificate
    Spki = 9,
    /// X.509 certificate - attribute
    X509Attribute = 10,
    /// Raw RSA key (deprecated)
    RawRsaKey = 11,
    /// Hash and URL of X.509 certificate
    HashUrlX509 = 12,
    /// Hash and URL of X.509 bundle
    HashUrlBundle = 13,
}

impl CertEncoding {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(CertEncoding::Pkcs7WrappedX509),
            2 => Some(CertEncoding::Pgp),
            3 => Some(CertEncoding::DnsSignedKey),
            4 => Some(CertEncoding::X509Signature),
            6 => Some(CertEncoding::Kerberos),
            7 => Some(CertEncoding::Crl),
            8 => Some(CertEncoding::Arl),
            9 => Some(CertEncoding::Spki),
            10 => Some(CertEncoding::X509Attribute),
            11 => Some(CertEncoding::RawRsaKey),
            12 => Some(CertEncoding::HashUrlX509),
            13 => Some(CertEncoding::HashUrlBundle),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Certificate Payload (RFC 7296 Section 3.6)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPayload {
    /// Certificate encoding code
    pub encoding: u8,

    /// Certificate data (DER for X.509)
    pub data: Vec<u8>,
}

impl CertPayload {
    /// Create an X.509 signature certificate payload from DER bytes
    pub fn x509(der: Vec<u8>) -> Self {
        CertPayload {
            encoding: CertEncoding::X509Signature.to_u8(),
            data: der,
        }
    }

    /// Known encoding, if any
    pub fn cert_encoding(&self) -> Option<CertEncoding> {
        CertEncoding::from_u8(self.encoding)
    }

    /// Parse CERT payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let encoding = reader.read_u8()?;
        let data = reader.read_rest().to_vec();

        if encoding == CertEncoding::X509Signature.to_u8() && data.is_empty() {
            return Err(Error::AuthenticationFailed("Empty X.509 certificate".into()));
        }

        Ok(CertPayload { encoding, data })
    }

    /// Serialize CERT payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.encoding);
        buf.put_slice(&self.data);
    }
}

/// Certificate Request Payload (RFC 7296 Section 3.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReqPayload {
    /// Certificate encoding code
    pub encoding: u8,

    /// Certification authority data
    pub ca_data: Vec<u8>,
}

impl CertReqPayload {
    /// SHA-1 hash length of a trust anchor's public key
    pub const CA_HASH_LEN: usize = 20;

    /// Create new CERTREQ payload
    pub fn new(encoding: CertEncoding, ca_data: Vec<u8>) -> Self {
        CertReqPayload {
            encoding: encoding.to_u8(),
            ca_data,
        }
    }

    /// Parse CERTREQ payload from data (without header)
    ///
    /// For X.509 requests the CA data is a list of SHA-1 public key hashes.
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let encoding = reader.read_u8()?;
        let ca_data = reader.read_rest().to_vec();

        if encoding == CertEncoding::X509Signature.to_u8() && ca_data.len() % Self::CA_HASH_LEN != 0 {
            return Err(Error::syntax(format!(
                "Invalid CA data length {} for X.509 certificate request",
                ca_data.len()
            )));
        }

        Ok(CertReqPayload { encoding, ca_data })
    }

    /// Trust anchor hashes (X.509 requests)
    pub fn ca_hashes(&self) -> impl Iterator<Item = &[u8]> {
        self.ca_data.chunks(Self::CA_HASH_LEN)
    }

    /// Serialize CERTREQ payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.encoding);
        buf.put_slice(&self.ca_data);
    }
}
