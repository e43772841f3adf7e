//! Authentication payload wire format

use super::ByteReader;
use crate::ipsec::crypto::signature::SignatureAlgorithm;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Authentication Method (RFC 7296 Section 3.8, RFC 7427 Section 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMethod {
    /// RSA Digital Signature (PKCS#1 v1.5 over SHA-1)
    RsaSig = 1,
    /// Shared Key Message Integrity Code
    SharedKeyMic = 2,
    /// Digital Signature with ASN.1 algorithm identifier
    GenericDigitalSignature = 14,
}

impl AuthMethod {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AuthMethod::RsaSig),
            2 => Some(AuthMethod::SharedKeyMic),
            14 => Some(AuthMethod::GenericDigitalSignature),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Authentication Payload (RFC 7296 Section 3.8)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Auth Method   |                RESERVED                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~                      Authentication Data                      ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// For the generic digital signature method the authentication data starts
/// with a one-octet ASN.1 length followed by the AlgorithmIdentifier
/// (RFC 7427 Section 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    /// Authentication method
    pub auth_method: AuthMethod,

    /// Signature algorithm (signature methods only)
    pub signature_algorithm: Option<SignatureAlgorithm>,

    /// MAC or signature bytes
    pub auth_data: Vec<u8>,
}

impl AuthPayload {
    /// Pre-shared key AUTH payload
    pub fn psk(auth_data: Vec<u8>) -> Self {
        AuthPayload {
            auth_method: AuthMethod::SharedKeyMic,
            signature_algorithm: None,
            auth_data,
        }
    }

    /// Signature AUTH payload
    ///
    /// SHA-1 RSA signatures use the legacy RSA method; everything else uses
    /// the generic digital signature method.
    pub fn signature(algorithm: SignatureAlgorithm, signature: Vec<u8>) -> Self {
        let auth_method = if algorithm == SignatureAlgorithm::Sha1WithRsa {
            AuthMethod::RsaSig
        } else {
            AuthMethod::GenericDigitalSignature
        };
        AuthPayload {
            auth_method,
            signature_algorithm: Some(algorithm),
            auth_data: signature,
        }
    }

    /// Generic digital signature AUTH payload, regardless of algorithm
    pub fn generic_signature(algorithm: SignatureAlgorithm, signature: Vec<u8>) -> Self {
        AuthPayload {
            auth_method: AuthMethod::GenericDigitalSignature,
            signature_algorithm: Some(algorithm),
            auth_data: signature,
        }
    }

    /// Parse AUTH payload from data (without header)
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed` for unknown methods or signature algorithms
    /// - `BufferTooShort` for truncated bodies
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let raw_method = reader.read_u8()?;
        reader.skip(3)?;

        let auth_method = AuthMethod::from_u8(raw_method).ok_or_else(|| {
            Error::AuthenticationFailed(format!("Unrecognized authentication method: {}", raw_method))
        })?;

        let signature_algorithm = match auth_method {
            AuthMethod::SharedKeyMic => None,
            AuthMethod::RsaSig => Some(SignatureAlgorithm::Sha1WithRsa),
            AuthMethod::GenericDigitalSignature => {
                let id_len = reader.read_u8()? as usize;
                let identifier = reader.read_bytes(id_len)?;
                let algorithm = SignatureAlgorithm::from_asn1_identifier(identifier).ok_or_else(|| {
                    Error::AuthenticationFailed(format!(
                        "Unrecognized signature algorithm identifier: {}",
                        hex::encode(identifier)
                    ))
                })?;
                Some(algorithm)
            }
        };

        Ok(AuthPayload {
            auth_method,
            signature_algorithm,
            auth_data: reader.read_rest().to_vec(),
        })
    }

    /// Serialize AUTH payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.auth_method.to_u8());
        buf.put_slice(&[0u8; 3]);

        if self.auth_method == AuthMethod::GenericDigitalSignature {
            if let Some(algorithm) = self.signature_algorithm {
                let identifier = algorithm.asn1_identifier();
                buf.put_u8(identifier.len() as u8);
                buf.put_slice(identifier);
            }
        }
        buf.put_slice(&self.auth_data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(auth: &AuthPayload) -> Vec<u8> {
        let mut buf = BytesMut::new();
        auth.encode_to(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_auth_payload_psk() {
        let auth = AuthPayload::psk(vec![0xAA; 32]);
        let data = encode(&auth);
        assert_eq!(data[0], 2);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(AuthPayload::from_payload_data(&data).unwrap(), auth);
    }

    #[test]
    fn test_auth_payload_rsa_is_sha1() {
        let data = [1, 0, 0, 0, 0xBB, 0xBB];
        let auth = AuthPayload::from_payload_data(&data).unwrap();
        assert_eq!(auth.auth_method, AuthMethod::RsaSig);
        assert_eq!(auth.signature_algorithm, Some(SignatureAlgorithm::Sha1WithRsa));
        assert_eq!(auth.auth_data, vec![0xBB, 0xBB]);
    }

    #[test]
    fn test_auth_payload_generic_signature() {
        let auth = AuthPayload::signature(SignatureAlgorithm::Sha256WithRsa, vec![0xCC; 256]);
        assert_eq!(auth.auth_method, AuthMethod::GenericDigitalSignature);

        let data = encode(&auth);
        assert_eq!(data[0], 14);
        assert_eq!(data[4], 15);
        assert_eq!(data.len(), 4 + 1 + 15 + 256);
        assert_eq!(AuthPayload::from_payload_data(&data).unwrap(), auth);
    }

    #[test]
    fn test_auth_payload_unknown_identifier() {
        let mut data = vec![14, 0, 0, 0, 3, 0x30, 0x01, 0x00];
        data.extend_from_slice(&[0xDD; 8]);
        assert!(matches!(
            AuthPayload::from_payload_data(&data),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_auth_payload_unknown_method() {
        assert!(matches!(
            AuthPayload::from_payload_data(&[9, 0, 0, 0, 1]),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_auth_payload_truncated_identifier() {
        assert!(matches!(
            AuthPayload::from_payload_data(&[14, 0, 0, 0, 15, 0x30]),
            Err(Error::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_auth_method_conversion() {
        assert_eq!(AuthMethod::from_u8(1), Some(AuthMethod::RsaSig));
        assert_eq!(AuthMethod::from_u8(2), Some(AuthMethod::SharedKeyMic));
        assert_eq!(AuthMethod::from_u8(14), Some(AuthMethod::GenericDigitalSignature));
        assert_eq!(AuthMethod::from_u8(99), None);
    }
}
