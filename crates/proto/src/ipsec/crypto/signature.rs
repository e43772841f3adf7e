//! Digital signature algorithms for AUTH payloads
//!
//! RSA PKCS#1 v1.5 signatures identified by their ASN.1 AlgorithmIdentifier
//! (RFC 7427 Appendix A). Keys are handled by `ring`.
//!
//! # Security
//!
//! - RSA keys must be at least 2048 bits
//! - SHA-1 is accepted for verification only, for peers using the legacy
//!   RSA authentication method

use super::{IkeSigner, IkeVerifier};
use crate::ipsec::{Error, Result};
use ring::signature::{
    KeyPair, RsaKeyPair, UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
    RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA384, RSA_PKCS1_2048_8192_SHA512,
    RSA_PKCS1_SHA256, RSA_PKCS1_SHA384, RSA_PKCS1_SHA512,
};

const SHA1_WITH_RSA_ID: [u8; 15] = asn1_rsa_identifier(0x05);
const SHA256_WITH_RSA_ID: [u8; 15] = asn1_rsa_identifier(0x0b);
const SHA384_WITH_RSA_ID: [u8; 15] = asn1_rsa_identifier(0x0c);
const SHA512_WITH_RSA_ID: [u8; 15] = asn1_rsa_identifier(0x0d);

/// AlgorithmIdentifier for `1.2.840.113549.1.1.<arc>` with NULL parameters
const fn asn1_rsa_identifier(arc: u8) -> [u8; 15] {
    [
        0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, arc, 0x05, 0x00,
    ]
}

/// Signature algorithm carried by a signature AUTH payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignatureAlgorithm {
    /// sha1WithRSAEncryption
    Sha1WithRsa,
    /// sha256WithRSAEncryption
    Sha256WithRsa,
    /// sha384WithRSAEncryption
    Sha384WithRsa,
    /// sha512WithRSAEncryption
    Sha512WithRsa,
}

impl SignatureAlgorithm {
    /// DER encoded AlgorithmIdentifier
    pub fn asn1_identifier(self) -> &'static [u8] {
        match self {
            SignatureAlgorithm::Sha1WithRsa => &SHA1_WITH_RSA_ID,
            SignatureAlgorithm::Sha256WithRsa => &SHA256_WITH_RSA_ID,
            SignatureAlgorithm::Sha384WithRsa => &SHA384_WITH_RSA_ID,
            SignatureAlgorithm::Sha512WithRsa => &SHA512_WITH_RSA_ID,
        }
    }

    /// Look up an algorithm by its exact AlgorithmIdentifier encoding
    pub fn from_asn1_identifier(identifier: &[u8]) -> Option<Self> {
        [
            SignatureAlgorithm::Sha1WithRsa,
            SignatureAlgorithm::Sha256WithRsa,
            SignatureAlgorithm::Sha384WithRsa,
            SignatureAlgorithm::Sha512WithRsa,
        ]
        .into_iter()
        .find(|alg| alg.asn1_identifier() == identifier)
    }

    /// Algorithm name used in logs
    pub fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1WithRsa => "SHA1withRSA",
            SignatureAlgorithm::Sha256WithRsa => "SHA256withRSA",
            SignatureAlgorithm::Sha384WithRsa => "SHA384withRSA",
            SignatureAlgorithm::Sha512WithRsa => "SHA512withRSA",
        }
    }
}

/// RSA public key verifying peer AUTH payloads
#[derive(Debug, Clone)]
pub struct RsaVerifier {
    public_key_der: Vec<u8>,
}

impl RsaVerifier {
    /// Create from a DER-encoded PKCS#1 RSAPublicKey
    pub fn from_der(public_key_der: &[u8]) -> Self {
        RsaVerifier {
            public_key_der: public_key_der.to_vec(),
        }
    }

    /// Get the public key in DER format
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }
}

impl IkeVerifier for RsaVerifier {
    fn verify(&self, algorithm: SignatureAlgorithm, data: &[u8], signature: &[u8]) -> Result<()> {
        let params = match algorithm {
            SignatureAlgorithm::Sha1WithRsa => &RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            SignatureAlgorithm::Sha256WithRsa => &RSA_PKCS1_2048_8192_SHA256,
            SignatureAlgorithm::Sha384WithRsa => &RSA_PKCS1_2048_8192_SHA384,
            SignatureAlgorithm::Sha512WithRsa => &RSA_PKCS1_2048_8192_SHA512,
        };

        UnparsedPublicKey::new(params, &self.public_key_der)
            .verify(data, signature)
            .map_err(|_| {
                Error::AuthenticationFailed(format!("{} signature verification failed", algorithm.name()))
            })
    }
}

/// RSA private key producing local AUTH payloads
pub struct RsaSigner {
    key_pair: RsaKeyPair,
    algorithm: SignatureAlgorithm,
}

impl RsaSigner {
    /// Create from a DER-encoded PKCS#8 private key
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if the key cannot be parsed
    /// - `InvalidParameter` for SHA-1, which is never used for signing
    pub fn from_pkcs8(private_key_der: &[u8], algorithm: SignatureAlgorithm) -> Result<Self> {
        if algorithm == SignatureAlgorithm::Sha1WithRsa {
            return Err(Error::InvalidParameter(
                "SHA-1 RSA signatures are only accepted for verification".into(),
            ));
        }

        let key_pair = RsaKeyPair::from_pkcs8(private_key_der)
            .map_err(|e| Error::InvalidParameter(format!("Invalid RSA private key: {:?}", e)))?;

        Ok(RsaSigner { key_pair, algorithm })
    }

    /// DER-encoded PKCS#1 public key matching this signer
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Verifier for the public half of this key
    pub fn verifier(&self) -> RsaVerifier {
        RsaVerifier::from_der(self.key_pair.public_key().as_ref())
    }
}

impl std::fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigner")
            .field("algorithm", &self.algorithm)
            .field("public_key", &hex::encode(self.key_pair.public_key().as_ref()))
            .finish_non_exhaustive()
    }
}

impl IkeSigner for RsaSigner {
    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let encoding = match self.algorithm {
            SignatureAlgorithm::Sha256WithRsa => &RSA_PKCS1_SHA256,
            SignatureAlgorithm::Sha384WithRsa => &RSA_PKCS1_SHA384,
            SignatureAlgorithm::Sha512WithRsa => &RSA_PKCS1_SHA512,
            SignatureAlgorithm::Sha1WithRsa => {
                return Err(Error::InvalidParameter("SHA-1 RSA signing is not supported".into()));
            }
        };

        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        let rng = ring::rand::SystemRandom::new();
        self.key_pair
            .sign(encoding, &rng, data, &mut signature)
            .map_err(|e| Error::CryptoError(format!("RSA signing failed: {:?}", e)))?;

        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE_KEY: &[u8] = include_bytes!("../../../tests/data/rsa2048_pkcs8.der");
    const PUBLIC_KEY: &[u8] = include_bytes!("../../../tests/data/rsa2048_public_pkcs1.der");
    const SHA1_SIGNATURE: &[u8] = include_bytes!("../../../tests/data/rsa2048_sha1.sig");
    const SIGNED_MESSAGE: &[u8] = b"IKEv2 signed octets";

    #[test]
    fn test_asn1_identifiers() {
        let id = SignatureAlgorithm::Sha256WithRsa.asn1_identifier();
        assert_eq!(id.len(), 15);
        assert_eq!(id[12], 0x0b);

        for alg in [
            SignatureAlgorithm::Sha1WithRsa,
            SignatureAlgorithm::Sha256WithRsa,
            SignatureAlgorithm::Sha384WithRsa,
            SignatureAlgorithm::Sha512WithRsa,
        ] {
            assert_eq!(SignatureAlgorithm::from_asn1_identifier(alg.asn1_identifier()), Some(alg));
        }
    }

    #[test]
    fn test_unknown_identifier() {
        let mut id = SHA512_WITH_RSA_ID.to_vec();
        id[12] = 0x0e;
        assert_eq!(SignatureAlgorithm::from_asn1_identifier(&id), None);
        assert_eq!(SignatureAlgorithm::from_asn1_identifier(&SHA512_WITH_RSA_ID[..14]), None);
    }

    #[test]
    fn test_verify_legacy_sha1_signature() {
        let verifier = RsaVerifier::from_der(PUBLIC_KEY);
        verifier
            .verify(SignatureAlgorithm::Sha1WithRsa, SIGNED_MESSAGE, SHA1_SIGNATURE)
            .unwrap();

        let result = verifier.verify(SignatureAlgorithm::Sha256WithRsa, SIGNED_MESSAGE, SHA1_SIGNATURE);
        assert!(matches!(result, Err(Error::AuthenticationFailed(_))));
    }

    #[test]
    fn test_sign_verify() {
        for alg in [
            SignatureAlgorithm::Sha256WithRsa,
            SignatureAlgorithm::Sha384WithRsa,
            SignatureAlgorithm::Sha512WithRsa,
        ] {
            let signer = RsaSigner::from_pkcs8(PRIVATE_KEY, alg).unwrap();
            assert_eq!(signer.public_key_der(), PUBLIC_KEY);

            let signature = signer.sign(b"data to sign").unwrap();
            assert_eq!(signature.len(), 256);

            let verifier = signer.verifier();
            verifier.verify(alg, b"data to sign", &signature).unwrap();
            assert!(verifier.verify(alg, b"other data", &signature).is_err());
        }
    }

    #[test]
    fn test_signer_rejects_sha1() {
        assert!(matches!(
            RsaSigner::from_pkcs8(PRIVATE_KEY, SignatureAlgorithm::Sha1WithRsa),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_signer_rejects_garbage_key() {
        assert!(matches!(
            RsaSigner::from_pkcs8(&[0x30, 0x03, 0x02, 0x01, 0x00], SignatureAlgorithm::Sha256WithRsa),
            Err(Error::InvalidParameter(_))
        ));
    }
}
