//! Pseudo-Random Function (PRF) implementations
//!
//! HMAC based PRFs as negotiated in transform type 2 (RFC 7296 Section 3.3.2).

use super::IkePrf;
use crate::ipsec::ikev2::proposal::PrfTransformId;
use crate::ipsec::{Error, Result};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

/// PRF algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrfAlgorithm {
    /// HMAC-SHA1
    HmacSha1,
    /// HMAC-SHA2-256
    HmacSha256,
    /// HMAC-SHA2-384
    HmacSha384,
    /// HMAC-SHA2-512
    HmacSha512,
}

impl PrfAlgorithm {
    /// Map a negotiated PRF transform to its implementation
    pub fn from_transform(id: PrfTransformId) -> Option<Self> {
        match id {
            PrfTransformId::HmacSha1 => Some(PrfAlgorithm::HmacSha1),
            PrfTransformId::HmacSha256 => Some(PrfAlgorithm::HmacSha256),
            PrfTransformId::HmacSha384 => Some(PrfAlgorithm::HmacSha384),
            PrfTransformId::HmacSha512 => Some(PrfAlgorithm::HmacSha512),
            _ => None,
        }
    }

    /// Get PRF output length in bytes
    pub fn output_len(self) -> usize {
        match self {
            PrfAlgorithm::HmacSha1 => 20,
            PrfAlgorithm::HmacSha256 => 32,
            PrfAlgorithm::HmacSha384 => 48,
            PrfAlgorithm::HmacSha512 => 64,
        }
    }

    /// Compute prf(key, data)
    pub fn compute(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            PrfAlgorithm::HmacSha1 => hmac_digest::<Hmac<Sha1>>(key, data),
            PrfAlgorithm::HmacSha256 => hmac_digest::<Hmac<Sha256>>(key, data),
            PrfAlgorithm::HmacSha384 => hmac_digest::<Hmac<Sha384>>(key, data),
            PrfAlgorithm::HmacSha512 => hmac_digest::<Hmac<Sha512>>(key, data),
        }
    }
}

impl IkePrf for PrfAlgorithm {
    fn output_len(&self) -> usize {
        PrfAlgorithm::output_len(*self)
    }

    fn sign_bytes(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        self.compute(key, data)
    }
}

/// Full-length HMAC over `data`
pub(crate) fn hmac_digest<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|_| Error::CryptoError("Failed to initialize HMAC".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prf_output_lengths() {
        assert_eq!(PrfAlgorithm::HmacSha1.output_len(), 20);
        assert_eq!(PrfAlgorithm::HmacSha256.output_len(), 32);
        assert_eq!(PrfAlgorithm::HmacSha384.output_len(), 48);
        assert_eq!(PrfAlgorithm::HmacSha512.output_len(), 64);
    }

    #[test]
    fn test_prf_compute_lengths() {
        for alg in [
            PrfAlgorithm::HmacSha1,
            PrfAlgorithm::HmacSha256,
            PrfAlgorithm::HmacSha384,
            PrfAlgorithm::HmacSha512,
        ] {
            let out = alg.compute(b"key", b"data").unwrap();
            assert_eq!(out.len(), alg.output_len());
        }
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case2() {
        let out = PrfAlgorithm::HmacSha256
            .compute(b"Jefe", b"what do ya want for nothing?")
            .unwrap();
        assert_eq!(
            hex::encode(out),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha1_rfc2202_case2() {
        let out = PrfAlgorithm::HmacSha1
            .compute(b"Jefe", b"what do ya want for nothing?")
            .unwrap();
        assert_eq!(hex::encode(out), "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79");
    }

    #[test]
    fn test_prf_deterministic_and_key_dependent() {
        let a = PrfAlgorithm::HmacSha512.compute(b"k1", b"seed").unwrap();
        let b = PrfAlgorithm::HmacSha512.compute(b"k1", b"seed").unwrap();
        let c = PrfAlgorithm::HmacSha512.compute(b"k2", b"seed").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_prf_from_transform() {
        assert_eq!(
            PrfAlgorithm::from_transform(PrfTransformId::HmacSha256),
            Some(PrfAlgorithm::HmacSha256)
        );
        assert_eq!(PrfAlgorithm::from_transform(PrfTransformId::Aes128Xcbc), None);
    }

    #[test]
    fn test_prf_trait_object() {
        let prf: &dyn IkePrf = &PrfAlgorithm::HmacSha384;
        assert_eq!(prf.output_len(), 48);
        assert_eq!(prf.sign_bytes(b"k", b"d").unwrap().len(), 48);
    }
}
