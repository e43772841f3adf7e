//! Cryptographic collaborators of the IKEv2 codec
//!
//! The codec only talks to the traits defined here. The submodules provide
//! reference implementations on vetted crates:
//!
//! - [`cipher`]: AES-CBC, AES-GCM and ChaCha20-Poly1305
//! - [`integrity`]: truncated HMAC-SHA1/SHA2
//! - [`prf`]: HMAC-SHA1/SHA2 PRFs
//! - [`signature`]: RSA PKCS#1 v1.5 signatures

pub mod cipher;
pub mod integrity;
pub mod prf;
pub mod signature;

pub use cipher::CipherAlgorithm;
pub use integrity::IntegrityAlgorithm;
pub use prf::PrfAlgorithm;
pub use signature::{RsaSigner, RsaVerifier, SignatureAlgorithm};

use crate::ipsec::Result;

/// Encryption algorithm used for SK and SKF payloads
///
/// Combined-mode (AEAD) ciphers append their tag to the ciphertext and
/// report its size through [`checksum_len`](Self::checksum_len). Normal-mode
/// ciphers ignore `aad` and are paired with an [`IkeIntegrity`].
pub trait IkeCipher: Send + Sync {
    /// Length of the key material in bytes
    fn key_len(&self) -> usize;

    /// Length of the explicit IV carried in the payload
    fn iv_len(&self) -> usize;

    /// Block size used for padding
    fn block_size(&self) -> usize;

    /// Whether this is a combined-mode cipher
    fn is_aead(&self) -> bool;

    /// Length of the authentication tag for combined-mode ciphers, 0 otherwise
    fn checksum_len(&self) -> usize;

    /// Fresh random IV
    fn generate_iv(&self) -> Vec<u8>;

    /// Encrypt `plaintext`, already padded to the block size
    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext`, verifying the tag for combined-mode ciphers
    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

/// Integrity algorithm protecting normal-mode encrypted payloads
pub trait IkeIntegrity: Send + Sync {
    /// Length of the truncated checksum
    fn checksum_len(&self) -> usize;

    /// Key length in bytes
    fn key_len(&self) -> usize;

    /// Compute the truncated checksum over `data`
    fn sign(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    /// Check `checksum` against `data` in constant time
    fn verify(&self, key: &[u8], data: &[u8], checksum: &[u8]) -> Result<bool>;
}

/// Pseudo-random function negotiated for the IKE SA
pub trait IkePrf: Send + Sync {
    /// Output length in bytes
    fn output_len(&self) -> usize;

    /// prf(key, data)
    fn sign_bytes(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;
}

/// Private-key half of a signature authentication method
pub trait IkeSigner: Send + Sync {
    /// Algorithm this signer produces
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Sign `data`
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Public-key half of a signature authentication method
pub trait IkeVerifier: Send + Sync {
    /// Verify `signature` over `data`
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` if the signature does not verify or
    /// the algorithm is not supported by this verifier
    fn verify(&self, algorithm: SignatureAlgorithm, data: &[u8], signature: &[u8]) -> Result<()>;
}
