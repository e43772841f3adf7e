//! Cipher implementations for IKEv2 encryption
//!
//! Implements encryption and decryption for the SK and SKF payloads
//! (RFC 7296 Section 3.14, RFC 5282, RFC 7634).
//!
//! Key material for the combined-mode ciphers is the cipher key followed by
//! a 4-byte salt. The 12-byte AEAD nonce is `salt | IV` with an 8-byte
//! explicit IV carried in the payload.

use super::IkeCipher;
use crate::ipsec::ikev2::proposal::{
    EncrTransformId, KEY_LEN_AES_128, KEY_LEN_AES_192, KEY_LEN_AES_256,
};
use crate::ipsec::{Error, Result};
use aes::{Aes128, Aes192, Aes256};
use aes_gcm::{
    aead::{Aead, KeyInit, Nonce, Payload},
    Aes128Gcm, Aes256Gcm,
};
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;
type Aes192CbcEnc = Encryptor<Aes192>;
type Aes192CbcDec = Decryptor<Aes192>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// Salt length for combined-mode key material
pub const AEAD_SALT_LEN: usize = 4;

/// Explicit IV length for combined-mode ciphers
pub const AEAD_IV_LEN: usize = 8;

/// Tag length of all supported combined-mode ciphers
pub const AEAD_TAG_LEN: usize = 16;

const AES_BLOCK_SIZE: usize = 16;
const CHACHA_BLOCK_SIZE: usize = 4;

/// Cipher algorithm for SK payload encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CipherAlgorithm {
    /// AES-CBC with 128-bit key
    AesCbc128,
    /// AES-CBC with 192-bit key
    AesCbc192,
    /// AES-CBC with 256-bit key
    AesCbc256,
    /// AES-GCM with 16-byte ICV and 128-bit key (AEAD)
    AesGcm16_128,
    /// AES-GCM with 16-byte ICV and 256-bit key (AEAD)
    AesGcm16_256,
    /// ChaCha20-Poly1305 (AEAD)
    ChaCha20Poly1305,
}

impl CipherAlgorithm {
    /// Map a negotiated encryption transform to its implementation
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for transforms without an implementation
    pub fn from_transform(id: EncrTransformId, key_length: u16) -> Result<Self> {
        match (id, key_length) {
            (EncrTransformId::AesCbc, KEY_LEN_AES_128) => Ok(CipherAlgorithm::AesCbc128),
            (EncrTransformId::AesCbc, KEY_LEN_AES_192) => Ok(CipherAlgorithm::AesCbc192),
            (EncrTransformId::AesCbc, KEY_LEN_AES_256) => Ok(CipherAlgorithm::AesCbc256),
            (EncrTransformId::AesGcm16, KEY_LEN_AES_128) => Ok(CipherAlgorithm::AesGcm16_128),
            (EncrTransformId::AesGcm16, KEY_LEN_AES_256) => Ok(CipherAlgorithm::AesGcm16_256),
            (EncrTransformId::ChaCha20Poly1305, _) => Ok(CipherAlgorithm::ChaCha20Poly1305),
            _ => Err(Error::InvalidParameter(format!(
                "No cipher implementation for {:?} with key length {}",
                id, key_length
            ))),
        }
    }

    /// Length of the key material in bytes, salt included
    pub fn key_len(self) -> usize {
        match self {
            CipherAlgorithm::AesCbc128 => 16,
            CipherAlgorithm::AesCbc192 => 24,
            CipherAlgorithm::AesCbc256 => 32,
            CipherAlgorithm::AesGcm16_128 => 16 + AEAD_SALT_LEN,
            CipherAlgorithm::AesGcm16_256 => 32 + AEAD_SALT_LEN,
            CipherAlgorithm::ChaCha20Poly1305 => 32 + AEAD_SALT_LEN,
        }
    }

    /// Get IV length in bytes
    pub fn iv_len(self) -> usize {
        if self.is_aead() {
            AEAD_IV_LEN
        } else {
            AES_BLOCK_SIZE
        }
    }

    /// Padding block size
    pub fn block_size(self) -> usize {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => CHACHA_BLOCK_SIZE,
            _ => AES_BLOCK_SIZE,
        }
    }

    /// Get authentication tag length in bytes, 0 for normal-mode ciphers
    pub fn tag_len(self) -> usize {
        if self.is_aead() {
            AEAD_TAG_LEN
        } else {
            0
        }
    }

    /// Check if this is an AEAD cipher
    pub fn is_aead(self) -> bool {
        matches!(
            self,
            CipherAlgorithm::AesGcm16_128
                | CipherAlgorithm::AesGcm16_256
                | CipherAlgorithm::ChaCha20Poly1305
        )
    }

    fn check_lengths(self, key: &[u8], iv: &[u8]) -> Result<()> {
        if key.len() != self.key_len() {
            return Err(Error::InvalidKeyLength {
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        if iv.len() != self.iv_len() {
            return Err(Error::InvalidIvLength {
                expected: self.iv_len(),
                actual: iv.len(),
            });
        }
        Ok(())
    }

    fn check_block_multiple(self, data: &[u8]) -> Result<()> {
        let block = self.block_size();
        if data.len() % block != 0 {
            return Err(Error::InvalidLength {
                expected: (data.len() / block + 1) * block,
                actual: data.len(),
            });
        }
        Ok(())
    }

    /// Encrypt data
    ///
    /// # Arguments
    ///
    /// * `key` - Encryption key material (SK_e), salt included for AEAD
    /// * `iv` - Explicit IV
    /// * `plaintext` - Data to encrypt, padded to the block size for CBC
    /// * `aad` - Additional authenticated data (ignored for CBC)
    ///
    /// # Returns
    ///
    /// Returns ciphertext, with the tag appended for AEAD ciphers
    pub fn encrypt(self, key: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.check_lengths(key, iv)?;

        match self {
            CipherAlgorithm::AesCbc128 => cbc_encrypt::<Aes128CbcEnc>(self, key, iv, plaintext),
            CipherAlgorithm::AesCbc192 => cbc_encrypt::<Aes192CbcEnc>(self, key, iv, plaintext),
            CipherAlgorithm::AesCbc256 => cbc_encrypt::<Aes256CbcEnc>(self, key, iv, plaintext),
            CipherAlgorithm::AesGcm16_128 => aead_seal::<Aes128Gcm>(key, iv, plaintext, aad),
            CipherAlgorithm::AesGcm16_256 => aead_seal::<Aes256Gcm>(key, iv, plaintext, aad),
            CipherAlgorithm::ChaCha20Poly1305 => {
                aead_seal::<chacha20poly1305::ChaCha20Poly1305>(key, iv, plaintext, aad)
            }
        }
    }

    /// Decrypt data
    ///
    /// # Arguments
    ///
    /// * `key` - Encryption key material (SK_e), salt included for AEAD
    /// * `iv` - Explicit IV
    /// * `ciphertext` - Data to decrypt (includes the tag for AEAD ciphers)
    /// * `aad` - Additional authenticated data (ignored for CBC)
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` if the AEAD tag does not verify
    pub fn decrypt(self, key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        self.check_lengths(key, iv)?;

        if ciphertext.len() < self.tag_len() {
            return Err(Error::BufferTooShort {
                required: self.tag_len(),
                available: ciphertext.len(),
            });
        }

        match self {
            CipherAlgorithm::AesCbc128 => cbc_decrypt::<Aes128CbcDec>(self, key, iv, ciphertext),
            CipherAlgorithm::AesCbc192 => cbc_decrypt::<Aes192CbcDec>(self, key, iv, ciphertext),
            CipherAlgorithm::AesCbc256 => cbc_decrypt::<Aes256CbcDec>(self, key, iv, ciphertext),
            CipherAlgorithm::AesGcm16_128 => aead_open::<Aes128Gcm>(key, iv, ciphertext, aad),
            CipherAlgorithm::AesGcm16_256 => aead_open::<Aes256Gcm>(key, iv, ciphertext, aad),
            CipherAlgorithm::ChaCha20Poly1305 => {
                aead_open::<chacha20poly1305::ChaCha20Poly1305>(key, iv, ciphertext, aad)
            }
        }
    }
}

impl IkeCipher for CipherAlgorithm {
    fn key_len(&self) -> usize {
        CipherAlgorithm::key_len(*self)
    }

    fn iv_len(&self) -> usize {
        CipherAlgorithm::iv_len(*self)
    }

    fn block_size(&self) -> usize {
        CipherAlgorithm::block_size(*self)
    }

    fn is_aead(&self) -> bool {
        CipherAlgorithm::is_aead(*self)
    }

    fn checksum_len(&self) -> usize {
        self.tag_len()
    }

    fn generate_iv(&self) -> Vec<u8> {
        let mut iv = vec![0u8; CipherAlgorithm::iv_len(*self)];
        rand::thread_rng().fill_bytes(&mut iv);
        iv
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        CipherAlgorithm::encrypt(*self, key, iv, plaintext, aad)
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        CipherAlgorithm::decrypt(*self, key, iv, ciphertext, aad)
    }
}

fn cbc_encrypt<E: KeyIvInit + BlockEncryptMut>(
    alg: CipherAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    alg.check_block_multiple(plaintext)?;
    let encryptor = E::new_from_slices(key, iv)
        .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<NoPadding>(plaintext))
}

fn cbc_decrypt<D: KeyIvInit + BlockDecryptMut>(
    alg: CipherAlgorithm,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    alg.check_block_multiple(ciphertext)?;
    let decryptor = D::new_from_slices(key, iv)
        .map_err(|_| Error::CryptoError("Failed to create AES-CBC cipher".into()))?;
    decryptor
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}

/// Split AEAD key material into the cipher key and the 12-byte nonce
fn aead_key_and_nonce<'a>(key: &'a [u8], iv: &[u8]) -> (&'a [u8], [u8; 12]) {
    let (cipher_key, salt) = key.split_at(key.len() - AEAD_SALT_LEN);
    let mut nonce = [0u8; 12];
    nonce[..AEAD_SALT_LEN].copy_from_slice(salt);
    nonce[AEAD_SALT_LEN..].copy_from_slice(iv);
    (cipher_key, nonce)
}

fn aead_seal<A: Aead + KeyInit>(key: &[u8], iv: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let (cipher_key, nonce) = aead_key_and_nonce(key, iv);
    let cipher = A::new_from_slice(cipher_key)
        .map_err(|_| Error::CryptoError("Failed to create AEAD cipher".into()))?;

    cipher
        .encrypt(Nonce::<A>::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|_| Error::CryptoError("AEAD encryption failed".into()))
}

fn aead_open<A: Aead + KeyInit>(key: &[u8], iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let (cipher_key, nonce) = aead_key_and_nonce(key, iv);
    let cipher = A::new_from_slice(cipher_key)
        .map_err(|_| Error::CryptoError("Failed to create AEAD cipher".into()))?;

    cipher
        .decrypt(Nonce::<A>::from_slice(&nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| Error::DecryptionFailed)
}
