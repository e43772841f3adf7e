//! Encrypted (SK) and Encrypted Fragment (SKF) payloads
//!
//! Implements RFC 7296 Section 3.14 and RFC 7383 Section 2.5.
//!
//! ```text
//! SK:  | generic header | IV | ciphertext (inner payloads + padding + pad length) | checksum |
//! SKF: | generic header | fragment number | total fragments | IV | ciphertext | checksum |
//! ```
//!
//! The generic header's next payload field carries the type of the first
//! inner payload. Both payloads must be the last one of their message.

use super::constants::{PayloadType, IKE_HEADER_SIZE, PAYLOAD_HEADER_SIZE, SKF_SUBHEADER_SIZE};
use super::header::IkeHeader;
use super::payload::PayloadHeader;
use crate::ipsec::crypto::{IkeCipher, IkeIntegrity};
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::sync::Arc;
use zeroize::Zeroizing;

/// Negotiated algorithms and keys protecting one direction of an IKE SA
#[derive(Clone)]
pub struct EncryptionContext {
    cipher: Arc<dyn IkeCipher>,
    integrity: Option<Arc<dyn IkeIntegrity>>,
    encryption_key: Zeroizing<Vec<u8>>,
    integrity_key: Zeroizing<Vec<u8>>,
}

impl EncryptionContext {
    /// Combine a cipher with its optional integrity algorithm and keys
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if a combined-mode cipher is paired with an
    ///   integrity algorithm or a normal-mode cipher lacks one
    /// - `InvalidKeyLength` if a key does not match its algorithm
    pub fn new(
        cipher: Arc<dyn IkeCipher>,
        integrity: Option<Arc<dyn IkeIntegrity>>,
        encryption_key: Vec<u8>,
        integrity_key: Vec<u8>,
    ) -> Result<Self> {
        match (&integrity, cipher.is_aead()) {
            (Some(_), true) => {
                return Err(Error::InvalidParameter(
                    "Combined-mode cipher must not use an integrity algorithm".into(),
                ));
            }
            (None, false) => {
                return Err(Error::InvalidParameter(
                    "Normal-mode cipher requires an integrity algorithm".into(),
                ));
            }
            _ => {}
        }

        if encryption_key.len() != cipher.key_len() {
            return Err(Error::InvalidKeyLength {
                expected: cipher.key_len(),
                actual: encryption_key.len(),
            });
        }
        let integrity_key_len = integrity.as_ref().map_or(0, |integ| integ.key_len());
        if integrity_key.len() != integrity_key_len {
            return Err(Error::InvalidKeyLength {
                expected: integrity_key_len,
                actual: integrity_key.len(),
            });
        }

        Ok(EncryptionContext {
            cipher,
            integrity,
            encryption_key: Zeroizing::new(encryption_key),
            integrity_key: Zeroizing::new(integrity_key),
        })
    }

    /// Negotiated cipher
    pub fn cipher(&self) -> &dyn IkeCipher {
        self.cipher.as_ref()
    }

    /// Explicit IV length
    pub fn iv_len(&self) -> usize {
        self.cipher.iv_len()
    }

    /// Padding block size
    pub fn block_size(&self) -> usize {
        self.cipher.block_size()
    }

    /// Length of the trailing checksum or AEAD tag
    pub fn checksum_len(&self) -> usize {
        match &self.integrity {
            Some(integ) => integ.checksum_len(),
            None => self.cipher.checksum_len(),
        }
    }

    /// Encrypted body length for `plaintext_len` bytes of inner payloads
    pub fn encrypted_body_len(&self, plaintext_len: usize) -> usize {
        self.iv_len() + padded_len(plaintext_len, self.block_size()) + self.checksum_len()
    }
}

impl fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("iv_len", &self.iv_len())
            .field("block_size", &self.block_size())
            .field("checksum_len", &self.checksum_len())
            .field("aead", &self.cipher.is_aead())
            .finish_non_exhaustive()
    }
}

/// Ciphertext length: inner payloads, padding and the pad length octet
fn padded_len(plaintext_len: usize, block_size: usize) -> usize {
    let block = block_size.max(1);
    (plaintext_len + block) / block * block
}

/// IV, ciphertext and checksum of an SK or SKF payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayloadBody {
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    checksum: Vec<u8>,
    plaintext: Vec<u8>,
}

impl EncryptedPayloadBody {
    /// Encrypt `plaintext` and return the payload body bytes
    ///
    /// `prefix` is everything in the packet before the IV: the IKE header,
    /// the generic payload header and, for SKF, the fragment sub-header.
    /// It is authenticated together with the body.
    pub fn encrypt(ctx: &EncryptionContext, prefix: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let block_size = ctx.block_size();
        let total = padded_len(plaintext.len(), block_size);
        let pad_len = total - plaintext.len() - 1;

        let mut padded = Zeroizing::new(Vec::with_capacity(total));
        padded.extend_from_slice(plaintext);
        padded.resize(total - 1, 0);
        padded.push(pad_len as u8);

        let iv = ctx.cipher.generate_iv();
        let mut body = Vec::with_capacity(ctx.encrypted_body_len(plaintext.len()));
        body.extend_from_slice(&iv);

        match &ctx.integrity {
            None => {
                let sealed = ctx.cipher.encrypt(&ctx.encryption_key, &iv, &padded, prefix)?;
                body.extend_from_slice(&sealed);
            }
            Some(integ) => {
                let ciphertext = ctx.cipher.encrypt(&ctx.encryption_key, &iv, &padded, &[])?;
                body.extend_from_slice(&ciphertext);

                let mut signed = Vec::with_capacity(prefix.len() + body.len());
                signed.extend_from_slice(prefix);
                signed.extend_from_slice(&body);
                body.extend_from_slice(&integ.sign(&ctx.integrity_key, &signed)?);
            }
        }

        Ok(body)
    }

    /// Authenticate and decrypt the body starting at `body_offset`
    ///
    /// The body runs to the end of `packet`.
    ///
    /// # Errors
    ///
    /// - `InvalidSyntax` if the body cannot hold an IV and a checksum
    /// - `DecryptionFailed` if the checksum, the tag or the padding is wrong
    pub fn decrypt(ctx: &EncryptionContext, packet: &[u8], body_offset: usize) -> Result<Self> {
        let iv_len = ctx.iv_len();
        let checksum_len = ctx.checksum_len();
        let body = packet
            .get(body_offset..)
            .filter(|body| body.len() >= iv_len + checksum_len)
            .ok_or_else(|| Error::syntax("Encrypted payload body too short"))?;

        let iv = &body[..iv_len];
        let checksum_start = body.len() - checksum_len;
        let checksum = &body[checksum_start..];

        let padded = match &ctx.integrity {
            None => {
                let aad = &packet[..body_offset];
                ctx.cipher
                    .decrypt(&ctx.encryption_key, iv, &body[iv_len..], aad)
                    .map_err(|_| Error::DecryptionFailed)?
            }
            Some(integ) => {
                let signed = &packet[..packet.len() - checksum_len];
                if !integ.verify(&ctx.integrity_key, signed, checksum)? {
                    return Err(Error::DecryptionFailed);
                }
                ctx.cipher
                    .decrypt(&ctx.encryption_key, iv, &body[iv_len..checksum_start], &[])
                    .map_err(|_| Error::DecryptionFailed)?
            }
        };

        let pad_len = *padded.last().ok_or(Error::DecryptionFailed)? as usize;
        if pad_len + 1 > padded.len() {
            return Err(Error::DecryptionFailed);
        }
        let plaintext = padded[..padded.len() - pad_len - 1].to_vec();

        let ciphertext_end = if ctx.integrity.is_some() {
            checksum_start
        } else {
            body.len()
        };
        Ok(EncryptedPayloadBody {
            iv: iv.to_vec(),
            ciphertext: body[iv_len..ciphertext_end].to_vec(),
            checksum: checksum.to_vec(),
            plaintext,
        })
    }

    /// Explicit IV
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    /// Ciphertext as received (tag included for combined-mode ciphers)
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Integrity checksum or AEAD tag
    pub fn checksum(&self) -> &[u8] {
        &self.checksum
    }

    /// Decrypted inner payload chain
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Take the decrypted inner payload chain
    pub fn into_plaintext(self) -> Vec<u8> {
        self.plaintext
    }
}

/// Fragment number and total from an SKF sub-header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
    /// 1-based fragment number
    pub number: u16,
    /// Total number of fragments
    pub total: u16,
}

impl FragmentInfo {
    /// Parse and validate the 4-byte SKF sub-header
    ///
    /// # Errors
    ///
    /// Returns `InvalidSyntax` unless `1 <= number <= total`
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < SKF_SUBHEADER_SIZE {
            return Err(Error::syntax("Truncated SKF sub-header"));
        }
        let number = u16::from_be_bytes([data[0], data[1]]);
        let total = u16::from_be_bytes([data[2], data[3]]);

        if number == 0 || total == 0 || number > total {
            return Err(Error::syntax(format!(
                "Invalid fragment number {} of {}",
                number, total
            )));
        }
        Ok(FragmentInfo { number, total })
    }

    /// Serialize the SKF sub-header
    pub fn to_bytes(self) -> [u8; SKF_SUBHEADER_SIZE] {
        let mut bytes = [0u8; SKF_SUBHEADER_SIZE];
        bytes[..2].copy_from_slice(&self.number.to_be_bytes());
        bytes[2..].copy_from_slice(&self.total.to_be_bytes());
        bytes
    }
}

/// Decrypted SK or SKF payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkPayload {
    /// Type of the first inner payload
    pub first_inner_type: u8,

    /// Fragment position, `None` for an SK payload
    pub fragment: Option<FragmentInfo>,

    /// Decrypted body
    pub body: EncryptedPayloadBody,
}

impl SkPayload {
    /// Locate, authenticate and decrypt the protected payload of `packet`
    ///
    /// The protected payload must immediately follow the IKE header, which
    /// announces it as SK or SKF, and must extend to the end of the packet.
    ///
    /// # Errors
    ///
    /// - `InvalidSyntax` for layout violations or an invalid SKF sub-header
    /// - `DecryptionFailed` if authentication or decryption fails
    pub fn decrypt(ctx: &EncryptionContext, header: &IkeHeader, packet: &[u8]) -> Result<Self> {
        let is_fragment = match header.next_payload_type() {
            Some(PayloadType::SK) => false,
            Some(PayloadType::SKF) => true,
            _ => {
                return Err(Error::syntax(format!(
                    "Expected an encrypted payload, found type {}",
                    header.next_payload
                )));
            }
        };

        let rest = packet
            .get(IKE_HEADER_SIZE..)
            .ok_or_else(|| Error::syntax("IKE header truncated"))?;
        let generic = PayloadHeader::from_bytes(rest)?;
        if generic.length as usize != rest.len() {
            return Err(Error::syntax(format!(
                "Encrypted payload length {} does not match remaining {} bytes",
                generic.length,
                rest.len()
            )));
        }

        let mut body_offset = IKE_HEADER_SIZE + PAYLOAD_HEADER_SIZE;
        let fragment = if is_fragment {
            let info = FragmentInfo::from_bytes(&packet[body_offset..])?;
            body_offset += SKF_SUBHEADER_SIZE;
            Some(info)
        } else {
            None
        };

        let body = EncryptedPayloadBody::decrypt(ctx, packet, body_offset)?;
        Ok(SkPayload {
            first_inner_type: generic.next_payload,
            fragment,
            body,
        })
    }
}

/// Build a complete protected packet around `plaintext`
///
/// # Arguments
///
/// * `ctx` - Outbound algorithms and keys
/// * `header` - Message header; its next payload is replaced by SK or SKF
/// * `first_inner_type` - Type announced in the generic header
/// * `fragment` - SKF position, `None` for an SK payload
/// * `plaintext` - Encoded inner payload chain
///
/// # Errors
///
/// Returns `InvalidParameter` if the payload exceeds the 16-bit length field
pub fn encode_protected_packet(
    ctx: &EncryptionContext,
    header: &IkeHeader,
    first_inner_type: u8,
    fragment: Option<FragmentInfo>,
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let (payload_type, subheader_len) = match fragment {
        Some(_) => (PayloadType::SKF, SKF_SUBHEADER_SIZE),
        None => (PayloadType::SK, 0),
    };

    let payload_len = PAYLOAD_HEADER_SIZE + subheader_len + ctx.encrypted_body_len(plaintext.len());
    let payload_len = u16::try_from(payload_len).map_err(|_| {
        Error::InvalidParameter(format!("Encrypted payload too large: {} bytes", payload_len))
    })?;

    let mut buf = BytesMut::with_capacity(IKE_HEADER_SIZE + payload_len as usize);
    header
        .with_next_payload(payload_type)
        .encode_to(&mut buf, payload_len as usize);
    buf.put_slice(&PayloadHeader::new(first_inner_type, false, payload_len).to_bytes());
    if let Some(info) = fragment {
        buf.put_slice(&info.to_bytes());
    }

    let body = EncryptedPayloadBody::encrypt(ctx, &buf, plaintext)?;
    buf.put_slice(&body);
    Ok(buf.to_vec())
}
