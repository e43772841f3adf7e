//! IKEv2 Authentication
//!
//! Implements the AUTH payload computation of RFC 7296 Section 2.15 for
//! pre-shared keys and digital signatures (RFC 7427).

use super::payload::{AuthMethod, AuthPayload, IdPayload};
use crate::ipsec::crypto::{IkePrf, IkeSigner, IkeVerifier};
use crate::ipsec::{Error, Result};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Key pad for IKEv2 (RFC 7296 Section 2.15)
const KEY_PAD_IKEV2: &[u8] = b"Key Pad for IKEv2";

/// Construct the octets covered by an AUTH payload
///
/// ```text
/// InitiatorSignedOctets = RealMessage1 | NonceRData | prf(SK_pi, RestOfInitIDPayload)
/// ResponderSignedOctets = RealMessage2 | NonceIData | prf(SK_pr, RestOfRespIDPayload)
/// ```
///
/// # Arguments
///
/// * `prf` - Negotiated PRF
/// * `sk_p` - SK_pi when signing as initiator, SK_pr as responder
/// * `message` - The sender's complete IKE_SA_INIT message
/// * `peer_nonce` - Nonce data received from the other side
/// * `id` - The sender's identification payload
pub fn signed_octets(
    prf: &dyn IkePrf,
    sk_p: &[u8],
    message: &[u8],
    peer_nonce: &[u8],
    id: &IdPayload,
) -> Result<Vec<u8>> {
    let mac_id = prf.sign_bytes(sk_p, &id.encoded_body())?;

    let mut octets = Vec::with_capacity(message.len() + peer_nonce.len() + mac_id.len());
    octets.extend_from_slice(message);
    octets.extend_from_slice(peer_nonce);
    octets.extend_from_slice(&mac_id);
    Ok(octets)
}

/// Compute a PSK AUTH payload
///
/// ```text
/// AUTH = prf(prf(Shared Secret, "Key Pad for IKEv2"), <SignedOctets>)
/// ```
pub fn compute_psk_auth(prf: &dyn IkePrf, psk: &[u8], signed_octets: &[u8]) -> Result<AuthPayload> {
    Ok(AuthPayload::psk(psk_mac(prf, psk, signed_octets)?))
}

/// Verify a PSK AUTH payload
///
/// # Errors
///
/// Returns `AuthenticationFailed` if the method is not PSK or the MAC
/// does not match
pub fn verify_psk_auth(
    prf: &dyn IkePrf,
    psk: &[u8],
    signed_octets: &[u8],
    received: &AuthPayload,
) -> Result<()> {
    if received.auth_method != AuthMethod::SharedKeyMic {
        return Err(Error::AuthenticationFailed(format!(
            "Expected PSK auth, got {:?}",
            received.auth_method
        )));
    }

    let expected = psk_mac(prf, psk, signed_octets)?;
    if expected.len() != received.auth_data.len() || !bool::from(expected.ct_eq(&received.auth_data)) {
        return Err(Error::AuthenticationFailed(
            "Signature verification failed.".to_string(),
        ));
    }
    Ok(())
}

fn psk_mac(prf: &dyn IkePrf, psk: &[u8], signed_octets: &[u8]) -> Result<Vec<u8>> {
    let pad_key = Zeroizing::new(prf.sign_bytes(psk, KEY_PAD_IKEV2)?);
    prf.sign_bytes(&pad_key, signed_octets)
}

/// Compute a signature AUTH payload
pub fn compute_signature_auth(signer: &dyn IkeSigner, signed_octets: &[u8]) -> Result<AuthPayload> {
    let signature = signer.sign(signed_octets)?;
    Ok(AuthPayload::signature(signer.algorithm(), signature))
}

/// Verify a signature AUTH payload
///
/// # Errors
///
/// Returns `AuthenticationFailed` if the method is not a signature method
/// or the signature does not verify
pub fn verify_signature_auth(
    verifier: &dyn IkeVerifier,
    signed_octets: &[u8],
    received: &AuthPayload,
) -> Result<()> {
    let algorithm = match (received.auth_method, received.signature_algorithm) {
        (AuthMethod::RsaSig | AuthMethod::GenericDigitalSignature, Some(alg)) => alg,
        (method, _) => {
            return Err(Error::AuthenticationFailed(format!(
                "Expected signature auth, got {:?}",
                method
            )));
        }
    };

    verifier.verify(algorithm, signed_octets, &received.auth_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipsec::crypto::{PrfAlgorithm, RsaSigner, RsaVerifier, SignatureAlgorithm};

    const PRIVATE_KEY: &[u8] = include_bytes!("../../../tests/data/rsa2048_pkcs8.der");

    fn octets() -> Vec<u8> {
        let id = IdPayload::from_fqdn("initiator.example.com");
        signed_octets(&PrfAlgorithm::HmacSha256, &[0x11; 32], b"IKE_SA_INIT bytes", &[0x22; 32], &id)
            .unwrap()
    }

    #[test]
    fn test_signed_octets_layout() {
        let prf = PrfAlgorithm::HmacSha256;
        let id = IdPayload::from_fqdn("initiator.example.com");
        let octets = signed_octets(&prf, &[0x11; 32], b"message", b"nonce", &id).unwrap();

        assert_eq!(&octets[..7], b"message");
        assert_eq!(&octets[7..12], b"nonce");
        assert_eq!(octets[12..], prf.compute(&[0x11; 32], &id.encoded_body()).unwrap()[..]);
    }

    #[test]
    fn test_signed_octets_depend_on_id() {
        let prf = PrfAlgorithm::HmacSha256;
        let a = signed_octets(&prf, &[1; 32], b"m", b"n", &IdPayload::from_fqdn("a.example")).unwrap();
        let b = signed_octets(&prf, &[1; 32], b"m", b"n", &IdPayload::from_fqdn("b.example")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_compute_psk_auth() {
        let prf = PrfAlgorithm::HmacSha256;
        let auth = compute_psk_auth(&prf, b"secret", &octets()).unwrap();

        assert_eq!(auth.auth_method, AuthMethod::SharedKeyMic);
        let pad_key = prf.compute(b"secret", b"Key Pad for IKEv2").unwrap();
        assert_eq!(auth.auth_data, prf.compute(&pad_key, &octets()).unwrap());
    }

    #[test]
    fn test_verify_psk_auth() {
        let prf = PrfAlgorithm::HmacSha512;
        let auth = compute_psk_auth(&prf, b"secret", &octets()).unwrap();

        verify_psk_auth(&prf, b"secret", &octets(), &auth).unwrap();
        assert!(matches!(
            verify_psk_auth(&prf, b"wrong", &octets(), &auth),
            Err(Error::AuthenticationFailed(_))
        ));
        assert!(matches!(
            verify_psk_auth(&prf, b"secret", b"other octets", &auth),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_verify_psk_auth_truncated_mac() {
        let prf = PrfAlgorithm::HmacSha256;
        let mut auth = compute_psk_auth(&prf, b"secret", &octets()).unwrap();
        auth.auth_data.truncate(16);
        assert!(verify_psk_auth(&prf, b"secret", &octets(), &auth).is_err());
    }

    #[test]
    fn test_verify_psk_auth_wrong_method() {
        let prf = PrfAlgorithm::HmacSha256;
        let auth = AuthPayload::signature(SignatureAlgorithm::Sha256WithRsa, vec![0; 32]);
        assert!(matches!(
            verify_psk_auth(&prf, b"secret", &octets(), &auth),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_signature_auth() {
        let signer = RsaSigner::from_pkcs8(PRIVATE_KEY, SignatureAlgorithm::Sha384WithRsa).unwrap();
        let verifier: RsaVerifier = signer.verifier();

        let auth = compute_signature_auth(&signer, &octets()).unwrap();
        assert_eq!(auth.auth_method, AuthMethod::GenericDigitalSignature);
        assert_eq!(auth.signature_algorithm, Some(SignatureAlgorithm::Sha384WithRsa));

        verify_signature_auth(&verifier, &octets(), &auth).unwrap();
        assert!(matches!(
            verify_signature_auth(&verifier, b"tampered", &auth),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_signature_auth_rejects_psk_payload() {
        let signer = RsaSigner::from_pkcs8(PRIVATE_KEY, SignatureAlgorithm::Sha256WithRsa).unwrap();
        let auth = AuthPayload::psk(vec![0; 32]);
        assert!(matches!(
            verify_signature_auth(&signer.verifier(), &octets(), &auth),
            Err(Error::AuthenticationFailed(_))
        ));
    }
}
