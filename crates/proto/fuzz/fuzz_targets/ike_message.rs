//! Fuzz target for inbound IKE message decoding.
//!
//! Feeds arbitrary datagrams through the unprotected and protected decode
//! paths. Decoding must never panic, and re-encoding a decoded message
//! must produce a consistent header.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run ike_message -- -max_total_time=300
//! ```

#![no_main]
use ike_proto::ipsec::crypto::CipherAlgorithm;
use ike_proto::ipsec::ikev2::{DecodeResult, EncryptionContext, IkeHeader, IkeMessage};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let Ok(header) = IkeHeader::from_bytes(data) else {
        return;
    };

    if let DecodeResult::Ok { message, .. } = IkeMessage::decode(header.message_id, &header, data) {
        let encoded = message.encode().expect("Decoded message must re-encode");
        let reparsed = IkeHeader::from_bytes(&encoded).expect("Re-encoded header must parse");
        assert_eq!(reparsed.length as usize, encoded.len());
        let _ = IkeMessage::decode(reparsed.message_id, &reparsed, &encoded);
    }

    let ctx = EncryptionContext::new(
        Arc::new(CipherAlgorithm::ChaCha20Poly1305),
        None,
        vec![0u8; 36],
        Vec::new(),
    )
    .expect("Valid context");
    let _ = IkeMessage::decode_encrypted(header.message_id, &ctx, &header, data, None);
});
