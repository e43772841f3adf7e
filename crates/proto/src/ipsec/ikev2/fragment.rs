//! IKE message fragmentation (RFC 7383)
//!
//! Outbound messages that exceed the configured size are split into SKF
//! payloads that are each encrypted independently. Inbound fragments are
//! collected in a [`ReassemblyState`] that the caller threads through
//! successive decode calls.

use super::constants::{PayloadType, IKE_HEADER_SIZE, PAYLOAD_HEADER_SIZE};
use super::encrypted::{encode_protected_packet, EncryptionContext, FragmentInfo, SkPayload};
use super::header::IkeHeader;
use crate::ipsec::config::FragmentationConfig;
use crate::ipsec::logging;
use crate::ipsec::{Error, Result};
use tracing::warn;

/// Fragments collected so far for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyState {
    header: IkeHeader,
    first_inner_type: u8,
    first_packet: Option<Vec<u8>>,
    fragments: Vec<Option<Vec<u8>>>,
}

/// Payload data of a fully reassembled message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledMessage {
    /// Type of the first inner payload, taken from fragment #1
    pub first_inner_type: u8,

    /// Concatenated plaintext in fragment order
    pub plaintext: Vec<u8>,

    /// Raw bytes of fragment #1
    pub first_packet: Vec<u8>,
}

impl ReassemblyState {
    /// Start collecting with the first fragment that arrived
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `sk` is not a fragment
    pub fn new(header: &IkeHeader, sk: SkPayload, packet: &[u8]) -> Result<Self> {
        let info = sk
            .fragment
            .ok_or_else(|| Error::InvalidParameter("Not an SKF payload".into()))?;

        let mut state = ReassemblyState {
            header: header.clone(),
            first_inner_type: PayloadType::None.to_u8(),
            first_packet: None,
            fragments: vec![None; info.total as usize],
        };
        state.store(info, sk, packet);
        Ok(state)
    }

    /// Header of the first arrival
    pub fn header(&self) -> &IkeHeader {
        &self.header
    }

    /// Total number of fragments being collected
    pub fn total_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// Number of distinct fragments received
    pub fn received_count(&self) -> usize {
        self.fragments.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether every fragment has arrived
    pub fn is_complete(&self) -> bool {
        self.fragments.iter().all(Option::is_some)
    }

    /// Add a decrypted fragment
    ///
    /// - A larger total restarts collection with only this fragment
    /// - A smaller total drops this fragment
    /// - A fragment whose slot is already filled is a replay and dropped
    pub fn add_fragment(mut self, header: &IkeHeader, sk: SkPayload, packet: &[u8]) -> Self {
        let Some(info) = sk.fragment else {
            logging::log_fragment_discarded(header.message_id, "not a fragment");
            return self;
        };

        if header.exchange_type != self.header.exchange_type {
            warn!(
                collected = self.header.exchange_type,
                received = header.exchange_type,
                "Received fragment with a different exchange type"
            );
        }

        let total = info.total as usize;
        if total > self.total_fragments() {
            logging::log_fragment_discarded(header.message_id, "larger total, restarting collection");
            let mut restarted = ReassemblyState {
                header: header.clone(),
                first_inner_type: PayloadType::None.to_u8(),
                first_packet: None,
                fragments: vec![None; total],
            };
            restarted.store(info, sk, packet);
            return restarted;
        }
        if total < self.total_fragments() {
            logging::log_fragment_discarded(header.message_id, "smaller total fragments");
            return self;
        }
        if self.fragments[info.number as usize - 1].is_some() {
            logging::log_fragment_discarded(header.message_id, "replayed fragment");
            return self;
        }

        self.store(info, sk, packet);
        self
    }

    fn store(&mut self, info: FragmentInfo, sk: SkPayload, packet: &[u8]) {
        if info.number == 1 {
            self.first_inner_type = sk.first_inner_type;
            self.first_packet = Some(packet.to_vec());
        }
        self.fragments[info.number as usize - 1] = Some(sk.body.into_plaintext());
        logging::log_fragment_received(self.header.message_id, info.number, info.total);
    }

    /// Concatenate the collected plaintext
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if fragments are still missing
    pub fn assemble(self) -> Result<ReassembledMessage> {
        if !self.is_complete() {
            return Err(Error::InvalidState(format!(
                "Only {} of {} fragments received",
                self.received_count(),
                self.total_fragments()
            )));
        }

        let first_packet = self
            .first_packet
            .ok_or_else(|| Error::Internal("Fragment #1 missing from complete state".into()))?;
        let plaintext = self.fragments.into_iter().flatten().flatten().collect();

        Ok(ReassembledMessage {
            first_inner_type: self.first_inner_type,
            plaintext,
            first_packet,
        })
    }
}

/// Protect and, when needed, fragment an encoded inner payload chain
///
/// A message that fits into `config.max_fragment_size`, or whose peer does
/// not support fragmentation, is returned as a single SK packet. Otherwise
/// the plaintext is split into SKF packets where only fragment #1 announces
/// the real first inner payload type.
///
/// # Errors
///
/// - `InvalidParameter` if the fragment size leaves no room for plaintext
/// - `InvalidParameter` if more than 65535 fragments would be needed
pub fn build_protected_packets(
    ctx: &EncryptionContext,
    header: &IkeHeader,
    first_inner_type: u8,
    plaintext: &[u8],
    config: &FragmentationConfig,
) -> Result<Vec<Vec<u8>>> {
    let whole_len = IKE_HEADER_SIZE + PAYLOAD_HEADER_SIZE + ctx.encrypted_body_len(plaintext.len());
    if !config.supported || whole_len <= config.max_fragment_size {
        let packet = encode_protected_packet(ctx, header, first_inner_type, None, plaintext)?;
        logging::log_message_built(header.message_id, packet.len());
        return Ok(vec![packet]);
    }

    let per_fragment =
        config.max_plaintext_per_fragment(ctx.iv_len(), ctx.checksum_len(), ctx.block_size())?;
    let count = (plaintext.len() + per_fragment - 1) / per_fragment;
    let total = u16::try_from(count.max(1)).map_err(|_| {
        Error::InvalidParameter(format!(
            "Message of {} bytes needs too many fragments",
            plaintext.len()
        ))
    })?;

    plaintext
        .chunks(per_fragment)
        .zip(1..=total)
        .map(|(chunk, number)| -> Result<Vec<u8>> {
            let inner_type = if number == 1 {
                first_inner_type
            } else {
                PayloadType::None.to_u8()
            };
            let info = FragmentInfo { number, total };
            let fragment = encode_protected_packet(ctx, header, inner_type, Some(info), chunk)?;
            logging::log_fragment_built(header.message_id, number, total, fragment.len());
            Ok(fragment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipsec::crypto::CipherAlgorithm;
    use crate::ipsec::ikev2::constants::ExchangeType;
    use std::sync::Arc;

    fn ctx() -> EncryptionContext {
        EncryptionContext::new(Arc::new(CipherAlgorithm::AesGcm16_128), None, vec![0x42; 20], Vec::new())
            .unwrap()
    }

    fn header() -> IkeHeader {
        IkeHeader::new(0xAA, 0xBB, PayloadType::SK, ExchangeType::IkeAuth, false, true, 1)
    }

    fn fragment(number: u16, total: u16, data: &[u8]) -> (IkeHeader, SkPayload, Vec<u8>) {
        let ctx = ctx();
        let inner = if number == 1 { 35 } else { 0 };
        let packet = encode_protected_packet(
            &ctx,
            &header(),
            inner,
            Some(FragmentInfo { number, total }),
            data,
        )
        .unwrap();
        let header = IkeHeader::from_bytes(&packet).unwrap();
        let sk = SkPayload::decrypt(&ctx, &header, &packet).unwrap();
        (header, sk, packet)
    }

    fn start(number: u16, total: u16, data: &[u8]) -> ReassemblyState {
        let (header, sk, packet) = fragment(number, total, data);
        ReassemblyState::new(&header, sk, &packet).unwrap()
    }

    fn add(state: ReassemblyState, number: u16, total: u16, data: &[u8]) -> ReassemblyState {
        let (header, sk, packet) = fragment(number, total, data);
        state.add_fragment(&header, sk, &packet)
    }

    #[test]
    fn test_reassembly_in_order() {
        let state = start(1, 2, b"hello ");
        assert!(!state.is_complete());
        let state = add(state, 2, 2, b"world");
        assert!(state.is_complete());

        let message = state.assemble().unwrap();
        assert_eq!(message.plaintext, b"hello world".to_vec());
        assert_eq!(message.first_inner_type, 35);
    }

    #[test]
    fn test_reassembly_out_of_order() {
        let state = start(3, 3, b"c");
        let state = add(state, 1, 3, b"a");
        assert_eq!(state.received_count(), 2);
        let state = add(state, 2, 3, b"b");

        let (_, _, first_packet) = fragment(1, 3, b"a");
        let message = state.assemble().unwrap();
        assert_eq!(message.plaintext, b"abc".to_vec());
        assert_eq!(message.first_inner_type, 35);
        // Fragment #1 is the canonical packet, its length is all that is deterministic
        assert_eq!(message.first_packet.len(), first_packet.len());
    }

    #[test]
    fn test_replayed_fragment_is_noop() {
        let state = start(1, 3, b"a");
        let before = state.clone();
        let state = add(state, 1, 3, b"x");
        assert_eq!(state, before);
    }

    #[test]
    fn test_larger_total_restarts() {
        let state = start(1, 2, b"a");
        let state = add(state, 2, 4, b"b");
        assert_eq!(state.total_fragments(), 4);
        assert_eq!(state.received_count(), 1);
    }

    #[test]
    fn test_smaller_total_dropped() {
        let state = start(1, 3, b"a");
        let before = state.clone();
        let state = add(state, 2, 2, b"b");
        assert_eq!(state, before);
    }

    #[test]
    fn test_assemble_incomplete() {
        let state = start(2, 2, b"b");
        assert!(matches!(state.assemble(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_new_requires_fragment() {
        let ctx = ctx();
        let packet = encode_protected_packet(&ctx, &header(), 35, None, b"whole").unwrap();
        let header = IkeHeader::from_bytes(&packet).unwrap();
        let sk = SkPayload::decrypt(&ctx, &header, &packet).unwrap();
        assert!(ReassemblyState::new(&header, sk, &packet).is_err());
    }

    #[test]
    fn test_small_message_not_fragmented() {
        let config = FragmentationConfig::enabled(1280).unwrap();
        let packets = build_protected_packets(&ctx(), &header(), 35, &[7u8; 100], &config).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0][16], PayloadType::SK.to_u8());
    }

    #[test]
    fn test_unsupported_peer_gets_whole_message() {
        let config = FragmentationConfig::builder()
            .with_max_fragment_size(576)
            .build()
            .unwrap();
        let packets = build_protected_packets(&ctx(), &header(), 35, &[7u8; 2000], &config).unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_large_message_fragmented() {
        let ctx = ctx();
        let config = FragmentationConfig::enabled(576).unwrap();
        let per_fragment = config.max_plaintext_per_fragment(8, 16, 16).unwrap();
        let plaintext: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();

        let packets = build_protected_packets(&ctx, &header(), 35, &plaintext, &config).unwrap();
        assert_eq!(packets.len(), (2000 + per_fragment - 1) / per_fragment);

        let mut state: Option<ReassemblyState> = None;
        for (i, packet) in packets.iter().enumerate() {
            assert!(packet.len() <= 576);
            let header = IkeHeader::from_bytes(packet).unwrap();
            let sk = SkPayload::decrypt(&ctx, &header, packet).unwrap();
            assert_eq!(sk.first_inner_type, if i == 0 { 35 } else { 0 });

            state = Some(match state {
                None => ReassemblyState::new(&header, sk, packet).unwrap(),
                Some(s) => s.add_fragment(&header, sk, packet),
            });
        }

        let message = state.unwrap().assemble().unwrap();
        assert_eq!(message.plaintext, plaintext);
        assert_eq!(message.first_packet, packets[0]);
    }

    #[test]
    fn test_fragment_size_too_small() {
        let config = FragmentationConfig::enabled(60).unwrap();
        let result = build_protected_packets(&ctx(), &header(), 35, &[0u8; 100], &config);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
