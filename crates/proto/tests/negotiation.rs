//! Child SA negotiation integration tests
//!
//! Proposals travel through encoded CREATE_CHILD_SA messages while both
//! peers reserve SPIs in their own `RandomSpiGenerator`.

#![cfg(feature = "ipsec")]

use ike_platform::{RandomSpiGenerator, SpiGenerator};
use ike_proto::ipsec::{
    ikev2::{
        constants::{notify, ExchangeSubType, ExchangeType, PayloadType, ProtocolId},
        header::IkeHeader,
        message::{DecodeResult, IkeMessage},
        negotiation::{
            get_negotiated_child_proposal_with_dh, get_verified_negotiated_child_proposal_pair,
            select_proposal,
        },
        payload::{IkePayload, KePayload, NoncePayload, NotifyPayload},
        proposal::{
            DhTransformId, EncrTransformId, EsnTransformId, IntegTransformId, SaPayload, SaProposal,
            KEY_LEN_AES_128, KEY_LEN_AES_256,
        },
    },
    Error,
};
use std::net::IpAddr;
use std::sync::Arc;

struct Peer {
    generator: Arc<RandomSpiGenerator>,
    address: IpAddr,
}

impl Peer {
    fn new(address: &str) -> Self {
        Peer {
            generator: Arc::new(RandomSpiGenerator::ipsec()),
            address: address.parse().unwrap(),
        }
    }

    fn spis(&self) -> Arc<dyn SpiGenerator> {
        self.generator.clone()
    }
}

fn esp_gcm() -> SaProposal {
    SaProposal::child_builder()
        .add_encryption(EncrTransformId::AesGcm16, KEY_LEN_AES_256)
        .add_encryption(EncrTransformId::AesGcm16, KEY_LEN_AES_128)
        .add_esn(EsnTransformId::NoEsn)
        .build()
        .unwrap()
}

fn esp_cbc_pfs() -> SaProposal {
    SaProposal::child_builder()
        .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_128)
        .add_integrity(IntegTransformId::HmacSha256_128)
        .add_dh_group(DhTransformId::Group14)
        .build()
        .unwrap()
}

fn create_child(sa: SaPayload, is_response: bool, extra: Vec<IkePayload>) -> Vec<u8> {
    let mut payloads = vec![
        IkePayload::SA(sa),
        IkePayload::Nonce(NoncePayload::new(vec![0x4E; 32]).unwrap()),
    ];
    payloads.extend(extra);
    IkeMessage::new(
        IkeHeader::new(7, 9, PayloadType::SA, ExchangeType::CreateChildSa, is_response, !is_response, 4),
        payloads,
    )
    .encode()
    .unwrap()
}

fn decode(packet: &[u8]) -> IkeMessage {
    let header = IkeHeader::from_bytes(packet).unwrap();
    match IkeMessage::decode(4, &header, packet) {
        DecodeResult::Ok { message, .. } => message,
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_child_sa_negotiation_reserves_both_spis() {
    let initiator = Peer::new("192.0.2.1");
    let responder = Peer::new("192.0.2.2");

    let mut request_sa =
        SaPayload::child_request(&[esp_cbc_pfs(), esp_gcm()], &initiator.spis(), initiator.address).unwrap();
    assert_eq!(initiator.generator.allocated_count(), 2);
    let request_packet = create_child(request_sa.clone(), false, vec![]);

    // Responder selects from the decoded request and reserves its own SPI
    let received = decode(&request_packet);
    assert_eq!(received.exchange_sub_type(), Ok(ExchangeSubType::CreateChild));
    let (number, selected) = select_proposal(received.sa().unwrap(), &[esp_gcm()]).unwrap();
    assert_eq!(number, 2);
    assert_eq!(selected.encryption.len(), 1);
    assert_eq!(selected.encryption[0].key_length(), KEY_LEN_AES_256);

    let response_sa =
        SaPayload::child_response(number, &selected, &responder.spis(), responder.address).unwrap();
    let responder_spi = response_sa.proposals[0].spi.unwrap();
    assert_eq!(responder.generator.allocated_count(), 1);
    let response_packet = create_child(response_sa, true, vec![]);

    // Initiator verifies and reserves the responder's SPI locally
    let response = decode(&response_packet);
    let (req, resp) = get_verified_negotiated_child_proposal_pair(
        &mut request_sa,
        response.sa().unwrap(),
        &initiator.spis(),
        responder.address,
    )
    .unwrap();

    assert_eq!(req.number, 2);
    assert_eq!(resp.spi, Some(responder_spi));
    assert!(initiator.generator.is_allocated(responder.address, responder_spi));
    // Unselected proposal released, selected one and the remote SPI held
    assert_eq!(initiator.generator.allocated_count(), 2);

    drop(request_sa);
    drop(req);
    drop(resp);
    assert_eq!(initiator.generator.allocated_count(), 0);
}

#[test]
fn test_response_outside_request_releases_everything() {
    let initiator = Peer::new("192.0.2.1");
    let responder = Peer::new("192.0.2.2");

    let mut request_sa = SaPayload::child_request(&[esp_gcm()], &initiator.spis(), initiator.address).unwrap();
    assert_eq!(initiator.generator.allocated_count(), 1);

    // Responder answers with a proposal the initiator never offered
    let response_sa =
        SaPayload::child_response(1, &esp_cbc_pfs(), &responder.spis(), responder.address).unwrap();
    let response = decode(&create_child(response_sa, true, vec![]));

    let result = get_verified_negotiated_child_proposal_pair(
        &mut request_sa,
        response.sa().unwrap(),
        &initiator.spis(),
        responder.address,
    );
    assert!(matches!(result, Err(Error::NoProposalChosen)));
    assert_eq!(initiator.generator.allocated_count(), 0);
}

#[test]
fn test_response_with_other_protocol_rejected() {
    let initiator = Peer::new("192.0.2.1");
    let responder = Peer::new("192.0.2.2");

    let mut request_sa = SaPayload::child_request(&[esp_gcm()], &initiator.spis(), initiator.address).unwrap();
    let received = decode(&create_child(request_sa.clone(), false, vec![]));
    let (number, selected) = select_proposal(received.sa().unwrap(), &[esp_gcm()]).unwrap();

    // Same transforms, but answered as AH
    let mut response_sa =
        SaPayload::child_response(number, &selected, &responder.spis(), responder.address).unwrap();
    response_sa.proposals[0].sa_proposal.protocol_id = ProtocolId::Ah;
    let response = decode(&create_child(response_sa, true, vec![]));
    assert_eq!(response.sa().unwrap().proposals[0].protocol_id(), ProtocolId::Ah);

    let result = get_verified_negotiated_child_proposal_pair(
        &mut request_sa,
        response.sa().unwrap(),
        &initiator.spis(),
        responder.address,
    );
    assert!(matches!(result, Err(Error::NoProposalChosen)));
    assert_eq!(initiator.generator.allocated_count(), 0);
}

#[test]
fn test_child_rekey_with_wrong_ke_group() {
    let initiator = Peer::new("192.0.2.1");

    // Rekey request offering AES-CBC with Group 14 only
    let mut request_sa = SaPayload::child_request(&[esp_cbc_pfs()], &initiator.spis(), initiator.address).unwrap();
    let rekey = IkePayload::N(NotifyPayload {
        protocol_id: 3,
        spi: Some(0x0A0B_0C0D),
        notify_type: notify::REKEY_SA,
        data: Vec::new(),
    });
    let ke = IkePayload::KE(KePayload::new(14, vec![0x11; 256]));
    let received = decode(&create_child(request_sa.clone(), false, vec![ke, rekey]));
    assert_eq!(received.exchange_sub_type(), Ok(ExchangeSubType::RekeyChild));

    // Current Child SA was negotiated without D-H
    let current = SaProposal::child_builder()
        .add_encryption(EncrTransformId::AesCbc, KEY_LEN_AES_128)
        .add_integrity(IntegTransformId::HmacSha256_128)
        .build()
        .unwrap();
    let request = received.sa().unwrap();

    let accepted =
        get_negotiated_child_proposal_with_dh(request, &current, &[esp_cbc_pfs()], 14, 31).unwrap();
    assert_eq!(accepted.dh_group_ids(), vec![14]);

    let wrong_group = get_negotiated_child_proposal_with_dh(request, &current, &[esp_cbc_pfs()], 31, 31);
    assert_eq!(wrong_group, Err(Error::InvalidKe { dh_group: 14 }));

    request_sa.release_child_spi_resources();
    assert_eq!(initiator.generator.allocated_count(), 0);
}
