//! IKE message encoding and decoding
//!
//! Implements the message format defined in RFC 7296 Section 3.1 on top of
//! the payload chain codec, SK protection and RFC 7383 reassembly.
//!
//! # Outcomes
//!
//! Decoding never panics and never returns a bare error. The caller gets a
//! [`DecodeResult`] telling it whether the failure happened before or after
//! the message was authenticated, which decides whether an error notify may
//! be sent back.

use super::constants::{notify, ExchangeSubType, ExchangeType, PayloadType, ProtocolId, IKE_HEADER_SIZE};
use super::encrypted::{EncryptionContext, SkPayload};
use super::fragment::{build_protected_packets, ReassemblyState};
use super::header::IkeHeader;
use super::payload::{
    decode_payload_list, encode_payload_list, first_payload_type, AuthPayload, CertPayload,
    ConfigPayload, DeletePayload, IdPayload, IkePayload, KePayload, NoncePayload, NotifyPayload,
    TsPayload,
};
use super::proposal::{Proposal, SaPayload};
use crate::ipsec::config::FragmentationConfig;
use crate::ipsec::logging;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

/// Decoded IKE message
#[derive(Debug, Clone, PartialEq)]
pub struct IkeMessage {
    /// Message header
    pub header: IkeHeader,

    /// Payloads in wire order (inner payloads for protected messages)
    pub payloads: Vec<IkePayload>,
}

/// Outcome of decoding one inbound packet
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeResult {
    /// Complete message
    Ok {
        /// Decoded message
        message: IkeMessage,
        /// Canonical packet: the packet itself or fragment #1
        first_packet: Vec<u8>,
    },

    /// Fragment accepted or discarded, more fragments needed
    Partial(ReassemblyState),

    /// Message authenticated but malformed, an error notify may be sent
    ProtectedError {
        /// Decoding error
        error: Error,
        /// Canonical packet
        first_packet: Vec<u8>,
    },

    /// Message could not be authenticated or failed before authentication
    UnprotectedError(Error),
}

impl DecodeResult {
    /// Whether a complete message was decoded
    pub fn is_ok(&self) -> bool {
        matches!(self, DecodeResult::Ok { .. })
    }

    /// The decoded message, if any
    pub fn message(&self) -> Option<&IkeMessage> {
        match self {
            DecodeResult::Ok { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The error, protected or not
    pub fn error(&self) -> Option<&Error> {
        match self {
            DecodeResult::ProtectedError { error, .. } | DecodeResult::UnprotectedError(error) => {
                Some(error)
            }
            _ => None,
        }
    }
}

impl IkeMessage {
    /// Create a message for sending
    pub fn new(header: IkeHeader, payloads: Vec<IkePayload>) -> Self {
        IkeMessage { header, payloads }
    }

    /// Encode as an unprotected packet
    ///
    /// The header announces the type of the first payload.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if a payload overflows a length field
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = encode_payload_list(&self.payloads)?;

        let mut header = self.header.clone();
        header.next_payload = first_payload_type(&self.payloads);

        let mut buf = BytesMut::with_capacity(IKE_HEADER_SIZE + body.len());
        header.encode_to(&mut buf, body.len());
        buf.put_slice(&body);

        logging::log_message_built(header.message_id, buf.len());
        Ok(buf.to_vec())
    }

    /// Encode as one SK packet or a list of SKF fragments
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the message cannot be protected or
    /// fragmented with `config`
    pub fn encrypt_and_encode(
        &self,
        ctx: &EncryptionContext,
        config: &FragmentationConfig,
    ) -> Result<Vec<Vec<u8>>> {
        let plaintext = encode_payload_list(&self.payloads)?;
        build_protected_packets(
            ctx,
            &self.header,
            first_payload_type(&self.payloads),
            &plaintext,
            config,
        )
    }

    /// Decode an unprotected message
    ///
    /// Every failure is unprotected since nothing was authenticated.
    pub fn decode(expected_message_id: u32, header: &IkeHeader, packet: &[u8]) -> DecodeResult {
        match Self::decode_unprotected(expected_message_id, header, packet) {
            Ok(message) => DecodeResult::Ok {
                message,
                first_packet: packet.to_vec(),
            },
            Err(error) => DecodeResult::UnprotectedError(error),
        }
    }

    fn decode_unprotected(expected_message_id: u32, header: &IkeHeader, packet: &[u8]) -> Result<Self> {
        if header.message_id != expected_message_id {
            return Err(Error::InvalidMessageId(header.message_id));
        }
        header.validate_major_version()?;

        let body = packet
            .get(IKE_HEADER_SIZE..)
            .ok_or_else(|| Error::syntax("IKE header truncated"))?;
        let payloads = decode_payload_list(header.next_payload, header.is_response(), body)?;
        header.validate_inbound_header(packet.len())?;

        Ok(IkeMessage::new(header.clone(), payloads))
    }

    /// Decode a protected message or one of its fragments
    ///
    /// # Arguments
    ///
    /// * `expected_message_id` - Message ID the caller is waiting for
    /// * `ctx` - Inbound algorithms and keys
    /// * `header` - Header parsed from `packet`
    /// * `packet` - Received datagram
    /// * `state` - Fragments collected so far for this message
    ///
    /// While `state` is present, failures before authentication and
    /// unfragmented messages are discarded and the state is handed back.
    pub fn decode_encrypted(
        expected_message_id: u32,
        ctx: &EncryptionContext,
        header: &IkeHeader,
        packet: &[u8],
        state: Option<ReassemblyState>,
    ) -> DecodeResult {
        let unauthenticated = |error: Error, state: Option<ReassemblyState>| match state {
            Some(state) => {
                logging::log_fragment_discarded(header.message_id, &error.to_string());
                DecodeResult::Partial(state)
            }
            None => DecodeResult::UnprotectedError(error),
        };

        if header.message_id != expected_message_id {
            return unauthenticated(Error::InvalidMessageId(header.message_id), state);
        }
        if let Err(error) = header.validate_major_version() {
            return unauthenticated(error, state);
        }

        let sk = match SkPayload::decrypt(ctx, header, packet) {
            Ok(sk) => sk,
            Err(error) => return unauthenticated(error, state),
        };

        match sk.fragment {
            None => {
                if let Some(state) = state {
                    warn!(
                        message_id = header.message_id,
                        "Received unfragmented message during reassembly, discarding"
                    );
                    return DecodeResult::Partial(state);
                }
                Self::decode_plaintext(header.clone(), sk.first_inner_type, &sk.body.into_plaintext(), packet)
            }
            Some(info) => {
                if let Err(error) = header.validate_inbound_header(packet.len()) {
                    warn!(
                        message_id = header.message_id,
                        fragment = info.number,
                        %error,
                        "Fragment failed header validation"
                    );
                }

                let state = match state {
                    None => match ReassemblyState::new(header, sk, packet) {
                        Ok(state) => state,
                        Err(error) => return DecodeResult::UnprotectedError(error),
                    },
                    Some(state) => state.add_fragment(header, sk, packet),
                };
                if !state.is_complete() {
                    return DecodeResult::Partial(state);
                }
                Self::finish_reassembly(state)
            }
        }
    }

    fn finish_reassembly(state: ReassemblyState) -> DecodeResult {
        let reassembled = match state.assemble() {
            Ok(reassembled) => reassembled,
            Err(error) => return DecodeResult::UnprotectedError(error),
        };
        debug!(
            size = reassembled.plaintext.len(),
            "Reassembled fragmented message"
        );

        let header = match IkeHeader::from_bytes(&reassembled.first_packet) {
            Ok(header) => header,
            Err(error) => {
                return DecodeResult::ProtectedError {
                    error,
                    first_packet: reassembled.first_packet,
                };
            }
        };
        Self::decode_plaintext(
            header,
            reassembled.first_inner_type,
            &reassembled.plaintext,
            &reassembled.first_packet,
        )
    }

    fn decode_plaintext(
        header: IkeHeader,
        first_inner_type: u8,
        plaintext: &[u8],
        first_packet: &[u8],
    ) -> DecodeResult {
        let decoded = decode_payload_list(first_inner_type, header.is_response(), plaintext)
            .and_then(|payloads| {
                header.validate_inbound_header(first_packet.len())?;
                Ok(payloads)
            });

        match decoded {
            Ok(payloads) => DecodeResult::Ok {
                message: IkeMessage::new(header, payloads),
                first_packet: first_packet.to_vec(),
            },
            Err(error) => DecodeResult::ProtectedError {
                error,
                first_packet: first_packet.to_vec(),
            },
        }
    }

    /// Classify a request within its exchange
    ///
    /// # Errors
    ///
    /// - `InvalidState` for responses
    /// - `InvalidSyntax` for an unknown exchange type
    pub fn exchange_sub_type(&self) -> Result<ExchangeSubType> {
        if self.header.is_response() {
            return Err(Error::InvalidState(
                "Exchange sub type is only defined for requests".into(),
            ));
        }

        let exchange = self.header.exchange().ok_or_else(|| {
            Error::syntax(format!("Invalid IKE Exchange Type: {}", self.header.exchange_type))
        })?;

        let sub_type = match exchange {
            ExchangeType::IkeSaInit => ExchangeSubType::IkeInit,
            ExchangeType::IkeAuth => ExchangeSubType::IkeAuth,
            ExchangeType::CreateChildSa => match self.sa() {
                None => ExchangeSubType::Invalid,
                Some(sa) if sa.proposals.first().map_or(false, Proposal::is_ike) => {
                    ExchangeSubType::RekeyIke
                }
                Some(_) if self.notify(notify::REKEY_SA).is_some() => ExchangeSubType::RekeyChild,
                Some(_) => ExchangeSubType::CreateChild,
            },
            ExchangeType::Informational => {
                let mut deletes = self.deletes().peekable();
                if deletes.peek().is_none() {
                    ExchangeSubType::GenericInfo
                } else if deletes.any(|d| d.protocol_id == ProtocolId::Ike) {
                    ExchangeSubType::DeleteIke
                } else {
                    ExchangeSubType::DeleteChild
                }
            }
        };
        Ok(sub_type)
    }

    /// Whether this is a liveness check: an empty protected INFORMATIONAL request
    pub fn is_dpd_request(&self) -> bool {
        !self.header.is_response()
            && self.header.exchange() == Some(ExchangeType::Informational)
            && self.payloads.is_empty()
            && self.header.next_payload == PayloadType::SK.to_u8()
    }

    /// SA payload
    pub fn sa(&self) -> Option<&SaPayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::SA(sa) => Some(sa),
            _ => None,
        })
    }

    /// Key Exchange payload
    pub fn ke(&self) -> Option<&KePayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::KE(ke) => Some(ke),
            _ => None,
        })
    }

    /// Nonce payload
    pub fn nonce(&self) -> Option<&NoncePayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::Nonce(nonce) => Some(nonce),
            _ => None,
        })
    }

    /// Authentication payload
    pub fn auth(&self) -> Option<&AuthPayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::AUTH(auth) => Some(auth),
            _ => None,
        })
    }

    /// Initiator identification
    pub fn id_initiator(&self) -> Option<&IdPayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::IDi(id) => Some(id),
            _ => None,
        })
    }

    /// Responder identification
    pub fn id_responder(&self) -> Option<&IdPayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::IDr(id) => Some(id),
            _ => None,
        })
    }

    /// Initiator traffic selectors
    pub fn ts_initiator(&self) -> Option<&TsPayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::TSi(ts) => Some(ts),
            _ => None,
        })
    }

    /// Responder traffic selectors
    pub fn ts_responder(&self) -> Option<&TsPayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::TSr(ts) => Some(ts),
            _ => None,
        })
    }

    /// Configuration payload
    pub fn config(&self) -> Option<&ConfigPayload> {
        self.payloads.iter().find_map(|p| match p {
            IkePayload::CP(cp) => Some(cp),
            _ => None,
        })
    }

    /// Certificates in wire order
    pub fn certs(&self) -> impl Iterator<Item = &CertPayload> {
        self.payloads.iter().filter_map(|p| match p {
            IkePayload::CERT(cert) => Some(cert),
            _ => None,
        })
    }

    /// Notify payloads in wire order
    pub fn notifies(&self) -> impl Iterator<Item = &NotifyPayload> {
        self.payloads.iter().filter_map(|p| match p {
            IkePayload::N(n) => Some(n),
            _ => None,
        })
    }

    /// First notify of the given type
    pub fn notify(&self, notify_type: u16) -> Option<&NotifyPayload> {
        self.notifies().find(|n| n.notify_type == notify_type)
    }

    /// Delete payloads in wire order
    pub fn deletes(&self) -> impl Iterator<Item = &DeletePayload> {
        self.payloads.iter().filter_map(|p| match p {
            IkePayload::D(d) => Some(d),
            _ => None,
        })
    }
}

/// Decoding strategy handed to the code driving the exchanges
///
/// Tests substitute their own implementation to inject decode outcomes.
pub trait IkeMessageCodec: Send + Sync {
    /// Decode an unprotected message
    fn decode(&self, expected_message_id: u32, header: &IkeHeader, packet: &[u8]) -> DecodeResult;

    /// Decode a protected message or fragment
    fn decode_encrypted(
        &self,
        expected_message_id: u32,
        ctx: &EncryptionContext,
        header: &IkeHeader,
        packet: &[u8],
        state: Option<ReassemblyState>,
    ) -> DecodeResult;
}

/// Codec backed by [`IkeMessage::decode`] and [`IkeMessage::decode_encrypted`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessageCodec;

impl IkeMessageCodec for DefaultMessageCodec {
    fn decode(&self, expected_message_id: u32, header: &IkeHeader, packet: &[u8]) -> DecodeResult {
        IkeMessage::decode(expected_message_id, header, packet)
    }

    fn decode_encrypted(
        &self,
        expected_message_id: u32,
        ctx: &EncryptionContext,
        header: &IkeHeader,
        packet: &[u8],
        state: Option<ReassemblyState>,
    ) -> DecodeResult {
        IkeMessage::decode_encrypted(expected_message_id, ctx, header, packet, state)
    }
}
