//! Structured logging for IKEv2 codec operations
//!
//! Provides structured, contextual logging using the `tracing` framework.
//! Logging is a side channel only; no decode or negotiation decision depends
//! on it.
//!
//! # Log Levels
//!
//! - **DEBUG**: decoded payload chains, SA payload contents, SPI bookkeeping
//! - **INFO**: negotiated proposals
//! - **WARN**: discarded fragments and unusual but valid input
//!
//! # Example
//!
//! ```no_run
//! use ike_proto::ipsec::logging;
//!
//! // Initialize tracing subscriber (in tests or applications)
//! tracing_subscriber::fmt()
//!     .with_env_filter("ike_proto::ipsec=debug")
//!     .init();
//!
//! logging::log_fragment_received(7, 2, 3);
//! ```

use crate::ipsec::ikev2::constants::ProtocolId;
use crate::ipsec::ikev2::proposal::Proposal;
use ike_platform::SpiKind;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Log the payload types of a decoded chain
///
/// # Arguments
///
/// * `types` - Payload type codes in wire order
pub fn log_decoded_payloads(types: &[u8]) {
    debug!(
        payload_count = types.len(),
        payload_types = ?types,
        "Decoded IKE payload list"
    );
}

/// Log an accepted SKF fragment
///
/// # Arguments
///
/// * `message_id` - Message ID of the fragmented message
/// * `fragment_num` - 1-based fragment number
/// * `total_fragments` - Total fragments announced by this fragment
pub fn log_fragment_received(message_id: u32, fragment_num: u16, total_fragments: u16) {
    debug!(
        message_id = message_id,
        fragment_num = fragment_num,
        total_fragments = total_fragments,
        "IKE fragment received"
    );
}

/// Log a fragment or message dropped while collecting fragments
///
/// # Arguments
///
/// * `message_id` - Message ID of the dropped packet
/// * `reason` - Why it was dropped
pub fn log_fragment_discarded(message_id: u32, reason: &str) {
    warn!(
        message_id = message_id,
        reason = reason,
        "Discarding IKE fragment"
    );
}

/// Log an outbound unfragmented message
///
/// # Arguments
///
/// * `message_id` - Message ID
/// * `size_bytes` - Encoded size including the IKE header
pub fn log_message_built(message_id: u32, size_bytes: usize) {
    debug!(
        message_id = message_id,
        size_bytes = size_bytes,
        "Built complete IKE message"
    );
}

/// Log an outbound SKF fragment
pub fn log_fragment_built(message_id: u32, fragment_num: u16, total_fragments: u16, size_bytes: usize) {
    debug!(
        message_id = message_id,
        fragment_num = fragment_num,
        total_fragments = total_fragments,
        size_bytes = size_bytes,
        "Built IKE fragment"
    );
}

/// Log the proposals of a decoded SA payload
///
/// # Arguments
///
/// * `is_response` - Whether the SA payload came from a response
/// * `proposals` - Decoded proposals
pub fn log_sa_payload(is_response: bool, proposals: &[Proposal]) {
    for proposal in proposals {
        debug!(
            is_response = is_response,
            proposal_num = proposal.number,
            protocol = ?proposal.protocol_id(),
            spi = %proposal.spi.map(|spi| hex::encode(spi.to_be_bytes())).unwrap_or_default(),
            unrecognized_transform = proposal.has_unrecognized_transform,
            "SA proposal"
        );
    }
}

/// Log a successfully negotiated proposal
///
/// # Arguments
///
/// * `proposal_num` - Number of the chosen request proposal
/// * `protocol` - Protocol of the chosen proposal
pub fn log_proposal_negotiated(proposal_num: u8, protocol: ProtocolId) {
    info!(
        proposal_num = proposal_num,
        protocol = ?protocol,
        "Proposal negotiation successful"
    );
}

/// Log an SPI reservation
pub fn log_spi_allocated(kind: SpiKind, address: &IpAddr, spi: u64) {
    debug!(
        kind = ?kind,
        address = %address,
        spi = %hex::encode(&spi.to_be_bytes()[8 - kind.size()..]),
        "SPI allocated"
    );
}

/// Log an SPI release
pub fn log_spi_released(kind: SpiKind, address: &IpAddr, spi: u64) {
    debug!(
        kind = ?kind,
        address = %address,
        spi = %hex::encode(&spi.to_be_bytes()[8 - kind.size()..]),
        "SPI released"
    );
}
