//! SA proposal negotiation
//!
//! Responder side: [`select_proposal`] picks a proposal from an inbound
//! request. Initiator side: [`get_verified_negotiated_ike_proposal_pair`] and
//! [`get_verified_negotiated_child_proposal_pair`] check that a response was
//! selected from our request and take ownership of the SPIs involved.
//!
//! Every failure to agree is reported as `NoProposalChosen`, except a Child
//! rekey whose KE payload uses the wrong group, which yields `InvalidKe`.

use super::proposal::{Proposal, SaPayload, SaProposal, Transform};
use crate::ipsec::logging;
use crate::ipsec::{Error, Result};
use ike_platform::SpiGenerator;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Select a proposal from an inbound request
///
/// Request proposals are tried in order against each configured proposal of
/// the same protocol. For every transform type the first offered value that
/// is supported and configured wins.
///
/// # Returns
///
/// The selected request proposal number and the single-valued proposal to
/// answer with.
pub fn select_proposal(request: &SaPayload, configured: &[SaProposal]) -> Result<(u8, SaProposal)> {
    for offered in &request.proposals {
        if offered.has_unrecognized_transform {
            debug!(number = offered.number, "Skipping proposal with unrecognized transform");
            continue;
        }
        for local in configured {
            if local.protocol_id != offered.protocol_id() {
                continue;
            }
            if let Some(selected) = intersect(&offered.sa_proposal, local) {
                logging::log_proposal_negotiated(offered.number, offered.protocol_id());
                return Ok((offered.number, selected));
            }
        }
    }
    Err(Error::NoProposalChosen)
}

fn intersect(offered: &SaProposal, local: &SaProposal) -> Option<SaProposal> {
    Some(SaProposal {
        protocol_id: offered.protocol_id,
        encryption: pick_first(&offered.encryption, &local.encryption)?,
        prf: pick_first(&offered.prf, &local.prf)?,
        integrity: pick_first(&offered.integrity, &local.integrity)?,
        dh_groups: pick_first(&offered.dh_groups, &local.dh_groups)?,
        esn: pick_first(&offered.esn, &local.esn)?,
    })
}

fn pick_first(offered: &[Transform], local: &[Transform]) -> Option<Vec<Transform>> {
    if offered.is_empty() {
        return local.is_empty().then(Vec::new);
    }
    offered
        .iter()
        .find(|t| t.is_supported && local.contains(t))
        .map(|t| vec![t.clone()])
}

/// Verify that `response` was negotiated from `request`
///
/// On success the SPIs of every other request proposal are released. On
/// failure every request SPI is released.
///
/// # Returns
///
/// The selected request proposal and the response proposal.
///
/// # Errors
///
/// Returns `NoProposalChosen` if the response proposal has an unrecognized
/// transform, an out-of-range number, or does not match the request
/// proposal it names.
pub fn get_verified_negotiated_proposal_pair(
    request: &mut SaPayload,
    response: &SaPayload,
) -> Result<(Proposal, Proposal)> {
    match verify_pair(request, response) {
        Ok(index) => {
            let selected = request.proposals[index].clone();
            for (i, proposal) in request.proposals.iter_mut().enumerate() {
                if i != index {
                    proposal.release_spi_resource();
                }
            }
            logging::log_proposal_negotiated(selected.number, selected.protocol_id());
            Ok((selected, response.proposals[0].clone()))
        }
        Err(e) => {
            request.release_spi_resources();
            Err(e)
        }
    }
}

fn verify_pair(request: &SaPayload, response: &SaPayload) -> Result<usize> {
    let Some(resp) = response.proposals.first() else {
        return Err(Error::NoProposalChosen);
    };
    if resp.has_unrecognized_transform {
        debug!("Negotiated proposal has unrecognized Transform");
        return Err(Error::NoProposalChosen);
    }

    let number = resp.number as usize;
    if number < 1 || number > request.proposals.len() {
        debug!(number, offered = request.proposals.len(), "Negotiated proposal has invalid number");
        return Err(Error::NoProposalChosen);
    }

    let index = number - 1;
    if !resp.is_negotiated_from(&request.proposals[index]) {
        debug!(number, "Invalid negotiated proposal");
        return Err(Error::NoProposalChosen);
    }
    Ok(index)
}

/// Verify an IKE SA proposal pair and reserve the peer's IKE SPI
///
/// A side that carries an SPI without an owned resource gets one reserved
/// in `generator` for `remote`. If that fails, both sides are released.
pub fn get_verified_negotiated_ike_proposal_pair(
    request: &mut SaPayload,
    response: &SaPayload,
    generator: &Arc<dyn SpiGenerator>,
    remote: IpAddr,
) -> Result<(Proposal, Proposal)> {
    let (req, resp) = get_verified_negotiated_proposal_pair(request, response)?;
    if !req.is_ike() {
        request.release_spi_resources();
        return Err(Error::NoProposalChosen);
    }
    reserve_remote_spis(req, resp, generator, remote)
}

/// Verify a Child SA proposal pair and reserve the peer's IPsec SPI
///
/// Same as [`get_verified_negotiated_ike_proposal_pair`] for AH/ESP.
pub fn get_verified_negotiated_child_proposal_pair(
    request: &mut SaPayload,
    response: &SaPayload,
    generator: &Arc<dyn SpiGenerator>,
    remote: IpAddr,
) -> Result<(Proposal, Proposal)> {
    let (req, resp) = get_verified_negotiated_proposal_pair(request, response)?;
    if req.is_ike() {
        request.release_spi_resources();
        return Err(Error::NoProposalChosen);
    }
    reserve_remote_spis(req, resp, generator, remote)
}

fn reserve_remote_spis(
    mut req: Proposal,
    mut resp: Proposal,
    generator: &Arc<dyn SpiGenerator>,
    remote: IpAddr,
) -> Result<(Proposal, Proposal)> {
    let reserved = req
        .allocate_remote_spi(generator, remote)
        .and_then(|()| resp.allocate_remote_spi(generator, remote));
    if let Err(e) = reserved {
        req.release_spi_resource();
        resp.release_spi_resource();
        return Err(e);
    }
    Ok((req, resp))
}

/// Number of the first request proposal `candidate` can be negotiated from
///
/// The request proposal must also use the same protocol.
pub fn get_negotiated_proposal_number(request: &SaPayload, candidate: &SaProposal) -> Result<u8> {
    request
        .proposals
        .iter()
        .find(|p| candidate.is_negotiated_from(&p.sa_proposal))
        .map(|p| p.number)
        .ok_or(Error::NoProposalChosen)
}

/// Build the Child proposal for a peer-initiated rekey with key exchange
///
/// # Arguments
///
/// * `request` - The inbound rekey request SA payload
/// * `current` - The proposal of the Child SA being rekeyed
/// * `configured` - Locally configured Child proposals
/// * `req_ke_dh` - D-H group of the request's KE payload
/// * `ike_dh` - D-H group negotiated for the IKE SA
///
/// Each configured proposal that `current` derives from (ignoring D-H)
/// contributes its D-H groups, or `ike_dh` when it has none. Every group
/// that makes `current` acceptable to the request is a candidate.
///
/// # Errors
///
/// - `NoProposalChosen` if there is no candidate
/// - `InvalidKe` with the first candidate's group if none matches
///   `req_ke_dh`
pub fn get_negotiated_child_proposal_with_dh(
    request: &SaPayload,
    current: &SaProposal,
    configured: &[SaProposal],
    req_ke_dh: u16,
    ike_dh: u16,
) -> Result<SaProposal> {
    let mut candidates = Vec::new();
    for local in configured {
        if !current.is_negotiated_from_except_dh(local) {
            continue;
        }
        let groups = match local.dh_group_ids() {
            groups if groups.is_empty() => vec![ike_dh],
            groups => groups,
        };
        for group in groups {
            let candidate = current.with_dh_group(group);
            if get_negotiated_proposal_number(request, &candidate).is_ok() {
                candidates.push((group, candidate));
            }
        }
    }

    let Some((first_group, _)) = candidates.first() else {
        return Err(Error::NoProposalChosen);
    };
    let first_group = *first_group;
    candidates
        .into_iter()
        .find(|(group, _)| *group == req_ke_dh)
        .map(|(_, candidate)| candidate)
        .ok_or(Error::InvalidKe { dh_group: first_group })
}
