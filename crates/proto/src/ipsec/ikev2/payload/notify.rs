//! Notify payload (RFC 7296 Section 3.10)

use super::ByteReader;
use crate::ipsec::ikev2::constants::{notify, ProtocolId, SPI_LEN_IPSEC};
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use sha1::{Digest, Sha1};
use std::net::IpAddr;
use tracing::warn;

/// Notify Payload
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Protocol ID  |   SPI Size    |      Notify Message Type      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~                Security Parameter Index (SPI)                 ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~                       Notification Data                       ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Only notifications about an existing Child SA carry an SPI, and that SPI
/// is always a 4-byte AH/ESP SPI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPayload {
    /// Protocol ID code (0 when no SPI is present)
    pub protocol_id: u8,

    /// Child SA SPI
    pub spi: Option<u32>,

    /// Notify message type
    pub notify_type: u16,

    /// Notification data
    pub data: Vec<u8>,
}

impl NotifyPayload {
    /// Notification without SPI
    pub fn new(notify_type: u16, data: Vec<u8>) -> Self {
        NotifyPayload {
            protocol_id: 0,
            spi: None,
            notify_type,
            data,
        }
    }

    /// Notification about an existing Child SA
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the protocol is not AH/ESP or the type
    /// does not refer to a Child SA
    pub fn with_child_spi(protocol: ProtocolId, spi: u32, notify_type: u16, data: Vec<u8>) -> Result<Self> {
        if protocol == ProtocolId::Ike {
            return Err(Error::InvalidParameter("Child SA notify requires AH or ESP".into()));
        }
        if !notify::CHILD_SA_SPI_NOTIFY_TYPES.contains(&notify_type) {
            return Err(Error::InvalidParameter(format!(
                "Notify type {} does not carry a Child SA SPI",
                notify_type
            )));
        }
        Ok(NotifyPayload {
            protocol_id: protocol.to_u8(),
            spi: Some(spi),
            notify_type,
            data,
        })
    }

    /// Error notify reporting `error` to the peer, `None` for local errors
    pub fn from_error(error: &Error) -> Option<Self> {
        let notify_type = error.notify_type()?;
        let payload = match error {
            Error::InvalidSelectors(spi) | Error::ChildSaNotFound(spi) => NotifyPayload {
                protocol_id: ProtocolId::Esp.to_u8(),
                spi: Some(*spi),
                notify_type,
                data: Vec::new(),
            },
            other => NotifyPayload::new(notify_type, other.notify_data()),
        };
        Some(payload)
    }

    /// Whether this notification reports an error
    pub fn is_error_notify(&self) -> bool {
        self.notify_type <= notify::ERROR_NOTIFY_TYPE_MAX
    }

    /// Typed error carried by an error notification
    ///
    /// # Errors
    ///
    /// - `InvalidSyntax` if the notification data does not fit the error type
    /// - `InvalidState` if this is a status notification
    pub fn to_error(&self) -> Result<Error> {
        if !self.is_error_notify() {
            return Err(Error::InvalidState(format!(
                "Notify type {} is not an error notification",
                self.notify_type
            )));
        }

        let error = match self.notify_type {
            notify::UNSUPPORTED_CRITICAL_PAYLOAD => {
                Error::UnsupportedCriticalPayload(vec![self.fixed_data::<1>()?[0]])
            }
            notify::INVALID_IKE_SPI => Error::InvalidIkeSpi,
            notify::INVALID_MAJOR_VERSION => Error::UnsupportedVersion(self.fixed_data::<1>()?[0]),
            notify::INVALID_SYNTAX => Error::syntax("Peer reported invalid syntax"),
            notify::INVALID_MESSAGE_ID => {
                Error::InvalidMessageId(u32::from_be_bytes(self.fixed_data::<4>()?))
            }
            notify::INVALID_SPI => Error::InvalidSpi(u32::from_be_bytes(self.fixed_data::<4>()?)),
            notify::NO_PROPOSAL_CHOSEN => Error::NoProposalChosen,
            notify::INVALID_KE_PAYLOAD => Error::InvalidKe {
                dh_group: u16::from_be_bytes(self.fixed_data::<2>()?),
            },
            notify::AUTHENTICATION_FAILED => {
                Error::AuthenticationFailed("Peer reported authentication failure".into())
            }
            notify::SINGLE_PAIR_REQUIRED => Error::SinglePairRequired,
            notify::NO_ADDITIONAL_SAS => Error::NoAdditionalSas,
            notify::INTERNAL_ADDRESS_FAILURE => Error::InternalAddressFailure,
            notify::FAILED_CP_REQUIRED => Error::FailedCpRequired,
            notify::TS_UNACCEPTABLE => Error::TsUnacceptable,
            notify::INVALID_SELECTORS => Error::InvalidSelectors(self.required_spi()?),
            notify::TEMPORARY_FAILURE => Error::TemporaryFailure,
            notify::CHILD_SA_NOT_FOUND => Error::ChildSaNotFound(self.required_spi()?),
            other => Error::UnrecognizedNotifyError(other),
        };
        Ok(error)
    }

    fn fixed_data<const N: usize>(&self) -> Result<[u8; N]> {
        <[u8; N]>::try_from(self.data.as_slice()).map_err(|_| {
            Error::syntax(format!(
                "Expected {} bytes of notification data for type {}, got {}",
                N,
                self.notify_type,
                self.data.len()
            ))
        })
    }

    fn required_spi(&self) -> Result<u32> {
        self.spi
            .ok_or_else(|| Error::syntax(format!("Notify type {} requires an SPI", self.notify_type)))
    }

    /// NAT_DETECTION_*_IP data: SHA-1(SPIi | SPIr | IP | Port) (RFC 7296 Section 2.23)
    pub fn nat_detection_data(initiator_spi: u64, responder_spi: u64, addr: IpAddr, port: u16) -> Vec<u8> {
        let mut hasher = Sha1::new();
        hasher.update(initiator_spi.to_be_bytes());
        hasher.update(responder_spi.to_be_bytes());
        match addr {
            IpAddr::V4(v4) => hasher.update(v4.octets()),
            IpAddr::V6(v6) => hasher.update(v6.octets()),
        }
        hasher.update(port.to_be_bytes());
        hasher.finalize().to_vec()
    }

    /// Parse Notify payload from data (without header)
    ///
    /// # Errors
    ///
    /// Returns `InvalidSyntax` for an SPI size other than 0 or 4, or when the
    /// SPI presence does not match the notify type
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let protocol_id = reader.read_u8()?;
        let spi_size = reader.read_u8()? as usize;
        let notify_type = reader.read_u16()?;

        let refers_to_child = notify::CHILD_SA_SPI_NOTIFY_TYPES.contains(&notify_type);

        let spi = match spi_size {
            0 => {
                if protocol_id != 0 {
                    warn!(protocol_id, notify_type, "Notify without SPI has non-zero protocol ID");
                }
                if refers_to_child {
                    return Err(Error::syntax(format!(
                        "Notify type {} requires a Child SA SPI",
                        notify_type
                    )));
                }
                None
            }
            SPI_LEN_IPSEC => {
                let is_ipsec = matches!(ProtocolId::from_u8(protocol_id), Some(ProtocolId::Ah | ProtocolId::Esp));
                if !is_ipsec || !refers_to_child {
                    return Err(Error::syntax(format!(
                        "Unexpected SPI in notify type {} with protocol {}",
                        notify_type, protocol_id
                    )));
                }
                Some(reader.read_u32()?)
            }
            other => {
                return Err(Error::syntax(format!("Invalid SPI size in Notify Payload: {}", other)));
            }
        };

        Ok(NotifyPayload {
            protocol_id,
            spi,
            notify_type,
            data: reader.read_rest().to_vec(),
        })
    }

    /// Serialize Notify payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.protocol_id);
        match self.spi {
            Some(spi) => {
                buf.put_u8(SPI_LEN_IPSEC as u8);
                buf.put_u16(self.notify_type);
                buf.put_u32(spi);
            }
            None => {
                buf.put_u8(0);
                buf.put_u16(self.notify_type);
            }
        }
        buf.put_slice(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(n: &NotifyPayload) -> Vec<u8> {
        let mut buf = BytesMut::new();
        n.encode_to(&mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_notify_rekey_sa_with_spi() {
        let data = [3, 4, 0x40, 0x09, 0x12, 0x34, 0x56, 0x78];
        let n = NotifyPayload::from_payload_data(&data).unwrap();

        assert_eq!(n.protocol_id, 3);
        assert_eq!(n.spi, Some(0x1234_5678));
        assert_eq!(n.notify_type, notify::REKEY_SA);
        assert!(!n.is_error_notify());
        assert_eq!(encode(&n), data);
    }

    #[test]
    fn test_notify_status_with_spi_rejected() {
        // NAT_DETECTION_SOURCE_IP may not carry an SPI
        let data = [3, 4, 0x40, 0x04, 0x12, 0x34, 0x56, 0x78];
        assert!(matches!(
            NotifyPayload::from_payload_data(&data),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_notify_spi_with_ike_protocol_rejected() {
        let data = [1, 4, 0x40, 0x09, 0, 0, 0, 1];
        assert!(NotifyPayload::from_payload_data(&data).is_err());
    }

    #[test]
    fn test_notify_child_type_without_spi_rejected() {
        let data = [0, 0, 0x40, 0x09];
        assert!(matches!(
            NotifyPayload::from_payload_data(&data),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_notify_invalid_spi_size() {
        let data = [1, 8, 0x40, 0x00, 1, 2, 3, 4, 5, 6, 7, 8];
        assert!(matches!(
            NotifyPayload::from_payload_data(&data),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_notify_nonzero_protocol_without_spi_accepted() {
        let n = NotifyPayload::from_payload_data(&[3, 0, 0x40, 0x00]).unwrap();
        assert_eq!(n.notify_type, notify::INITIAL_CONTACT);
        assert_eq!(n.spi, None);
    }

    #[test]
    fn test_error_notify_to_error() {
        let n = NotifyPayload::new(notify::INVALID_KE_PAYLOAD, vec![0, 14]);
        assert!(n.is_error_notify());
        assert_eq!(n.to_error().unwrap(), Error::InvalidKe { dh_group: 14 });

        let n = NotifyPayload::new(notify::NO_PROPOSAL_CHOSEN, vec![]);
        assert_eq!(n.to_error().unwrap(), Error::NoProposalChosen);

        let n = NotifyPayload::new(12345, vec![]);
        assert_eq!(n.to_error().unwrap(), Error::UnrecognizedNotifyError(12345));
    }

    #[test]
    fn test_error_notify_bad_data_length() {
        let n = NotifyPayload::new(notify::INVALID_KE_PAYLOAD, vec![14]);
        assert!(matches!(n.to_error(), Err(Error::InvalidSyntax(_))));
    }

    #[test]
    fn test_status_notify_to_error_rejected() {
        let n = NotifyPayload::new(notify::COOKIE, vec![1, 2, 3]);
        assert!(matches!(n.to_error(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_from_error_roundtrip() {
        for err in [
            Error::InvalidKe { dh_group: 31 },
            Error::InvalidMessageId(7),
            Error::ChildSaNotFound(0xABCD),
            Error::TsUnacceptable,
        ] {
            let n = NotifyPayload::from_error(&err).unwrap();
            let parsed = NotifyPayload::from_payload_data(&encode(&n)).unwrap();
            assert_eq!(parsed.to_error().unwrap(), err);
        }

        assert!(NotifyPayload::from_error(&Error::DecryptionFailed).is_none());
    }

    #[test]
    fn test_with_child_spi_validation() {
        assert!(NotifyPayload::with_child_spi(ProtocolId::Esp, 1, notify::REKEY_SA, vec![]).is_ok());
        assert!(NotifyPayload::with_child_spi(ProtocolId::Ike, 1, notify::REKEY_SA, vec![]).is_err());
        assert!(NotifyPayload::with_child_spi(ProtocolId::Esp, 1, notify::COOKIE, vec![]).is_err());
    }

    #[test]
    fn test_nat_detection_data() {
        let addr: IpAddr = "192.0.2.1".parse().unwrap();
        let a = NotifyPayload::nat_detection_data(1, 2, addr, 500);
        let b = NotifyPayload::nat_detection_data(1, 2, addr, 4500);
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
