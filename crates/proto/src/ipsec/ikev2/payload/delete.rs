//! Delete payload (RFC 7296 Section 3.11)

use super::{length_u16, ByteReader};
use crate::ipsec::ikev2::constants::{ProtocolId, SPI_LEN_IPSEC};
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Delete Payload
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Protocol ID   |   SPI Size    |          Num of SPIs          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~               Security Parameter Index(es) (SPI)              ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Deleting the IKE SA carries no SPI (the header SPIs identify it).
/// Deleting Child SAs carries one or more 4-byte ESP SPIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePayload {
    /// Protocol of the deleted SAs
    pub protocol_id: ProtocolId,

    /// SPIs of the deleted Child SAs, in wire order
    pub spis: Vec<u32>,
}

impl DeletePayload {
    /// Delete the IKE SA
    pub fn ike() -> Self {
        DeletePayload {
            protocol_id: ProtocolId::Ike,
            spis: Vec::new(),
        }
    }

    /// Delete one or more ESP Child SAs
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `spis` is empty
    pub fn esp(spis: Vec<u32>) -> Result<Self> {
        if spis.is_empty() {
            return Err(Error::InvalidParameter("Delete payload without SPIs".into()));
        }
        Ok(DeletePayload {
            protocol_id: ProtocolId::Esp,
            spis,
        })
    }

    /// Number of SPIs
    pub fn num_spi(&self) -> usize {
        self.spis.len()
    }

    /// Parse Delete payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let raw_protocol = reader.read_u8()?;
        let spi_size = reader.read_u8()? as usize;
        let num_spi = reader.read_u16()? as usize;

        let protocol_id = match ProtocolId::from_u8(raw_protocol) {
            Some(ProtocolId::Ike) => {
                if spi_size != 0 || num_spi != 0 {
                    return Err(Error::syntax(format!(
                        "Invalid IKE Delete: SPI size {}, {} SPIs",
                        spi_size, num_spi
                    )));
                }
                ProtocolId::Ike
            }
            Some(ProtocolId::Esp) => {
                if spi_size != SPI_LEN_IPSEC || num_spi == 0 {
                    return Err(Error::syntax(format!(
                        "Invalid ESP Delete: SPI size {}, {} SPIs",
                        spi_size, num_spi
                    )));
                }
                ProtocolId::Esp
            }
            _ => {
                return Err(Error::syntax(format!(
                    "Unrecognized protocol in Delete Payload: {}",
                    raw_protocol
                )));
            }
        };

        if reader.remaining() != spi_size * num_spi {
            return Err(Error::syntax(format!(
                "Delete payload carries {} bytes for {} SPIs",
                reader.remaining(),
                num_spi
            )));
        }

        let spis = (0..num_spi)
            .map(|_| reader.read_u32())
            .collect::<Result<Vec<_>>>()?;

        Ok(DeletePayload { protocol_id, spis })
    }

    /// Serialize Delete payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        let num_spi = length_u16(self.spis.len(), "Number of SPIs")?;
        buf.put_u8(self.protocol_id.to_u8());
        let spi_size = if self.spis.is_empty() { 0 } else { SPI_LEN_IPSEC as u8 };
        buf.put_u8(spi_size);
        buf.put_u16(num_spi);
        for spi in &self.spis {
            buf.put_u32(*spi);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_two_esp_spis() {
        let data = [3, 4, 0, 2, 0x11, 0x11, 0x11, 0x11, 0x22, 0x22, 0x22, 0x22];
        let del = DeletePayload::from_payload_data(&data).unwrap();

        assert_eq!(del.protocol_id, ProtocolId::Esp);
        assert_eq!(del.num_spi(), 2);
        assert_eq!(del.spis, vec![0x1111_1111, 0x2222_2222]);

        let mut buf = BytesMut::new();
        del.encode_to(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[..]);
    }

    #[test]
    fn test_delete_spi_count_overflow() {
        let del = DeletePayload {
            protocol_id: ProtocolId::Esp,
            spis: vec![1; 65_536],
        };
        let mut buf = BytesMut::new();
        assert!(matches!(del.encode_to(&mut buf), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_delete_esp_without_spis_rejected() {
        let data = [3, 4, 0, 0];
        assert!(matches!(
            DeletePayload::from_payload_data(&data),
            Err(Error::InvalidSyntax(_))
        ));
        assert!(DeletePayload::esp(vec![]).is_err());
    }

    #[test]
    fn test_delete_ike() {
        let del = DeletePayload::from_payload_data(&[1, 0, 0, 0]).unwrap();
        assert_eq!(del, DeletePayload::ike());

        assert!(DeletePayload::from_payload_data(&[1, 8, 0, 1, 1, 2, 3, 4, 5, 6, 7, 8]).is_err());
    }

    #[test]
    fn test_delete_unknown_protocol() {
        assert!(matches!(
            DeletePayload::from_payload_data(&[2, 4, 0, 1, 0, 0, 0, 1]),
            Err(Error::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_delete_spi_count_mismatch() {
        let data = [3, 4, 0, 2, 0x11, 0x11, 0x11, 0x11];
        assert!(DeletePayload::from_payload_data(&data).is_err());
    }
}
