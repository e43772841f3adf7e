//! IKE message header
//!
//! Implements the fixed header defined in RFC 7296 Section 3.1

use super::constants::*;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};

/// IKE message header (28 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Initiator's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Responder's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Next Payload | MjVer | MnVer | Exchange Type |     Flags     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Message ID                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Length                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Next payload and exchange type are kept as raw codes so that inbound
/// headers with unknown values can still be decoded and then rejected by
/// the validation step that owns the decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkeHeader {
    /// Initiator's Security Parameter Index
    pub initiator_spi: u64,

    /// Responder's Security Parameter Index (zero for IKE_SA_INIT request)
    pub responder_spi: u64,

    /// Next payload type code
    pub next_payload: u8,

    /// Major version (high nibble of the version octet)
    pub major_version: u8,

    /// Minor version (low nibble of the version octet)
    pub minor_version: u8,

    /// Exchange type code
    pub exchange_type: u8,

    /// Message flags
    pub flags: IkeFlags,

    /// Message ID
    pub message_id: u32,

    /// Declared total message length (inbound headers only, zero otherwise)
    pub length: u32,
}

impl IkeHeader {
    /// Create a header for an outbound message
    pub fn new(
        initiator_spi: u64,
        responder_spi: u64,
        next_payload: PayloadType,
        exchange_type: ExchangeType,
        is_response: bool,
        from_initiator: bool,
        message_id: u32,
    ) -> Self {
        IkeHeader {
            initiator_spi,
            responder_spi,
            next_payload: next_payload.to_u8(),
            major_version: IKE_VERSION >> 4,
            minor_version: IKE_VERSION & 0x0F,
            exchange_type: exchange_type.to_u8(),
            flags: IkeFlags::from_parts(is_response, from_initiator),
            message_id,
            length: 0,
        }
    }

    /// Parse IKE header from bytes
    ///
    /// Only the layout is checked here. Version and exchange type are
    /// validated by [`validate_major_version`](Self::validate_major_version)
    /// and [`validate_inbound_header`](Self::validate_inbound_header).
    ///
    /// # Errors
    ///
    /// Returns `InvalidSyntax` if the buffer is shorter than 28 bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < IKE_HEADER_SIZE {
            return Err(Error::syntax(format!(
                "IKE header truncated: {} bytes",
                data.len()
            )));
        }

        let initiator_spi = u64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]);
        let responder_spi = u64::from_be_bytes([
            data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
        ]);

        let next_payload = data[16];
        let major_version = data[17] >> 4;
        let minor_version = data[17] & 0x0F;
        let exchange_type = data[18];
        let flags = IkeFlags::new(data[19]);

        let message_id = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        let length = u32::from_be_bytes([data[24], data[25], data[26], data[27]]);

        Ok(IkeHeader {
            initiator_spi,
            responder_spi,
            next_payload,
            major_version,
            minor_version,
            exchange_type,
            flags,
            message_id,
            length,
        })
    }

    /// Serialize the header for a message whose payloads occupy `body_len` bytes
    pub fn to_bytes(&self, body_len: usize) -> [u8; IKE_HEADER_SIZE] {
        let mut bytes = [0u8; IKE_HEADER_SIZE];

        bytes[0..8].copy_from_slice(&self.initiator_spi.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.responder_spi.to_be_bytes());
        bytes[16] = self.next_payload;
        bytes[17] = IKE_VERSION;
        bytes[18] = self.exchange_type;
        bytes[19] = self.flags.value();
        bytes[20..24].copy_from_slice(&self.message_id.to_be_bytes());

        let length = (IKE_HEADER_SIZE + body_len) as u32;
        bytes[24..28].copy_from_slice(&length.to_be_bytes());

        bytes
    }

    /// Append the serialized header to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut, body_len: usize) {
        buf.put_slice(&self.to_bytes(body_len));
    }

    /// Check the major version
    ///
    /// # Errors
    ///
    /// - `UnsupportedVersion` if the peer speaks a newer major version
    /// - `InvalidSyntax` if the major version is older than 2
    pub fn validate_major_version(&self) -> Result<()> {
        if self.major_version > IKE_MAJOR_VERSION {
            return Err(Error::UnsupportedVersion(self.major_version));
        }
        if self.major_version < IKE_MAJOR_VERSION {
            return Err(Error::syntax(format!(
                "Major version is smaller than 2: {}",
                self.major_version
            )));
        }
        Ok(())
    }

    /// Check exchange type and declared length against the received packet
    ///
    /// # Errors
    ///
    /// Returns `InvalidSyntax` if the exchange type is not one of the four
    /// IKEv2 exchanges or the declared length differs from `packet_len`
    pub fn validate_inbound_header(&self, packet_len: usize) -> Result<()> {
        if ExchangeType::from_u8(self.exchange_type).is_none() {
            return Err(Error::syntax(format!(
                "Invalid IKE Exchange Type: {}",
                self.exchange_type
            )));
        }
        if self.length as usize != packet_len {
            return Err(Error::syntax(format!(
                "Invalid IKE Message Length. Received length: {}, declared length: {}",
                packet_len, self.length
            )));
        }
        Ok(())
    }

    /// Exchange type, if it is a known IKEv2 exchange
    pub fn exchange(&self) -> Option<ExchangeType> {
        ExchangeType::from_u8(self.exchange_type)
    }

    /// Next payload type, if it is a known payload type
    pub fn next_payload_type(&self) -> Option<PayloadType> {
        PayloadType::from_u8(self.next_payload)
    }

    /// Whether this header belongs to a response
    pub fn is_response(&self) -> bool {
        self.flags.is_response()
    }

    /// Whether the sender is the original IKE SA initiator
    pub fn from_initiator(&self) -> bool {
        self.flags.is_initiator()
    }

    /// Copy of this header announcing a different first payload
    pub fn with_next_payload(&self, next_payload: PayloadType) -> Self {
        IkeHeader {
            next_payload: next_payload.to_u8(),
            ..self.clone()
        }
    }
}
