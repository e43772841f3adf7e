//! Configuration payload (RFC 7296 Section 3.15)

use super::{length_u16, ByteReader};
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Configuration payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConfigType {
    /// CFG_REQUEST
    Request = 1,
    /// CFG_REPLY
    Reply = 2,
    /// CFG_SET
    Set = 3,
    /// CFG_ACK
    Ack = 4,
}

impl ConfigType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ConfigType::Request),
            2 => Some(ConfigType::Reply),
            3 => Some(ConfigType::Set),
            4 => Some(ConfigType::Ack),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Recognized configuration attribute
///
/// A `None` value is an empty attribute, which is how a request asks for a
/// value. Replies carry the populated form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAttribute {
    /// INTERNAL_IP4_ADDRESS (1)
    Ipv4Address(Option<Ipv4Addr>),
    /// INTERNAL_IP4_NETMASK (2)
    Ipv4Netmask(Option<Ipv4Addr>),
    /// INTERNAL_IP4_DNS (3)
    Ipv4Dns(Option<Ipv4Addr>),
    /// INTERNAL_IP4_DHCP (6)
    Ipv4Dhcp(Option<Ipv4Addr>),
    /// APPLICATION_VERSION (7)
    ApplicationVersion(String),
    /// INTERNAL_IP6_ADDRESS (8): address and prefix length
    Ipv6Address(Option<(Ipv6Addr, u8)>),
    /// INTERNAL_IP6_DNS (10)
    Ipv6Dns(Option<Ipv6Addr>),
    /// INTERNAL_IP4_SUBNET (13): address and prefix length
    Ipv4Subnet(Option<(Ipv4Addr, u8)>),
    /// INTERNAL_IP6_SUBNET (15): address and prefix length
    Ipv6Subnet(Option<(Ipv6Addr, u8)>),
    /// P_CSCF_IP4_ADDRESS (20)
    Ipv4Pcscf(Option<Ipv4Addr>),
    /// P_CSCF_IP6_ADDRESS (21)
    Ipv6Pcscf(Option<Ipv6Addr>),
}

impl ConfigAttribute {
    /// INTERNAL_IP4_ADDRESS
    pub const INTERNAL_IP4_ADDRESS: u16 = 1;
    /// INTERNAL_IP4_NETMASK
    pub const INTERNAL_IP4_NETMASK: u16 = 2;
    /// INTERNAL_IP4_DNS
    pub const INTERNAL_IP4_DNS: u16 = 3;
    /// INTERNAL_IP4_DHCP
    pub const INTERNAL_IP4_DHCP: u16 = 6;
    /// APPLICATION_VERSION
    pub const APPLICATION_VERSION: u16 = 7;
    /// INTERNAL_IP6_ADDRESS
    pub const INTERNAL_IP6_ADDRESS: u16 = 8;
    /// INTERNAL_IP6_DNS
    pub const INTERNAL_IP6_DNS: u16 = 10;
    /// INTERNAL_IP4_SUBNET
    pub const INTERNAL_IP4_SUBNET: u16 = 13;
    /// SUPPORTED_ATTRIBUTES
    pub const SUPPORTED_ATTRIBUTES: u16 = 14;
    /// INTERNAL_IP6_SUBNET
    pub const INTERNAL_IP6_SUBNET: u16 = 15;
    /// P_CSCF_IP4_ADDRESS
    pub const P_CSCF_IP4_ADDRESS: u16 = 20;
    /// P_CSCF_IP6_ADDRESS
    pub const P_CSCF_IP6_ADDRESS: u16 = 21;

    const TYPE_MASK: u16 = 0x7FFF;

    /// Attribute type code
    pub fn attribute_type(&self) -> u16 {
        match self {
            ConfigAttribute::Ipv4Address(_) => Self::INTERNAL_IP4_ADDRESS,
            ConfigAttribute::Ipv4Netmask(_) => Self::INTERNAL_IP4_NETMASK,
            ConfigAttribute::Ipv4Dns(_) => Self::INTERNAL_IP4_DNS,
            ConfigAttribute::Ipv4Dhcp(_) => Self::INTERNAL_IP4_DHCP,
            ConfigAttribute::ApplicationVersion(_) => Self::APPLICATION_VERSION,
            ConfigAttribute::Ipv6Address(_) => Self::INTERNAL_IP6_ADDRESS,
            ConfigAttribute::Ipv6Dns(_) => Self::INTERNAL_IP6_DNS,
            ConfigAttribute::Ipv4Subnet(_) => Self::INTERNAL_IP4_SUBNET,
            ConfigAttribute::Ipv6Subnet(_) => Self::INTERNAL_IP6_SUBNET,
            ConfigAttribute::Ipv4Pcscf(_) => Self::P_CSCF_IP4_ADDRESS,
            ConfigAttribute::Ipv6Pcscf(_) => Self::P_CSCF_IP6_ADDRESS,
        }
    }

    /// Whether the attribute carries no value
    pub fn is_empty_value(&self) -> bool {
        match self {
            ConfigAttribute::Ipv4Address(v)
            | ConfigAttribute::Ipv4Netmask(v)
            | ConfigAttribute::Ipv4Dns(v)
            | ConfigAttribute::Ipv4Dhcp(v)
            | ConfigAttribute::Ipv4Pcscf(v) => v.is_none(),
            ConfigAttribute::Ipv6Dns(v) | ConfigAttribute::Ipv6Pcscf(v) => v.is_none(),
            ConfigAttribute::Ipv6Address(v) | ConfigAttribute::Ipv6Subnet(v) => v.is_none(),
            ConfigAttribute::Ipv4Subnet(v) => v.is_none(),
            ConfigAttribute::ApplicationVersion(s) => s.is_empty(),
        }
    }

    /// Decode one attribute, `None` if its type is not recognized
    fn decode(reader: &mut ByteReader<'_>) -> Result<Option<Self>> {
        let attribute_type = reader.read_u16()? & Self::TYPE_MASK;
        let length = reader.read_u16()? as usize;
        let value = reader.read_bytes(length)?;

        let attribute = match attribute_type {
            Self::INTERNAL_IP4_ADDRESS => ConfigAttribute::Ipv4Address(ipv4_value(value)?),
            Self::INTERNAL_IP4_NETMASK => {
                let netmask = ipv4_value(value)?;
                if let Some(mask) = netmask {
                    netmask_to_prefix_len(mask)?;
                }
                ConfigAttribute::Ipv4Netmask(netmask)
            }
            Self::INTERNAL_IP4_DNS => ConfigAttribute::Ipv4Dns(ipv4_value(value)?),
            Self::INTERNAL_IP4_DHCP => ConfigAttribute::Ipv4Dhcp(ipv4_value(value)?),
            Self::APPLICATION_VERSION => {
                ConfigAttribute::ApplicationVersion(String::from_utf8_lossy(value).into_owned())
            }
            Self::INTERNAL_IP6_ADDRESS => ConfigAttribute::Ipv6Address(ipv6_prefix_value(value)?),
            Self::INTERNAL_IP6_DNS => ConfigAttribute::Ipv6Dns(ipv6_value(value)?),
            Self::INTERNAL_IP4_SUBNET => ConfigAttribute::Ipv4Subnet(ipv4_subnet_value(value)?),
            Self::INTERNAL_IP6_SUBNET => ConfigAttribute::Ipv6Subnet(ipv6_prefix_value(value)?),
            Self::P_CSCF_IP4_ADDRESS => ConfigAttribute::Ipv4Pcscf(ipv4_value(value)?),
            Self::P_CSCF_IP6_ADDRESS => ConfigAttribute::Ipv6Pcscf(ipv6_value(value)?),
            other => {
                debug!(attribute_type = other, length, "Dropping unrecognized config attribute");
                return Ok(None);
            }
        };
        Ok(Some(attribute))
    }

    /// Serialize attribute (type, length, value) to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        let mut value = BytesMut::new();
        match self {
            ConfigAttribute::Ipv4Address(v)
            | ConfigAttribute::Ipv4Netmask(v)
            | ConfigAttribute::Ipv4Dns(v)
            | ConfigAttribute::Ipv4Dhcp(v)
            | ConfigAttribute::Ipv4Pcscf(v) => {
                if let Some(addr) = v {
                    value.put_slice(&addr.octets());
                }
            }
            ConfigAttribute::Ipv6Dns(v) | ConfigAttribute::Ipv6Pcscf(v) => {
                if let Some(addr) = v {
                    value.put_slice(&addr.octets());
                }
            }
            ConfigAttribute::Ipv6Address(v) | ConfigAttribute::Ipv6Subnet(v) => {
                if let Some((addr, prefix)) = v {
                    value.put_slice(&addr.octets());
                    value.put_u8(*prefix);
                }
            }
            ConfigAttribute::Ipv4Subnet(v) => {
                if let Some((addr, prefix)) = v {
                    value.put_slice(&addr.octets());
                    value.put_slice(&prefix_len_to_netmask(*prefix).octets());
                }
            }
            ConfigAttribute::ApplicationVersion(s) => value.put_slice(s.as_bytes()),
        }

        buf.put_u16(self.attribute_type());
        buf.put_u16(length_u16(value.len(), "Attribute length")?);
        buf.put_slice(&value);
        Ok(())
    }
}

fn invalid_length() -> Error {
    Error::syntax("Invalid configuration length")
}

fn ipv4_value(value: &[u8]) -> Result<Option<Ipv4Addr>> {
    match value.len() {
        0 => Ok(None),
        4 => Ok(Some(Ipv4Addr::new(value[0], value[1], value[2], value[3]))),
        _ => Err(invalid_length()),
    }
}

fn ipv6_value(value: &[u8]) -> Result<Option<Ipv6Addr>> {
    match value.len() {
        0 => Ok(None),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(value);
            Ok(Some(Ipv6Addr::from(octets)))
        }
        _ => Err(invalid_length()),
    }
}

fn ipv6_prefix_value(value: &[u8]) -> Result<Option<(Ipv6Addr, u8)>> {
    match value.len() {
        0 => Ok(None),
        17 => {
            let prefix = value[16];
            if prefix > 128 {
                return Err(Error::syntax(format!("Invalid IPv6 prefix length: {}", prefix)));
            }
            let addr = ipv6_value(&value[..16])?.ok_or_else(invalid_length)?;
            Ok(Some((addr, prefix)))
        }
        _ => Err(invalid_length()),
    }
}

fn ipv4_subnet_value(value: &[u8]) -> Result<Option<(Ipv4Addr, u8)>> {
    match value.len() {
        0 => Ok(None),
        8 => {
            let addr = Ipv4Addr::new(value[0], value[1], value[2], value[3]);
            let mask = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
            Ok(Some((addr, netmask_to_prefix_len(mask)?)))
        }
        _ => Err(invalid_length()),
    }
}

/// Prefix length of a contiguous IPv4 netmask
///
/// # Errors
///
/// Returns `InvalidSyntax` if the mask bits are not contiguous
pub fn netmask_to_prefix_len(netmask: Ipv4Addr) -> Result<u8> {
    let bits = u32::from(netmask);
    let prefix = bits.leading_ones();
    if bits.checked_shl(prefix).unwrap_or(0) != 0 {
        return Err(Error::syntax(format!("Invalid netmask: {}", netmask)));
    }
    Ok(prefix as u8)
}

/// IPv4 netmask for a prefix length (clamped to 32)
pub fn prefix_len_to_netmask(prefix_len: u8) -> Ipv4Addr {
    let prefix = u32::from(prefix_len.min(32));
    let bits = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    Ipv4Addr::from(bits)
}

/// Configuration Payload
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C| RESERVED    |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   CFG Type    |                    RESERVED                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// ~                   Configuration Attributes                    ~
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    /// Configuration type code
    pub config_type: u8,

    /// Recognized attributes in wire order
    pub attributes: Vec<ConfigAttribute>,
}

impl ConfigPayload {
    /// Create new configuration payload
    pub fn new(config_type: ConfigType, attributes: Vec<ConfigAttribute>) -> Self {
        ConfigPayload {
            config_type: config_type.to_u8(),
            attributes,
        }
    }

    /// Known configuration type, if any
    pub fn kind(&self) -> Option<ConfigType> {
        ConfigType::from_u8(self.config_type)
    }

    /// Parse Configuration payload from data (without header)
    ///
    /// Unrecognized attributes are dropped. In a reply, a populated netmask
    /// requires a populated IPv4 address and may appear at most once.
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let config_type = reader.read_u8()?;
        reader.skip(3)?;

        let mut attributes = Vec::new();
        while !reader.is_empty() {
            if let Some(attribute) = ConfigAttribute::decode(&mut reader)? {
                attributes.push(attribute);
            }
        }

        let payload = ConfigPayload {
            config_type,
            attributes,
        };
        if payload.kind() == Some(ConfigType::Reply) {
            payload.validate_netmask_in_reply()?;
        }
        Ok(payload)
    }

    fn validate_netmask_in_reply(&self) -> Result<()> {
        let has_ipv4_address = self
            .attributes
            .iter()
            .any(|a| matches!(a, ConfigAttribute::Ipv4Address(Some(_))));
        let num_netmask = self
            .attributes
            .iter()
            .filter(|a| matches!(a, ConfigAttribute::Ipv4Netmask(Some(_))))
            .count();

        if !has_ipv4_address && num_netmask > 0 {
            return Err(Error::syntax(
                "Found INTERNAL_IP4_NETMASK attribute but no INTERNAL_IP4_ADDRESS attribute",
            ));
        }
        if num_netmask > 1 {
            return Err(Error::syntax("Found more than one INTERNAL_IP4_NETMASK"));
        }
        Ok(())
    }

    /// Serialize Configuration payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.config_type);
        buf.put_slice(&[0u8; 3]);
        for attribute in &self.attributes {
            attribute.encode_to(buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(cp: &ConfigPayload) -> Vec<u8> {
        let mut buf = BytesMut::new();
        cp.encode_to(&mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn test_config_request_with_empty_attributes() {
        let cp = ConfigPayload::new(
            ConfigType::Request,
            vec![
                ConfigAttribute::Ipv4Address(None),
                ConfigAttribute::Ipv4Dns(None),
                ConfigAttribute::Ipv6Address(None),
            ],
        );
        let data = encode(&cp);
        assert_eq!(data.len(), 4 + 3 * 4);

        let parsed = ConfigPayload::from_payload_data(&data).unwrap();
        assert_eq!(parsed, cp);
        assert!(parsed.attributes.iter().all(ConfigAttribute::is_empty_value));
    }

    #[test]
    fn test_config_reply_roundtrip() {
        let cp = ConfigPayload::new(
            ConfigType::Reply,
            vec![
                ConfigAttribute::Ipv4Address(Some(Ipv4Addr::new(10, 1, 2, 3))),
                ConfigAttribute::Ipv4Netmask(Some(Ipv4Addr::new(255, 255, 255, 0))),
                ConfigAttribute::Ipv6Address(Some(("2001:db8::5".parse().unwrap(), 64))),
                ConfigAttribute::Ipv4Subnet(Some((Ipv4Addr::new(10, 0, 0, 0), 8))),
                ConfigAttribute::ApplicationVersion("ike-proto".into()),
            ],
        );
        let parsed = ConfigPayload::from_payload_data(&encode(&cp)).unwrap();
        assert_eq!(parsed, cp);
    }

    #[test]
    fn test_unrecognized_attribute_dropped() {
        let mut data = vec![2, 0, 0, 0];
        data.extend_from_slice(&[0x00, 0x0E, 0x00, 0x02, 0x00, 0x01]); // SUPPORTED_ATTRIBUTES
        data.extend_from_slice(&[0x00, 0x03, 0x00, 0x04, 8, 8, 8, 8]);

        let parsed = ConfigPayload::from_payload_data(&data).unwrap();
        assert_eq!(
            parsed.attributes,
            vec![ConfigAttribute::Ipv4Dns(Some(Ipv4Addr::new(8, 8, 8, 8)))]
        );
    }

    #[test]
    fn test_invalid_attribute_length() {
        let data = [1, 0, 0, 0, 0x00, 0x01, 0x00, 0x03, 1, 2, 3];
        assert_eq!(
            ConfigPayload::from_payload_data(&data),
            Err(Error::syntax("Invalid configuration length"))
        );
    }

    #[test]
    fn test_reply_netmask_without_address() {
        let cp = ConfigPayload::new(
            ConfigType::Reply,
            vec![ConfigAttribute::Ipv4Netmask(Some(Ipv4Addr::new(255, 255, 0, 0)))],
        );
        assert!(matches!(
            ConfigPayload::from_payload_data(&encode(&cp)),
            Err(Error::InvalidSyntax(_))
        ));

        // Same content in a request is accepted
        let req = ConfigPayload { config_type: 1, ..cp };
        assert!(ConfigPayload::from_payload_data(&encode(&req)).is_ok());
    }

    #[test]
    fn test_reply_multiple_netmasks() {
        let cp = ConfigPayload::new(
            ConfigType::Reply,
            vec![
                ConfigAttribute::Ipv4Address(Some(Ipv4Addr::new(10, 0, 0, 1))),
                ConfigAttribute::Ipv4Netmask(Some(Ipv4Addr::new(255, 0, 0, 0))),
                ConfigAttribute::Ipv4Netmask(Some(Ipv4Addr::new(255, 255, 0, 0))),
            ],
        );
        assert!(ConfigPayload::from_payload_data(&encode(&cp)).is_err());
    }

    #[test]
    fn test_netmask_prefix_conversion() {
        assert_eq!(netmask_to_prefix_len(Ipv4Addr::new(255, 255, 255, 0)).unwrap(), 24);
        assert_eq!(netmask_to_prefix_len(Ipv4Addr::new(0, 0, 0, 0)).unwrap(), 0);
        assert_eq!(netmask_to_prefix_len(Ipv4Addr::new(255, 255, 255, 255)).unwrap(), 32);
        assert!(netmask_to_prefix_len(Ipv4Addr::new(255, 0, 255, 0)).is_err());

        assert_eq!(prefix_len_to_netmask(24), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_len_to_netmask(0), Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(prefix_len_to_netmask(32), Ipv4Addr::new(255, 255, 255, 255));
    }

    #[test]
    fn test_oversized_attribute_not_encoded() {
        let version = "v".repeat(70_000);
        let cp = ConfigPayload::new(ConfigType::Reply, vec![ConfigAttribute::ApplicationVersion(version)]);
        let mut buf = BytesMut::new();
        assert!(matches!(cp.encode_to(&mut buf), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_truncated_attribute() {
        let data = [2, 0, 0, 0, 0x00, 0x01, 0x00, 0x04, 10];
        assert!(matches!(
            ConfigPayload::from_payload_data(&data),
            Err(Error::BufferTooShort { .. })
        ));
    }
}
