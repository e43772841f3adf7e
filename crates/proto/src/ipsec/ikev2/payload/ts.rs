//! Traffic Selector payload (RFC 7296 Section 3.13)

use super::ByteReader;
use crate::ipsec::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Traffic selector type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TsType {
    /// TS_IPV4_ADDR_RANGE
    Ipv4AddrRange = 7,
    /// TS_IPV6_ADDR_RANGE
    Ipv6AddrRange = 8,
}

impl TsType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            7 => Some(TsType::Ipv4AddrRange),
            8 => Some(TsType::Ipv6AddrRange),
            _ => None,
        }
    }

    /// Selector record length on the wire
    pub fn selector_length(self) -> usize {
        match self {
            TsType::Ipv4AddrRange => 16,
            TsType::Ipv6AddrRange => 40,
        }
    }

    fn address_length(self) -> usize {
        match self {
            TsType::Ipv4AddrRange => 4,
            TsType::Ipv6AddrRange => 16,
        }
    }
}

/// Single traffic selector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrafficSelector {
    /// Selector type
    pub ts_type: TsType,

    /// IP protocol ID (0 = any)
    pub ip_protocol: u8,

    /// First port of the range
    pub start_port: u16,

    /// Last port of the range
    pub end_port: u16,

    /// First address of the range
    pub start_addr: IpAddr,

    /// Last address of the range
    pub end_addr: IpAddr,
}

impl TrafficSelector {
    /// Create a validated selector
    ///
    /// Both addresses must match the selector family and neither range may
    /// be inverted.
    pub fn new(
        ip_protocol: u8,
        start_port: u16,
        end_port: u16,
        start_addr: IpAddr,
        end_addr: IpAddr,
    ) -> Result<Self> {
        let ts_type = match (start_addr, end_addr) {
            (IpAddr::V4(_), IpAddr::V4(_)) => TsType::Ipv4AddrRange,
            (IpAddr::V6(_), IpAddr::V6(_)) => TsType::Ipv6AddrRange,
            _ => {
                return Err(Error::InvalidParameter(
                    "Traffic selector address families differ".into(),
                ))
            }
        };
        let ts = TrafficSelector {
            ts_type,
            ip_protocol,
            start_port,
            end_port,
            start_addr,
            end_addr,
        };
        ts.validate()?;
        Ok(ts)
    }

    /// Selector covering every IPv4 address and port
    pub fn ipv4_any() -> Self {
        TrafficSelector {
            ts_type: TsType::Ipv4AddrRange,
            ip_protocol: 0,
            start_port: 0,
            end_port: u16::MAX,
            start_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            end_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
        }
    }

    /// Selector covering every IPv6 address and port
    pub fn ipv6_any() -> Self {
        TrafficSelector {
            ts_type: TsType::Ipv6AddrRange,
            ip_protocol: 0,
            start_port: 0,
            end_port: u16::MAX,
            start_addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            end_addr: IpAddr::V6(Ipv6Addr::from(u128::MAX)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.start_port > self.end_port {
            return Err(Error::syntax(format!(
                "Invalid port range: {}-{}",
                self.start_port, self.end_port
            )));
        }
        if self.start_addr > self.end_addr {
            return Err(Error::syntax(format!(
                "Invalid address range: {}-{}",
                self.start_addr, self.end_addr
            )));
        }
        Ok(())
    }

    /// Whether `other` is entirely contained in this selector
    pub fn contains(&self, other: &TrafficSelector) -> bool {
        self.ts_type == other.ts_type
            && (self.ip_protocol == 0 || self.ip_protocol == other.ip_protocol)
            && self.start_port <= other.start_port
            && self.end_port >= other.end_port
            && self.start_addr <= other.start_addr
            && self.end_addr >= other.end_addr
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let raw_type = reader.read_u8()?;
        let ts_type = TsType::from_u8(raw_type)
            .ok_or_else(|| Error::syntax(format!("Invalid Traffic Selector type: {}", raw_type)))?;
        let ip_protocol = reader.read_u8()?;
        let length = reader.read_u16()? as usize;
        if length != ts_type.selector_length() {
            return Err(Error::syntax(format!(
                "Invalid Traffic Selector length {} for type {}",
                length, raw_type
            )));
        }
        let start_port = reader.read_u16()?;
        let end_port = reader.read_u16()?;
        let start_addr = read_addr(reader, ts_type)?;
        let end_addr = read_addr(reader, ts_type)?;

        let ts = TrafficSelector {
            ts_type,
            ip_protocol,
            start_port,
            end_port,
            start_addr,
            end_addr,
        };
        ts.validate()?;
        Ok(ts)
    }

    /// Serialize selector record to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.ts_type as u8);
        buf.put_u8(self.ip_protocol);
        buf.put_u16(self.ts_type.selector_length() as u16);
        buf.put_u16(self.start_port);
        buf.put_u16(self.end_port);
        put_addr(buf, &self.start_addr);
        put_addr(buf, &self.end_addr);
    }
}

fn read_addr(reader: &mut ByteReader<'_>, ts_type: TsType) -> Result<IpAddr> {
    let bytes = reader.read_bytes(ts_type.address_length())?;
    Ok(match ts_type {
        TsType::Ipv4AddrRange => IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])),
        TsType::Ipv6AddrRange => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    })
}

fn put_addr(buf: &mut BytesMut, addr: &IpAddr) {
    match addr {
        IpAddr::V4(v4) => buf.put_slice(&v4.octets()),
        IpAddr::V6(v6) => buf.put_slice(&v6.octets()),
    }
}

/// Traffic Selector Payload (TSi / TSr)
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Number of TSs |                 RESERVED                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ~                       <Traffic Selectors>                     ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPayload {
    /// Selectors in wire order
    pub selectors: Vec<TrafficSelector>,
}

impl TsPayload {
    /// Create new TS payload
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an empty or oversized selector list
    pub fn new(selectors: Vec<TrafficSelector>) -> Result<Self> {
        if selectors.is_empty() || selectors.len() > u8::MAX as usize {
            return Err(Error::InvalidParameter(format!(
                "Invalid number of traffic selectors: {}",
                selectors.len()
            )));
        }
        Ok(TsPayload { selectors })
    }

    /// Parse TS payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let count = reader.read_u8()?;
        if count == 0 {
            return Err(Error::syntax("Traffic selector payload without selectors"));
        }
        reader.skip(3)?;

        let mut selectors = Vec::with_capacity(count as usize);
        for _ in 0..count {
            selectors.push(TrafficSelector::decode(&mut reader)?);
        }
        if !reader.is_empty() {
            return Err(Error::syntax(format!(
                "Unexpected {} bytes after traffic selectors",
                reader.remaining()
            )));
        }
        Ok(TsPayload { selectors })
    }

    /// Serialize TS payload body to `buf`
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.selectors.len() as u8);
        buf.put_slice(&[0u8; 3]);
        for ts in &self.selectors {
            ts.encode_to(buf);
        }
    }
}
