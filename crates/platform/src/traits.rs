//! Collaborator traits consumed by the IKEv2 codec

use crate::{PlatformError, PlatformResult};
use rand::Rng;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Width class of the SPIs a generator hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpiKind {
    /// 8-byte IKE SA SPI
    Ike,
    /// 4-byte AH/ESP SPI
    Ipsec,
}

impl SpiKind {
    /// SPI size in bytes
    pub fn size(self) -> usize {
        match self {
            SpiKind::Ike => 8,
            SpiKind::Ipsec => 4,
        }
    }

    /// Largest representable SPI value
    pub fn max_value(self) -> u64 {
        match self {
            SpiKind::Ike => u64::MAX,
            SpiKind::Ipsec => u64::from(u32::MAX),
        }
    }
}

/// SPI allocation interface
///
/// Implementations reserve SPIs per address. An SPI returned by `allocate` or
/// `allocate_known` stays reserved until `release` is called with the same
/// address and value.
pub trait SpiGenerator: Send + Sync {
    /// Width class of SPIs produced by this generator
    fn kind(&self) -> SpiKind;

    /// Reserve a fresh SPI for `address`
    ///
    /// # Errors
    ///
    /// Returns an error if no SPI could be reserved
    fn allocate(&self, address: IpAddr) -> PlatformResult<u64>;

    /// Reserve a specific SPI chosen by the peer
    ///
    /// # Errors
    ///
    /// Returns an error if the SPI does not fit the generator's width or is
    /// already reserved for `address`
    fn allocate_known(&self, address: IpAddr, spi: u64) -> PlatformResult<u64>;

    /// Return a reserved SPI to the pool
    fn release(&self, address: IpAddr, spi: u64);
}

/// Reference allocator drawing random SPIs and tracking them in memory
#[derive(Debug)]
pub struct RandomSpiGenerator {
    kind: SpiKind,
    allocated: Mutex<HashSet<(IpAddr, u64)>>,
}

impl RandomSpiGenerator {
    /// Attempts made to find a free random SPI before giving up
    pub const MAX_ATTEMPTS: usize = 16;

    /// Values below this are reserved by IANA for IPsec SPIs
    pub const MIN_IPSEC_SPI: u64 = 256;

    /// Create a generator for the given width class
    pub fn new(kind: SpiKind) -> Self {
        Self {
            kind,
            allocated: Mutex::new(HashSet::new()),
        }
    }

    /// Generator for 8-byte IKE SPIs
    pub fn ike() -> Self {
        Self::new(SpiKind::Ike)
    }

    /// Generator for 4-byte IPsec SPIs
    pub fn ipsec() -> Self {
        Self::new(SpiKind::Ipsec)
    }

    /// Whether `spi` is currently reserved for `address`
    pub fn is_allocated(&self, address: IpAddr, spi: u64) -> bool {
        self.table().contains(&(address, spi))
    }

    /// Number of SPIs currently reserved across all addresses
    pub fn allocated_count(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> MutexGuard<'_, HashSet<(IpAddr, u64)>> {
        self.allocated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn min_value(&self) -> u64 {
        match self.kind {
            SpiKind::Ike => 1,
            SpiKind::Ipsec => Self::MIN_IPSEC_SPI,
        }
    }
}

impl SpiGenerator for RandomSpiGenerator {
    fn kind(&self) -> SpiKind {
        self.kind
    }

    fn allocate(&self, address: IpAddr) -> PlatformResult<u64> {
        let mut rng = rand::thread_rng();
        let mut table = self.table();

        for _ in 0..Self::MAX_ATTEMPTS {
            let spi = rng.gen_range(self.min_value()..=self.kind.max_value());
            if table.insert((address, spi)) {
                debug!(spi = %format!("{:x}", spi), %address, "SPI allocated");
                return Ok(spi);
            }
        }

        Err(PlatformError::ResourceUnavailable(format!(
            "no free SPI for {} after {} attempts",
            address,
            Self::MAX_ATTEMPTS
        )))
    }

    fn allocate_known(&self, address: IpAddr, spi: u64) -> PlatformResult<u64> {
        if spi < self.min_value() || spi > self.kind.max_value() {
            return Err(PlatformError::Config(format!(
                "SPI 0x{:x} out of range for {:?} generator",
                spi, self.kind
            )));
        }

        if !self.table().insert((address, spi)) {
            return Err(PlatformError::ResourceUnavailable(format!(
                "SPI 0x{:x} already reserved for {}",
                spi, address
            )));
        }

        debug!(spi = %format!("{:x}", spi), %address, "Known SPI reserved");
        Ok(spi)
    }

    fn release(&self, address: IpAddr, spi: u64) {
        if !self.table().remove(&(address, spi)) {
            warn!(spi = %format!("{:x}", spi), %address, "Releasing SPI that was not reserved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))
    }

    #[test]
    fn test_spi_kind_sizes() {
        assert_eq!(SpiKind::Ike.size(), 8);
        assert_eq!(SpiKind::Ipsec.size(), 4);
        assert_eq!(SpiKind::Ipsec.max_value(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_allocate_and_release() {
        let gen = RandomSpiGenerator::ipsec();
        let spi = gen.allocate(addr()).unwrap();

        assert!(spi >= RandomSpiGenerator::MIN_IPSEC_SPI);
        assert!(spi <= u64::from(u32::MAX));
        assert!(gen.is_allocated(addr(), spi));

        gen.release(addr(), spi);
        assert!(!gen.is_allocated(addr(), spi));
        assert_eq!(gen.allocated_count(), 0);
    }

    #[test]
    fn test_allocate_known_rejects_duplicate() {
        let gen = RandomSpiGenerator::ike();
        gen.allocate_known(addr(), 0x1122_3344_5566_7788).unwrap();

        let err = gen.allocate_known(addr(), 0x1122_3344_5566_7788).unwrap_err();
        assert!(matches!(err, PlatformError::ResourceUnavailable(_)));
    }

    #[test]
    fn test_allocate_known_is_per_address() {
        let gen = RandomSpiGenerator::ipsec();
        let other = IpAddr::V6(Ipv6Addr::LOCALHOST);

        gen.allocate_known(addr(), 0x1234).unwrap();
        gen.allocate_known(other, 0x1234).unwrap();
        assert_eq!(gen.allocated_count(), 2);
    }

    #[test]
    fn test_allocate_known_rejects_out_of_range() {
        let gen = RandomSpiGenerator::ipsec();

        assert!(matches!(
            gen.allocate_known(addr(), 0x1_0000_0000),
            Err(PlatformError::Config(_))
        ));
        assert!(matches!(
            gen.allocate_known(addr(), 0),
            Err(PlatformError::Config(_))
        ));
    }

    #[test]
    fn test_release_unknown_is_noop() {
        let gen = RandomSpiGenerator::ipsec();
        gen.release(addr(), 0xdead);
        assert_eq!(gen.allocated_count(), 0);
    }
}
