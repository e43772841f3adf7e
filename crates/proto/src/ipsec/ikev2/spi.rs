//! Owned SPI reservations
//!
//! An [`SpiResource`] ties a reserved SPI to the generator that handed it
//! out. The SPI goes back to the generator exactly once, either through an
//! explicit [`SpiResource::release`] or when the guard is dropped.

use crate::ipsec::logging;
use crate::ipsec::Result;
use ike_platform::{SpiGenerator, SpiKind};
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reserved SPI, released on drop
pub struct SpiResource {
    generator: Arc<dyn SpiGenerator>,
    address: IpAddr,
    spi: u64,
    released: AtomicBool,
}

impl SpiResource {
    /// Reserve a fresh SPI for `address`
    pub fn allocate(generator: Arc<dyn SpiGenerator>, address: IpAddr) -> Result<Self> {
        let spi = generator.allocate(address)?;
        Ok(Self::reserved(generator, address, spi))
    }

    /// Reserve an SPI chosen by the peer at `address`
    pub fn allocate_known(generator: Arc<dyn SpiGenerator>, address: IpAddr, spi: u64) -> Result<Self> {
        let spi = generator.allocate_known(address, spi)?;
        Ok(Self::reserved(generator, address, spi))
    }

    fn reserved(generator: Arc<dyn SpiGenerator>, address: IpAddr, spi: u64) -> Self {
        logging::log_spi_allocated(generator.kind(), &address, spi);
        SpiResource {
            generator,
            address,
            spi,
            released: AtomicBool::new(false),
        }
    }

    /// Reserved SPI value
    pub fn spi(&self) -> u64 {
        self.spi
    }

    /// Address the SPI is reserved for
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Width class of the SPI
    pub fn kind(&self) -> SpiKind {
        self.generator.kind()
    }

    /// Whether the SPI was already returned to the generator
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Return the SPI to the generator; later calls are no-ops
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.generator.release(self.address, self.spi);
            logging::log_spi_released(self.generator.kind(), &self.address, self.spi);
        }
    }
}

impl Drop for SpiResource {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SpiResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiResource")
            .field("kind", &self.generator.kind())
            .field("address", &self.address)
            .field("spi", &format_args!("{:#x}", self.spi))
            .field("released", &self.is_released())
            .finish()
    }
}
