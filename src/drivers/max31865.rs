//! MAX31865 RTD-to-digital converter.
//!
//! Register map used here:
//!
//! | Addr (read/write) | Register          |
//! |-------------------|-------------------|
//! | 0x00 / 0x80       | configuration     |
//! | 0x01, 0x02        | RTD MSB, RTD LSB  |
//! | 0x07              | fault status      |
//!
//! The converter runs in auto-conversion mode with bias on, so a read is a
//! plain burst of the two RTD registers.  Bit 0 of the LSB flags a fault.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use log::{debug, warn};

use super::BusSettings;
use crate::error::{self, Error, Result};

const MAX_CLOCK_HZ: u32 = 5_000_000;
const SETTLE_NS: u32 = 250_000_000;

const REG_CONFIG_WRITE: u8 = 0x80;
const REG_RTD_MSB: u8 = 0x01;
const REG_FAULT_STATUS: u8 = 0x07;

const CFG_BIAS: u8 = 0b1000_0000;
const CFG_AUTO: u8 = 0b0100_0000;
const CFG_THREE_WIRE: u8 = 0b0001_0000;
const CFG_FAULT_CLEAR: u8 = 0b0000_0010;
const CFG_FILTER_50HZ: u8 = 0b0000_0001;

// ---------------------------------------------------------------------------
// Fault status
// ---------------------------------------------------------------------------

/// Contents of the fault status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtdFaultSet(u8);

impl RtdFaultSet {
    pub const HIGH_THRESHOLD: u8 = 0b1000_0000;
    pub const LOW_THRESHOLD: u8 = 0b0100_0000;
    pub const REFIN_HIGH: u8 = 0b0010_0000;
    pub const REFIN_LOW_FORCE_OPEN: u8 = 0b0001_0000;
    pub const RTDIN_LOW_FORCE_OPEN: u8 = 0b0000_1000;
    pub const OVER_UNDER_VOLTAGE: u8 = 0b0000_0100;

    const NAMES: [(u8, &'static str); 6] = [
        (Self::HIGH_THRESHOLD, "RTD high threshold"),
        (Self::LOW_THRESHOLD, "RTD low threshold"),
        (Self::REFIN_HIGH, "REFIN- > 0.85 x Vbias"),
        (Self::REFIN_LOW_FORCE_OPEN, "REFIN- < 0.85 x Vbias (FORCE- open)"),
        (Self::RTDIN_LOW_FORCE_OPEN, "RTDIN- < 0.85 x Vbias (FORCE- open)"),
        (Self::OVER_UNDER_VOLTAGE, "over/under-voltage"),
    ];

    /// Keep only the defined status bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1111_1100)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RtdFaultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none (0x00)");
        }
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        write!(f, " (0x{:02X})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Max31865Config {
    /// Reference resistor on the board (ohms).
    pub r_ref: f64,
    /// Three-wire RTD connection.
    pub three_wire: bool,
    /// Reject 50 Hz mains instead of 60 Hz.
    pub mains_50hz: bool,
}

impl Default for Max31865Config {
    fn default() -> Self {
        Self {
            r_ref: 430.0,
            three_wire: false,
            mains_50hz: false,
        }
    }
}

impl Max31865Config {
    fn register(&self) -> u8 {
        let mut cfg = CFG_BIAS | CFG_AUTO | CFG_FAULT_CLEAR;
        if self.three_wire {
            cfg |= CFG_THREE_WIRE;
        }
        if self.mains_50hz {
            cfg |= CFG_FILTER_50HZ;
        }
        cfg
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct Max31865<SPI, D> {
    spi: SPI,
    delay: D,
    cfg: Max31865Config,
    last_good: Option<f64>,
    fault: Option<RtdFaultSet>,
}

impl<SPI: SpiDevice, D: DelayNs> Max31865<SPI, D> {
    pub fn new(spi: SPI, delay: D, bus: BusSettings, cfg: Max31865Config) -> Result<Self> {
        if !bus.captures_on_second_edge() {
            return Err(Error::InvalidParameter("max31865: SPI mode must have CPHA=1"));
        }
        bus.check_clock(0, MAX_CLOCK_HZ, "max31865: SPI clock above 5 MHz")?;
        let mut dev = Self {
            spi,
            delay,
            cfg,
            last_good: None,
            fault: None,
        };
        dev.configure(cfg)?;
        Ok(dev)
    }

    /// Write the configuration register and wait for the bias to settle.
    pub fn configure(&mut self, cfg: Max31865Config) -> Result<()> {
        if !(cfg.r_ref.is_finite() && cfg.r_ref > 0.0) {
            return Err(Error::InvalidParameter("max31865: reference resistor must be positive"));
        }
        self.cfg = cfg;
        self.write_config()?;
        self.delay.delay_ns(SETTLE_NS);
        Ok(())
    }

    /// Measured RTD resistance in ohms.
    ///
    /// When the chip flags a fault the status is latched (see [`fault`]),
    /// the fault is cleared on the chip and the last good resistance is
    /// returned instead.
    ///
    /// [`fault`]: Self::fault
    pub fn read(&mut self) -> Result<f64> {
        let mut buf = [REG_RTD_MSB, 0, 0];
        self.spi.transfer_in_place(&mut buf).map_err(error::bus)?;
        let word = u16::from_be_bytes([buf[1], buf[2]]);
        let ohms = f64::from(word >> 1) * self.cfg.r_ref / 32768.0;

        if word & 0b1 != 0 {
            let set = self.read_fault()?;
            warn!("max31865: fault {set}");
            self.write_config()?;
            self.fault = Some(set);
            return Ok(self.last_good.unwrap_or(ohms));
        }

        self.fault = None;
        self.last_good = Some(ohms);
        Ok(ohms)
    }

    /// Fault latched by the most recent read, if any.
    pub fn fault(&self) -> Option<RtdFaultSet> {
        self.fault
    }

    pub fn config(&self) -> &Max31865Config {
        &self.cfg
    }

    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    fn write_config(&mut self) -> Result<()> {
        let mut buf = [REG_CONFIG_WRITE, self.cfg.register()];
        self.spi.transfer_in_place(&mut buf).map_err(error::bus)
    }

    fn read_fault(&mut self) -> Result<RtdFaultSet> {
        let mut buf = [REG_FAULT_STATUS, 0];
        self.spi.transfer_in_place(&mut buf).map_err(error::bus)?;
        debug!("max31865: fault status 0x{:02X}", buf[1]);
        Ok(RtdFaultSet::from_bits(buf[1]))
    }
}
