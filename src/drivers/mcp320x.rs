//! MCP3204 / MCP3208 12-bit successive-approximation ADC.
//!
//! One conversion is a single 3-byte full-duplex exchange:
//!
//! ```text
//!  tx: 0 0 0 0 0 START S/D D2 | D1 D0 x x x x x x | x x x x x x x x
//!  rx: ? ? ? ? ? ?     ?   ?  | ?  ?  ? 0 B11..B8  | B7 .. B0
//! ```

use core::str::FromStr;

use embedded_hal::spi::{MODE_0, MODE_3, SpiDevice};
use heapless::Vec;
use log::debug;

use super::BusSettings;
use crate::error::{self, Error, Result};

const MIN_CLOCK_HZ: u32 = 10_000;
const MAX_CLOCK_HZ: u32 = 5_000_000;
const FULL_SCALE_COUNTS: f64 = 4096.0;

/// Which member of the family is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Mcp3204,
    Mcp3208,
}

impl Variant {
    pub const fn channel_count(self) -> u8 {
        match self {
            Self::Mcp3204 => 4,
            Self::Mcp3208 => 8,
        }
    }
}

/// An input selection: a single pin against ground or a fixed pseudo-
/// differential pair (`plus` is the IN+ pin).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Single(u8),
    Differential { plus: u8 },
}

impl Input {
    /// The 4-bit S/D, D2, D1, D0 selector.
    pub const fn id(self) -> u8 {
        match self {
            Self::Single(ch) => 0b1000 | (ch & 0b111),
            Self::Differential { plus } => plus & 0b111,
        }
    }

    /// Highest pin number this input touches.
    const fn top_pin(self) -> u8 {
        match self {
            Self::Single(ch) => ch,
            Self::Differential { plus } => plus | 1,
        }
    }

    fn supported_by(self, variant: Variant) -> bool {
        self.top_pin() < variant.channel_count()
    }
}

impl FromStr for Input {
    type Err = Error;

    /// `"0"`..`"7"` select single-ended inputs; `"01"`, `"10"`, `"23"`, …
    /// select the differential pairs.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.as_bytes();
        let pin = |b: u8| b.checked_sub(b'0').filter(|d| *d < 8);
        match digits {
            [d] => pin(*d)
                .map(Self::Single)
                .ok_or(Error::InvalidParameter("mcp320x: unknown channel")),
            [a, b] => match (pin(*a), pin(*b)) {
                (Some(plus), Some(minus)) if plus / 2 == minus / 2 && plus != minus => {
                    Ok(Self::Differential { plus })
                }
                _ => Err(Error::InvalidParameter("mcp320x: unknown differential pair")),
            },
            _ => Err(Error::InvalidParameter("mcp320x: unknown channel")),
        }
    }
}

/// Inputs the driver is allowed to convert when restricted.
pub type ChannelSet = Vec<Input, 16>;

#[derive(Debug, Clone, PartialEq)]
pub struct Mcp320xConfig {
    pub variant: Variant,
    /// Reference voltage on VREF.
    pub vref: f64,
    /// Restrict reads to these inputs.  `None` allows every input the
    /// variant has.
    pub channels: Option<ChannelSet>,
}

impl Default for Mcp320xConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Mcp3208,
            vref: 3.3,
            channels: None,
        }
    }
}

pub struct Mcp320x<SPI> {
    spi: SPI,
    cfg: Mcp320xConfig,
}

impl<SPI: SpiDevice> Mcp320x<SPI> {
    pub fn new(spi: SPI, bus: BusSettings, cfg: Mcp320xConfig) -> Result<Self> {
        if bus.mode != MODE_0 && bus.mode != MODE_3 {
            return Err(Error::InvalidParameter("mcp320x: SPI mode must be 0 or 3"));
        }
        bus.check_clock(MIN_CLOCK_HZ, MAX_CLOCK_HZ, "mcp320x: SPI clock outside 10 kHz..5 MHz")?;
        let mut dev = Self { spi, cfg: Mcp320xConfig::default() };
        dev.configure(cfg)?;
        Ok(dev)
    }

    pub fn configure(&mut self, cfg: Mcp320xConfig) -> Result<()> {
        if !(cfg.vref.is_finite() && cfg.vref > 0.0) {
            return Err(Error::InvalidParameter("mcp320x: reference voltage must be positive"));
        }
        if let Some(set) = &cfg.channels {
            if set.iter().any(|i| !i.supported_by(cfg.variant)) {
                return Err(Error::InvalidParameter("mcp320x: channel not present on this variant"));
            }
        }
        self.cfg = cfg;
        Ok(())
    }

    /// Convert `input` and return volts.
    pub fn read(&mut self, input: Input) -> Result<f64> {
        if !input.supported_by(self.cfg.variant) {
            return Err(Error::InvalidParameter("mcp320x: channel not present on this variant"));
        }
        if let Some(set) = &self.cfg.channels {
            if !set.contains(&input) {
                return Err(Error::InvalidParameter("mcp320x: channel not configured"));
            }
        }

        let mut buf = command(input);
        self.spi.transfer_in_place(&mut buf).map_err(error::bus)?;
        let raw = (u16::from(buf[1] & 0x0F) << 8) | u16::from(buf[2]);
        debug!("mcp320x: input id 0b{:04b} raw {}", input.id(), raw);
        Ok(f64::from(raw) * self.cfg.vref / FULL_SCALE_COUNTS)
    }

    pub fn config(&self) -> &Mcp320xConfig {
        &self.cfg
    }

    pub fn release(self) -> SPI {
        self.spi
    }
}

/// Command bytes for one conversion of `input`.
pub const fn command(input: Input) -> [u8; 3] {
    let id = input.id();
    [0b100 | (id >> 2), (id & 0b11) << 6, 0]
}
