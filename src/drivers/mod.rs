//! SPI device drivers for the temperature front-ends.
//!
//! | Driver     | Chip family              | Returns            |
//! |------------|--------------------------|--------------------|
//! | `ads1118`  | 16-bit multiplexed ADC   | volts / °C (ITS)   |
//! | `max31865` | RTD-to-digital converter | ohms               |
//! | `mcp320x`  | 12-bit SAR ADC           | volts              |
//!
//! Every driver talks to its chip through an [`embedded_hal::spi::SpiDevice`]
//! (which owns chip-select) using fixed-length in-place transfers, so the
//! same code runs over a hardware SPI peripheral or a bit-banged bus.

pub mod ads1118;
pub mod max31865;
pub mod mcp320x;

use embedded_hal::spi::{MODE_0, MODE_1, MODE_2, Mode, Phase};

use crate::error::{Error, Result};

/// Bus parameters a driver is constructed with.  Checked once against the
/// chip's limits; the `SpiDevice` itself must already be configured to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSettings {
    pub mode: Mode,
    pub clock_hz: u32,
}

impl BusSettings {
    pub const fn new(mode: Mode, clock_hz: u32) -> Self {
        Self { mode, clock_hz }
    }

    /// SPI mode number (0-3).
    pub fn mode_number(&self) -> u8 {
        match self.mode {
            m if m == MODE_0 => 0,
            m if m == MODE_1 => 1,
            m if m == MODE_2 => 2,
            _ => 3,
        }
    }

    pub(crate) fn captures_on_second_edge(&self) -> bool {
        self.mode.phase == Phase::CaptureOnSecondTransition
    }

    /// Reject clocks outside `(min_exclusive, max_inclusive]`.
    pub(crate) fn check_clock(&self, min_exclusive: u32, max_inclusive: u32, what: &'static str) -> Result<()> {
        if self.clock_hz <= min_exclusive || self.clock_hz > max_inclusive {
            return Err(Error::InvalidParameter(what));
        }
        Ok(())
    }
}

/// Sign-extend the low `bits` of `raw` as a two's-complement field.
///
/// The sign is taken from bit `bits - 1` of the captured field, never from
/// the full word.
pub const fn sign_extend(raw: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((raw << shift) as i32) >> shift
}

/// Decode a big-endian two's-complement field of `bits` width held in `bytes`.
pub fn decode_twos_complement(bytes: &[u8], bits: u32) -> i32 {
    let raw = bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
    let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
    sign_extend(raw & mask, bits)
}

/// Round a wait in seconds up to whole nanoseconds for `DelayNs`.
pub(crate) fn secs_to_ns(secs: f64) -> u32 {
    let ns = (secs * 1e9).ceil();
    if ns >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        ns as u32
    }
}

// ---------------------------------------------------------------------------
// Scripted bus used by the driver unit tests
// ---------------------------------------------------------------------------
