//! ADS1118 16-bit multiplexed ADC with internal temperature sensor.
//!
//! Every exchange is four bytes full-duplex: the host clocks out the
//! configuration word twice-padded (`[MSB, LSB, 0, 0]`) and the chip clocks
//! back the previous conversion result followed by an echo of the
//! configuration register.
//!
//! ```text
//!  MSB  7    6..4     3..1     0        LSB  7..5   4    3    2..0
//!       SS   MUX      PGA      MODE          DR     TS   PU   0b011
//! ```

use core::str::FromStr;
use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{MODE_1, SpiDevice};
use log::{debug, warn};

use super::{BusSettings, secs_to_ns};
use crate::error::{self, Error, Result};

/// Lowest clock the chip tolerates is 17.9 Hz (exclusive).
const MIN_CLOCK_HZ: u32 = 17;
const MAX_CLOCK_HZ: u32 = 4_000_000;

/// Internal temperature sensor resolution (°C per LSB of the 14-bit field).
const ITS_DEG_PER_LSB: f64 = 0.03125;

const FINER_BELOW: f64 = 0.4;
const COARSER_ABOVE: f64 = 0.9;
const SATURATED: i32 = 0x7FFF;

// ---------------------------------------------------------------------------
// Input multiplexer
// ---------------------------------------------------------------------------

/// Input pair selected by the multiplexer.  `G` is ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Mux {
    Ain01 = 0b000,
    Ain03 = 0b001,
    Ain13 = 0b010,
    Ain23 = 0b011,
    Ain0G = 0b100,
    Ain1G = 0b101,
    Ain2G = 0b110,
    Ain3G = 0b111,
}

impl Mux {
    pub const ALL: [Self; 8] = [
        Self::Ain01,
        Self::Ain03,
        Self::Ain13,
        Self::Ain23,
        Self::Ain0G,
        Self::Ain1G,
        Self::Ain2G,
        Self::Ain3G,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Ain01 => "01",
            Self::Ain03 => "03",
            Self::Ain13 => "13",
            Self::Ain23 => "23",
            Self::Ain0G => "0G",
            Self::Ain1G => "1G",
            Self::Ain2G => "2G",
            Self::Ain3G => "3G",
        }
    }
}

impl TryFrom<u8> for Mux {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(Error::InvalidParameter("ads1118: unknown channel code"))
    }
}

impl FromStr for Mux {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(s))
            .ok_or(Error::InvalidParameter("ads1118: unknown channel pair"))
    }
}

// ---------------------------------------------------------------------------
// Full-scale range (PGA)
// ---------------------------------------------------------------------------

/// Programmable-gain full-scale range, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum FullScale {
    V6_144 = 0,
    V4_096 = 1,
    V2_048 = 2,
    V1_024 = 3,
    V0_512 = 4,
    V0_256 = 5,
}

impl FullScale {
    /// Ordered by code, i.e. descending voltage.
    pub const ALL: [Self; 6] = [
        Self::V6_144,
        Self::V4_096,
        Self::V2_048,
        Self::V1_024,
        Self::V0_512,
        Self::V0_256,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub const fn volts(self) -> f64 {
        match self {
            Self::V6_144 => 6.144,
            Self::V4_096 => 4.096,
            Self::V2_048 => 2.048,
            Self::V1_024 => 1.024,
            Self::V0_512 => 0.512,
            Self::V0_256 => 0.256,
        }
    }

    /// Smallest range that still covers `volts` (sign ignored); the coarsest
    /// range if none does.
    pub fn coerce(volts: f64) -> Self {
        let want = volts.abs();
        Self::ALL
            .into_iter()
            .rev()
            .find(|r| r.volts() >= want)
            .unwrap_or(Self::V6_144)
    }

    pub fn finer(self) -> Option<Self> {
        Self::from_code(self.code() + 1)
    }

    pub fn coarser(self) -> Option<Self> {
        self.code().checked_sub(1).and_then(Self::from_code)
    }
}

// ---------------------------------------------------------------------------
// Data rate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataRate {
    Sps8 = 0,
    Sps16 = 1,
    Sps32 = 2,
    Sps64 = 3,
    Sps128 = 4,
    Sps250 = 5,
    Sps475 = 6,
    Sps860 = 7,
}

impl DataRate {
    pub const ALL: [Self; 8] = [
        Self::Sps8,
        Self::Sps16,
        Self::Sps32,
        Self::Sps64,
        Self::Sps128,
        Self::Sps250,
        Self::Sps475,
        Self::Sps860,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub const fn sps(self) -> u32 {
        match self {
            Self::Sps8 => 8,
            Self::Sps16 => 16,
            Self::Sps32 => 32,
            Self::Sps64 => 64,
            Self::Sps128 => 128,
            Self::Sps250 => 250,
            Self::Sps475 => 475,
            Self::Sps860 => 860,
        }
    }

    /// Fastest rate not above `sps`; the slowest rate if `sps` is below all.
    pub fn coerce(sps: f64) -> Self {
        Self::ALL
            .into_iter()
            .rev()
            .find(|r| f64::from(r.sps()) <= sps)
            .unwrap_or(Self::Sps8)
    }

    /// Minimum wait between triggering a conversion and reading it.
    pub fn settle_time(self) -> Duration {
        Duration::from_secs_f64(1.2 / f64::from(self.sps()))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Device configuration.  Range and rate are requests and get coerced to
/// the nearest supported value; the channel is exact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ads1118Config {
    /// Default channel for `configure`.
    pub channel: Mux,
    /// Requested full-scale range in volts; rounded up.
    pub range_volts: f64,
    /// Requested data rate in samples per second; rounded down.
    pub data_rate_sps: f64,
    /// `true` for single-shot, `false` for continuous conversion.
    pub single_shot: bool,
    /// DOUT pull-up enable.
    pub pull_up: bool,
    /// Step the per-channel range after each read.
    pub autorange: bool,
    /// Lower bound on the post-trigger wait.  The data-rate derived wait is
    /// used when it is longer.
    pub settle_floor: Duration,
    /// How long a die temperature stays valid for
    /// [`Ads1118::internal_temperature`].  Zero converts on every call.
    pub internal_temperature_max_age: Duration,
}

impl Default for Ads1118Config {
    fn default() -> Self {
        Self {
            channel: Mux::Ain01,
            range_volts: 2.048,
            data_rate_sps: 860.0,
            single_shot: true,
            pull_up: false,
            autorange: true,
            settle_floor: Duration::ZERO,
            internal_temperature_max_age: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct Ads1118<SPI, D> {
    spi: SPI,
    delay: D,
    cfg: Ads1118Config,
    rate: DataRate,
    /// Current range per multiplexer setting.  Only autoranging mutates it.
    ranges: [FullScale; 8],
    last_word: Option<[u8; 2]>,
    /// Last die temperature and the controller time it was converted at.
    die_cache: Option<(Duration, f64)>,
}

impl<SPI: SpiDevice, D: DelayNs> Ads1118<SPI, D> {
    /// Check the bus against the chip's limits and write the initial
    /// configuration.
    pub fn new(spi: SPI, delay: D, bus: BusSettings, cfg: Ads1118Config) -> Result<Self> {
        bus.check_clock(MIN_CLOCK_HZ, MAX_CLOCK_HZ, "ads1118: SPI clock outside 17.9 Hz..4 MHz")?;
        if bus.mode != MODE_1 {
            return Err(Error::InvalidParameter("ads1118: SPI mode must be 1"));
        }
        let mut dev = Self {
            spi,
            delay,
            cfg,
            rate: DataRate::Sps860,
            ranges: [FullScale::V2_048; 8],
            last_word: None,
            die_cache: None,
        };
        dev.configure(cfg)?;
        Ok(dev)
    }

    /// Apply a new configuration.  Resets every channel's range to the
    /// requested one.
    pub fn configure(&mut self, cfg: Ads1118Config) -> Result<()> {
        self.rate = DataRate::coerce(cfg.data_rate_sps);
        self.ranges = [FullScale::coerce(cfg.range_volts); 8];
        self.cfg = cfg;
        self.die_cache = None;
        debug!(
            "ads1118: channel {} range {} V rate {} SPS single_shot={}",
            cfg.channel.label(),
            self.ranges[0].volts(),
            self.rate.sps(),
            cfg.single_shot
        );
        self.write_config(cfg.channel, false, false)
    }

    /// Convert `channel` and return the input voltage.
    pub fn read(&mut self, channel: Mux) -> Result<f64> {
        loop {
            let range = self.ranges[usize::from(channel.code())];
            let raw = self.convert(channel, false)?;
            let volts = f64::from(raw) * range.volts() / 32768.0;

            if !self.cfg.autorange {
                return Ok(volts);
            }
            let fraction = volts.abs() / range.volts();
            if fraction < FINER_BELOW {
                if let Some(finer) = range.finer() {
                    debug!("ads1118: {} autorange {} -> {} V", channel.label(), range.volts(), finer.volts());
                    self.ranges[usize::from(channel.code())] = finer;
                }
            } else if fraction > COARSER_ABOVE {
                if let Some(coarser) = range.coarser() {
                    debug!("ads1118: {} autorange {} -> {} V", channel.label(), range.volts(), coarser.volts());
                    self.ranges[usize::from(channel.code())] = coarser;
                    if i32::from(raw).abs() >= SATURATED {
                        continue;
                    }
                }
            }
            return Ok(volts);
        }
    }

    /// Read the die temperature in °C.  Never autoranged.
    pub fn read_internal_temperature(&mut self) -> Result<f64> {
        let channel = self.cfg.channel;
        let raw = self.convert(channel, true)?;
        Ok(f64::from(raw >> 2) * ITS_DEG_PER_LSB)
    }

    /// Die temperature at controller time `now`.  A fresh conversion (mux
    /// switch plus settle wait) runs only once the cached value is older
    /// than `internal_temperature_max_age`.
    pub fn internal_temperature(&mut self, now: Duration) -> Result<f64> {
        if let Some((at, celsius)) = self.die_cache {
            if now >= at && now - at < self.cfg.internal_temperature_max_age {
                return Ok(celsius);
            }
        }
        let celsius = self.read_internal_temperature()?;
        self.die_cache = Some((now, celsius));
        Ok(celsius)
    }

    /// Range currently used for `channel`.
    pub fn range(&self, channel: Mux) -> FullScale {
        self.ranges[usize::from(channel.code())]
    }

    pub fn data_rate(&self) -> DataRate {
        self.rate
    }

    pub fn config(&self) -> &Ads1118Config {
        &self.cfg
    }

    /// Hand back the bus and delay.
    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    // -- internal -----------------------------------------------------------

    fn convert(&mut self, channel: Mux, its: bool) -> Result<i16> {
        self.write_config(channel, its, self.cfg.single_shot)?;
        let mut buf = [0u8; 4];
        self.spi.transfer_in_place(&mut buf).map_err(error::bus)?;
        Ok(i16::from_be_bytes([buf[0], buf[1]]))
    }

    fn command_word(&self, channel: Mux, its: bool, start: bool) -> [u8; 2] {
        let range = self.ranges[usize::from(channel.code())];
        let msb = (u8::from(start) << 7)
            | (channel.code() << 4)
            | (range.code() << 1)
            | u8::from(self.cfg.single_shot);
        let lsb = (self.rate.code() << 5)
            | (u8::from(its) << 4)
            | (u8::from(self.cfg.pull_up) << 3)
            | 0b011;
        [msb, lsb]
    }

    fn write_config(&mut self, channel: Mux, its: bool, mut start: bool) -> Result<()> {
        if start && !self.cfg.single_shot {
            warn!("ads1118: single-shot trigger requested in continuous mode, ignored");
            start = false;
        }
        let word = self.command_word(channel, its, start);
        if !start && self.last_word == Some(word) {
            return Ok(());
        }

        let mut buf = [word[0], word[1], 0, 0];
        self.spi.transfer_in_place(&mut buf).map_err(error::bus)?;
        debug!("ads1118: wrote {:02X}{:02X}, echo {:02X}{:02X}", word[0], word[1], buf[2], buf[3]);
        if buf[2] | (u8::from(start) << 7) != word[0] || buf[3] | 0b1 != word[1] {
            self.last_word = None;
            return Err(Error::Protocol("ads1118: configuration echo mismatch"));
        }
        self.last_word = Some(word);

        let wait = self.rate.settle_time().max(self.cfg.settle_floor);
        self.delay.delay_ns(secs_to_ns(wait.as_secs_f64()));
        Ok(())
    }
}

#[cfg(test)]
impl<D> Ads1118<sim::SimAds1118, D> {
    pub(crate) fn sim_mut(&mut self) -> &mut sim::SimAds1118 {
        &mut self.spi
    }
}
