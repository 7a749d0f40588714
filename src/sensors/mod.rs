//! Sensor subsystem: signal sources, probe physics and the sampling hub.
//!
//! ```text
//!  driver ──▶ SignalSource ──▶ Probe (RTD / thermocouple) ──▶ ProbeSet ──▶ FSM
//!              volts/ohms/°C       °C, then display unit      rate-limited
//! ```
//!
//! All physics happens in °C; conversion to the display unit is done once,
//! at [`Probe::read`].

pub mod hub;
pub mod nist;
pub mod rtd;
pub mod sources;
pub mod thermocouple;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, SensorFault};
pub use rtd::RtdType;
pub use thermocouple::ThermocoupleType;

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Celsius,
    #[default]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Express a °C value in this unit.
    pub fn convert(self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            Self::Celsius => value,
            Self::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Signal sources
// ---------------------------------------------------------------------------

/// The electrical (or already-thermal) quantity a source produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Volts(f64),
    Ohms(f64),
    Celsius(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Volts,
    Ohms,
    Celsius,
}

impl Signal {
    pub const fn kind(&self) -> SignalKind {
        match self {
            Self::Volts(_) => SignalKind::Volts,
            Self::Ohms(_) => SignalKind::Ohms,
            Self::Celsius(_) => SignalKind::Celsius,
        }
    }
}

/// Anything a probe can sample: a driver channel, a die sensor, a fixture.
pub trait SignalSource {
    /// What [`sample`](Self::sample) returns.  Fixed for the source's life.
    fn kind(&self) -> SignalKind;

    fn sample(&mut self) -> Result<Signal>;

    /// Fault latched by the most recent sample, if the device reports them.
    fn fault(&self) -> Option<SensorFault> {
        None
    }
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeKind {
    Rtd(RtdType),
    Thermocouple(ThermocoupleType),
    /// Reserved; reads are `Unsupported`.
    Thermistor,
}

/// A named temperature probe: a conversion bound to its signal source(s).
pub struct Probe {
    name: String,
    kind: ProbeKind,
    source: Box<dyn SignalSource>,
    cold_junction: Option<Box<dyn SignalSource>>,
}

impl core::fmt::Debug for Probe {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("cold_junction", &self.cold_junction.is_some())
            .finish_non_exhaustive()
    }
}

impl Probe {
    /// Bind a conversion to its sources.  A thermocouple needs a
    /// cold-junction source that yields a temperature.
    pub fn new(
        name: impl Into<String>,
        kind: ProbeKind,
        source: Box<dyn SignalSource>,
        cold_junction: Option<Box<dyn SignalSource>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidParameter("probe name empty"));
        }
        match kind {
            ProbeKind::Rtd(rtd) => {
                if source.kind() != SignalKind::Ohms {
                    return Err(Error::InvalidParameter("RTD probe needs a resistance source"));
                }
                if !(rtd.r0().is_finite() && rtd.r0() > 0.0) {
                    return Err(Error::InvalidParameter("RTD R0 must be positive"));
                }
            }
            ProbeKind::Thermocouple(_) => {
                if source.kind() != SignalKind::Volts {
                    return Err(Error::InvalidParameter("thermocouple probe needs a voltage source"));
                }
                match &cold_junction {
                    Some(cj) if cj.kind() == SignalKind::Celsius => {}
                    Some(_) => {
                        return Err(Error::InvalidParameter("cold-junction source must yield a temperature"));
                    }
                    None => return Err(Error::InvalidParameter("thermocouple probe needs a cold-junction source")),
                }
            }
            ProbeKind::Thermistor => {}
        }
        Ok(Self {
            name,
            kind,
            source,
            cold_junction,
        })
    }

    pub fn rtd(name: impl Into<String>, rtd: RtdType, source: Box<dyn SignalSource>) -> Result<Self> {
        Self::new(name, ProbeKind::Rtd(rtd), source, None)
    }

    pub fn thermocouple(
        name: impl Into<String>,
        tc: ThermocoupleType,
        source: Box<dyn SignalSource>,
        cold_junction: Box<dyn SignalSource>,
    ) -> Result<Self> {
        Self::new(name, ProbeKind::Thermocouple(tc), source, Some(cold_junction))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Temperature in °C.
    pub fn read_celsius(&mut self) -> Result<f64> {
        match self.kind {
            ProbeKind::Rtd(rtd) => match self.source.sample()? {
                Signal::Ohms(ohms) => rtd.to_celsius(ohms),
                _ => Err(Error::Protocol("RTD source returned a non-resistance signal")),
            },
            ProbeKind::Thermocouple(tc) => {
                let Some(cj) = self.cold_junction.as_mut() else {
                    return Err(Error::InvalidParameter("thermocouple probe needs a cold-junction source"));
                };
                let Signal::Celsius(cj_c) = cj.sample()? else {
                    return Err(Error::Protocol("cold-junction source returned a non-temperature signal"));
                };
                match self.source.sample()? {
                    Signal::Volts(v) => Ok(tc.compensate(v, cj_c)),
                    _ => Err(Error::Protocol("thermocouple source returned a non-voltage signal")),
                }
            }
            ProbeKind::Thermistor => Err(Error::Unsupported("thermistor conversion")),
        }
    }

    /// Temperature in `unit`.
    pub fn read(&mut self, unit: TemperatureUnit) -> Result<f64> {
        self.read_celsius().map(|c| unit.convert(c))
    }

    /// Fault latched by either source on the last read.
    pub fn fault(&self) -> Option<SensorFault> {
        self.source
            .fault()
            .or_else(|| self.cold_junction.as_ref().and_then(|cj| cj.fault()))
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------
