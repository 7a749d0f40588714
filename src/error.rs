//! Unified error types for the smoker controller.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! control loop's error handling uniform.  All variants are `Copy` so they
//! can be passed through the safety supervisor, the FSM and the probe layer
//! without allocation.

use core::fmt;

use embedded_hal::digital;
use embedded_hal::spi;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the controller core funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A configuration request is structurally impossible (unknown channel
    /// code, unsupported bus mode, inconsistent config value).  Never coerced.
    InvalidParameter(&'static str),
    /// The device echoed a configuration that differs from what was sent, or
    /// returned a frame that cannot occur.
    Protocol(&'static str),
    /// The SPI transport reported a failure.
    Bus(spi::ErrorKind),
    /// A GPIO pin (relay output) reported a failure.
    Pin(digital::ErrorKind),
    /// The device or the conversion reported a fault.  Non-fatal at read time.
    SensorFault(SensorFault),
    /// The requested conversion has no implementation (thermistor probes).
    Unsupported(&'static str),
    /// A safety interlock fired.
    SafetyInterlock(SafetyFault),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Bus(kind) => write!(f, "bus: {kind}"),
            Self::Pin(kind) => write!(f, "pin: {kind}"),
            Self::SensorFault(e) => write!(f, "sensor fault: {e}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::SafetyInterlock(e) => write!(f, "safety interlock: {e}"),
        }
    }
}

impl core::error::Error for Error {}

/// Map any SPI device error onto its portable kind.
pub(crate) fn bus<E: spi::Error>(e: E) -> Error {
    Error::Bus(e.kind())
}

/// Map any GPIO error onto its portable kind.
pub(crate) fn pin<E: digital::Error>(e: E) -> Error {
    Error::Pin(e.kind())
}

// ---------------------------------------------------------------------------
// Sensor faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// RTD digitizer fault status register contents.
    Rtd(crate::drivers::max31865::RtdFaultSet),
    /// The electrical quantity lies outside the conversion's valid domain.
    OutOfRange,
    /// No reading has been taken yet.
    NoReading,
}

impl fmt::Display for SensorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtd(set) => write!(f, "RTD fault {set}"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::NoReading => write!(f, "no reading available"),
        }
    }
}

impl From<SensorFault> for Error {
    fn from(e: SensorFault) -> Self {
        Self::SensorFault(e)
    }
}

// ---------------------------------------------------------------------------
// Safety faults
// ---------------------------------------------------------------------------

/// Safety faults are accumulated in a bitfield by the safety supervisor.
/// Any set bit forces the FSM into `Shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SafetyFault {
    /// The igniter has been energised continuously past its ceiling.
    IgniterTimeout = 0b0000_0001,
}

impl SafetyFault {
    pub const ALL: [Self; 1] = [Self::IgniterTimeout];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SafetyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IgniterTimeout => write!(f, "igniter on-time exceeded"),
        }
    }
}

impl From<SafetyFault> for Error {
    fn from(e: SafetyFault) -> Self {
        Self::SafetyInterlock(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
