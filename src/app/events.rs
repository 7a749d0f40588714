//! Outbound application events and the display snapshot.
//!
//! The [`AppService`](super::service::AppService) emits events through the
//! [`EventSink`](super::ports::EventSink) port and publishes a
//! [`DisplayState`] every tick.  Adapters decide where they go.

use serde::Serialize;

use crate::error::Error;
use crate::fsm::SmokerMode;
use crate::relays::RelayStates;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A probe sample was taken.
    Telemetry(TelemetryData),

    /// The smoker changed mode.
    StateChanged { from: SmokerMode, to: SmokerMode },

    /// One or more safety faults were raised.  `flags` holds the new bits,
    /// `cause` the interlock error that forced the shutdown.
    FaultDetected { flags: u8, cause: Error },

    /// All safety faults have been cleared.
    FaultCleared,

    /// The cook program moved on to its next step.
    ProgramAdvanced {
        mode: SmokerMode,
        target: f64,
        remaining: usize,
    },

    /// The cook program ran out of steps.
    ProgramFinished,

    /// The service has started (carries the initial mode).
    Started(SmokerMode),
}

/// Everything the display shows.  Temperatures are in the display unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayState {
    pub mode: SmokerMode,
    pub target: f64,
    pub u: f64,
    pub pmode: f64,
    pub primary: Option<f64>,
    pub meat: Option<f64>,
    pub relays: RelayStates,
    /// Safety fault bitmask.
    pub faults: u8,
    /// Probes whose last read failed or faulted.
    pub stale_probes: u8,
    pub program_active: bool,
}

/// A point-in-time telemetry record, emitted when probes are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryData {
    /// Seconds since the controller started.
    pub time: f64,
    pub state: DisplayState,
}
