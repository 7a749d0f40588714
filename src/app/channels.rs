//! Queues between the control loop and its collaborators.
//!
//! Uses `embassy-sync` bounded channels so the display and backend threads
//! never share state with the control loop directly, and nothing in the
//! loop blocks on them.
//!
//! ```text
//! ┌──────────────┐  ParameterChange  ┌──────────────┐  BackendRequest  ┌──────────────┐
//! │   Display    │──────────────────▶│ Control loop │─────────────────▶│   Backend    │
//! │              │◀──────────────────│   (sync)     │◀─────────────────│   worker     │
//! └──────────────┘   DisplayState    └──────────────┘  ParameterChange └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::warn;
use serde::Serialize;

use super::commands::{ChangeBatch, MAX_BATCH, ParameterChange};
use super::events::DisplayState;
use crate::control::pid::PidTelemetry;
use crate::fsm::SmokerMode;
use crate::program::Steps;
use crate::relays::RelayStates;
use crate::sensors::hub::TemperatureSample;

/// Channel depth for inbound parameter changes.
pub const CHANGE_DEPTH: usize = MAX_BATCH;

/// Channel depth for outbound backend requests.
pub const BACKEND_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// The controller's parameters as published to the backend.  Field names
/// match the keys [`parse_parameters`](super::commands::parse_parameters)
/// accepts, so a snapshot read back re-applies the same values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    pub mode: SmokerMode,
    pub target: f64,
    #[serde(rename = "PB")]
    pub pb: f64,
    #[serde(rename = "Ti")]
    pub ti: f64,
    #[serde(rename = "Td")]
    pub td: f64,
    #[serde(rename = "PMode")]
    pub pmode: f64,
    #[serde(rename = "CycleTime")]
    pub cycle_secs: f64,
    pub u: f64,
    pub program: bool,
    #[serde(flatten)]
    pub relays: RelayStates,
}

/// PID internals after one Hold update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlRecord {
    /// Seconds since the controller started.
    pub time: f64,
    /// Clamped duty ratio actually applied.
    pub u: f64,
    #[serde(flatten)]
    pub pid: PidTelemetry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendRequest {
    PostTemperatures(TemperatureSample),
    WriteParameters(ParameterSnapshot),
    WriteControl(ControlRecord),
    WriteProgram(Steps),
    /// Fetch the stored program and deliver it as `LoadProgram`.
    ReadProgram,
}

impl BackendRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PostTemperatures(_) => "PostTemperatures",
            Self::WriteParameters(_) => "WriteParameters",
            Self::WriteControl(_) => "WriteControl",
            Self::WriteProgram(_) => "WriteProgram",
            Self::ReadProgram => "ReadProgram",
        }
    }
}

// ---------------------------------------------------------------------------
// Channel set
// ---------------------------------------------------------------------------

/// Every queue the control loop exchanges messages through.  `const`
/// constructible, so it can live in a `static`.
pub struct SmokerChannels {
    /// Inbound: display and backend worker → control loop.
    pub changes: Channel<CriticalSectionRawMutex, ParameterChange, CHANGE_DEPTH>,
    /// Outbound: control loop → backend worker.
    pub backend: Channel<CriticalSectionRawMutex, BackendRequest, BACKEND_DEPTH>,
    /// Latest display snapshot; older ones are overwritten.
    pub display: Signal<CriticalSectionRawMutex, DisplayState>,
}

impl Default for SmokerChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl SmokerChannels {
    pub const fn new() -> Self {
        Self {
            changes: Channel::new(),
            backend: Channel::new(),
            display: Signal::new(),
        }
    }

    /// Queue a parameter change.  Returns `false` (and logs) if the queue
    /// is full.
    pub fn submit(&self, change: ParameterChange) -> bool {
        match self.changes.try_send(change) {
            Ok(()) => true,
            Err(_) => {
                warn!("parameter queue full, dropping change");
                false
            }
        }
    }

    /// Take every queued change, oldest first.
    pub fn drain_changes(&self) -> ChangeBatch {
        let mut batch = ChangeBatch::new();
        while !batch.is_full() {
            let Ok(change) = self.changes.try_receive() else {
                break;
            };
            // Capacity checked by the loop condition.
            let _ = batch.push(change);
        }
        batch
    }

    /// Queue a backend request, dropping it with a warning if the worker
    /// has fallen behind.
    pub fn request(&self, request: BackendRequest) {
        if let Err(e) = self.backend.try_send(request) {
            let embassy_sync::channel::TrySendError::Full(request) = e;
            warn!("backend queue full, dropping {}", request.name());
        }
    }

    pub fn next_request(&self) -> Option<BackendRequest> {
        self.backend.try_receive().ok()
    }

    pub fn publish_display(&self, state: DisplayState) {
        self.display.signal(state);
    }

    /// Latest display snapshot not yet taken.
    pub fn take_display(&self) -> Option<DisplayState> {
        self.display.try_take()
    }
}
