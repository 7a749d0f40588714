//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (relay outputs, clock, event sinks, the remote backend)
//! implement these traits.  The [`AppService`](super::service::AppService)
//! and the runner consume them via generics, so the domain core never
//! touches hardware directly.

use core::time::Duration;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::program::{ProgramStep, Steps};
use crate::relays::Relay;
use crate::sensors::hub::TemperatureSample;

use super::channels::{ControlRecord, ParameterSnapshot};

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the three power relays.
pub trait RelayPort {
    fn set(&mut self, relay: Relay, on: bool) -> Result<()>;

    /// Logical state as the output currently drives it.
    fn get(&mut self, relay: Relay) -> Result<bool>;

    /// De-energise every relay.  Must attempt all of them even if one fails.
    fn all_off(&mut self) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time and the loop's sleep.
pub trait Clock {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Backend port (remote parameter / telemetry store)
// ───────────────────────────────────────────────────────────────

/// Remote store for parameters, temperatures, control telemetry and cook
/// programs.  Failures are heterogeneous (network, auth, encoding), so the
/// port speaks `anyhow`; the worker logs them and carries on.
pub trait Backend {
    fn post_temperature_sample(&mut self, target: f64, sample: &TemperatureSample) -> anyhow::Result<()>;

    /// Current parameter mapping (see
    /// [`parse_parameters`](super::commands::parse_parameters)).
    fn read_parameters(&mut self) -> anyhow::Result<Map<String, Value>>;

    fn write_parameters(&mut self, params: &ParameterSnapshot) -> anyhow::Result<()>;

    fn write_control_telemetry(&mut self, record: &ControlRecord) -> anyhow::Result<()>;

    /// The stored program, if program execution is `active` and one exists.
    fn read_program(&mut self, active: bool) -> anyhow::Result<Option<Steps>>;

    fn write_program(&mut self, steps: &[ProgramStep]) -> anyhow::Result<()>;
}
