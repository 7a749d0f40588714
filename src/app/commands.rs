//! Inbound parameter changes.
//!
//! These are requested by the outside world (the display's buttons, the
//! remote backend) and delivered to the [`AppService`](super::service::AppService)
//! through the inbound queue.  The service drains them once per tick and
//! applies the whole batch before any side effect runs.

use heapless::Vec;
use log::warn;
use serde_json::{Map, Value};

use crate::fsm::SmokerMode;
use crate::program::Steps;

/// Largest batch applied in one tick.  Equal to the inbound queue depth.
pub const MAX_BATCH: usize = 16;

pub type ChangeBatch = Vec<ParameterChange, MAX_BATCH>;

/// Commands that collaborators can send into the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterChange {
    Mode(SmokerMode),
    /// Absolute set point, display unit.
    Target(f64),
    /// Nudge the set point (display up/down buttons).
    TargetStep(f64),
    PMode(f64),
    /// Nudge PMode (display up/down buttons in Smoke).
    PModeStep(f64),
    /// Proportional band.
    Pb(f64),
    /// Integral time, seconds.
    Ti(f64),
    /// Derivative time, seconds.
    Td(f64),
    /// Enable or disable cook-program execution.
    ProgramEnabled(bool),
    /// Replace the cook program and start it.
    LoadProgram(Steps),
}

/// Keys the controller publishes but never accepts back.
const READ_ONLY_KEYS: [&str; 5] = ["CycleTime", "u", "auger", "fan", "igniter"];

/// Translate a parameter mapping (`mode`, `target`, `PB`, `Ti`, `Td`,
/// `PMode`, `program`) into changes.  Unknown keys and malformed values are
/// skipped with a warning; the controller's own read-only keys silently.
pub fn parse_parameters(map: &Map<String, Value>) -> ChangeBatch {
    let mut batch = ChangeBatch::new();
    for (key, value) in map {
        let change = match key.as_str() {
            "mode" => value
                .as_str()
                .and_then(|s| s.parse().ok())
                .map(ParameterChange::Mode),
            "target" => number(value).map(ParameterChange::Target),
            "PB" => number(value).map(ParameterChange::Pb),
            "Ti" => number(value).map(ParameterChange::Ti),
            "Td" => number(value).map(ParameterChange::Td),
            "PMode" => number(value).map(ParameterChange::PMode),
            "program" => flag(value).map(ParameterChange::ProgramEnabled),
            k if READ_ONLY_KEYS.contains(&k) => continue,
            _ => {
                warn!("ignoring unknown parameter {key:?}");
                continue;
            }
        };
        match change {
            Some(change) => {
                if batch.push(change).is_err() {
                    warn!("parameter batch full, dropping {key:?}");
                }
            }
            None => warn!("ignoring malformed parameter {key:?}: {value}"),
        }
    }
    batch
}

/// A JSON number, or a string holding one.
fn number(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    v.filter(|v| v.is_finite())
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}
