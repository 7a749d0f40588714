//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade.  A display or MQTT adapter would implement the same
//! trait.

use log::info;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

fn onoff(on: bool) -> &'static str {
    if on { "ON" } else { "off" }
}

/// Adapter that logs every [`AppEvent`] to the console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                let s = &t.state;
                info!(
                    "TELEM | t={:.0}s mode={} | T={:.1}/{:.1} meat={:.1} | u={:.2} pmode={} | \
                     auger={} fan={} igniter={} | faults=0b{:08b} stale={}",
                    t.time,
                    s.mode,
                    s.primary.unwrap_or(f64::NAN),
                    s.target,
                    s.meat.unwrap_or(f64::NAN),
                    s.u,
                    s.pmode,
                    onoff(s.relays.auger),
                    onoff(s.relays.fan),
                    onoff(s.relays.igniter),
                    s.faults,
                    s.stale_probes,
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {from} -> {to}");
            }
            AppEvent::FaultDetected { flags, cause } => {
                info!("FAULT | {cause}, flags=0b{flags:08b}");
            }
            AppEvent::FaultCleared => {
                info!("FAULT | all cleared");
            }
            AppEvent::ProgramAdvanced { mode, target, remaining } => {
                info!("PROG  | step {mode} @ {target:.1}, {remaining} left");
            }
            AppEvent::ProgramFinished => {
                info!("PROG  | finished");
            }
            AppEvent::Started(mode) => {
                info!("START | initial_mode={mode}");
            }
        }
    }
}
