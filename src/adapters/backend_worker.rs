//! Backend worker: the only code that talks to the remote store.
//!
//! Runs outside the control loop.  Each poll it drains the outbound
//! request queue into the [`Backend`], then, on its own timers, reads the
//! parameter mapping (every 3 s) and the stored program (every 60 s while a
//! program is running) and feeds what changed back through the inbound
//! queue.  Backend failures are logged and dropped; none reaches the loop.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::app::channels::{BackendRequest, SmokerChannels};
use crate::app::commands::{ParameterChange, parse_parameters};
use crate::app::ports::{Backend, Clock};
use crate::program::Steps;

pub const PARAMETER_POLL: Duration = Duration::from_secs(3);
pub const PROGRAM_POLL: Duration = Duration::from_secs(60);

pub struct BackendWorker<B> {
    backend: B,
    parameter_poll: Duration,
    program_poll: Duration,
    last_parameter_read: Option<Duration>,
    last_program_read: Option<Duration>,
    /// Parameter values as last written or read.  Only keys that differ from
    /// these are forwarded, so a stale remote copy cannot undo a local change.
    known: Map<String, Value>,
    program_active: bool,
}

impl<B: Backend> BackendWorker<B> {
    pub fn new(backend: B) -> Self {
        Self::with_intervals(backend, PARAMETER_POLL, PROGRAM_POLL)
    }

    pub fn with_intervals(backend: B, parameter_poll: Duration, program_poll: Duration) -> Self {
        Self {
            backend,
            parameter_poll,
            program_poll,
            last_parameter_read: None,
            last_program_read: None,
            known: Map::new(),
            program_active: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// One pass: flush outbound requests, then any reads that are due.
    pub fn poll(&mut self, now: Duration, channels: &SmokerChannels) {
        while let Some(request) = channels.next_request() {
            self.handle(request, channels);
        }

        if due(self.last_parameter_read, now, self.parameter_poll) {
            self.last_parameter_read = Some(now);
            self.read_parameters(channels);
        }

        if !self.program_active {
            self.last_program_read = None;
        } else if self.last_program_read.is_none() {
            // Just started: the running program came from the backend.
            self.last_program_read = Some(now);
        } else if due(self.last_program_read, now, self.program_poll) {
            self.last_program_read = Some(now);
            self.fetch_program(channels);
        }
    }

    /// Poll every `period` until `stop` is set.
    pub fn run(&mut self, clock: &impl Clock, channels: &SmokerChannels, stop: &AtomicBool, period: Duration) {
        info!("Backend worker running");
        while !stop.load(Ordering::Relaxed) {
            self.poll(clock.now(), channels);
            clock.sleep(period);
        }
        // Flush whatever the loop queued on its way out.
        while let Some(request) = channels.next_request() {
            self.handle(request, channels);
        }
        info!("Backend worker stopped");
    }

    fn handle(&mut self, request: BackendRequest, channels: &SmokerChannels) {
        let name = request.name();
        let result = match request {
            BackendRequest::PostTemperatures(sample) => self.backend.post_temperature_sample(sample.target, &sample),
            BackendRequest::WriteParameters(snapshot) => {
                self.program_active = snapshot.program;
                if let Ok(Value::Object(map)) = serde_json::to_value(snapshot) {
                    self.known.extend(map);
                }
                self.backend.write_parameters(&snapshot)
            }
            BackendRequest::WriteControl(record) => self.backend.write_control_telemetry(&record),
            BackendRequest::WriteProgram(steps) => self.backend.write_program(&steps),
            BackendRequest::ReadProgram => {
                self.fetch_program(channels);
                Ok(())
            }
        };
        match result {
            Ok(()) => debug!("backend {name} ok"),
            Err(e) => warn!("backend {name} failed: {e:#}"),
        }
    }

    fn read_parameters(&mut self, channels: &SmokerChannels) {
        let map = match self.backend.read_parameters() {
            Ok(map) => map,
            Err(e) => {
                warn!("backend read_parameters failed: {e:#}");
                return;
            }
        };
        let mut changed = Map::new();
        for (key, value) in map {
            if self.known.get(&key) != Some(&value) {
                self.known.insert(key.clone(), value.clone());
                changed.insert(key, value);
            }
        }
        if changed.is_empty() {
            return;
        }
        debug!("backend parameters changed: {changed:?}");
        for change in parse_parameters(&changed) {
            channels.submit(change);
        }
    }

    fn fetch_program(&mut self, channels: &SmokerChannels) {
        match self.backend.read_program(true) {
            Ok(Some(steps)) => {
                channels.submit(ParameterChange::LoadProgram(steps));
            }
            Ok(None) => {
                info!("No stored program");
                channels.submit(ParameterChange::LoadProgram(Steps::new()));
            }
            Err(e) => warn!("backend read_program failed: {e:#}"),
        }
    }
}

fn due(last: Option<Duration>, now: Duration, interval: Duration) -> bool {
    last.is_none_or(|t| now.saturating_sub(t) >= interval)
}
