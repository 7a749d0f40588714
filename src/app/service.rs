//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, safety supervisor, probe set, cook program
//! and the shared context.  All I/O flows through ports injected at call
//! sites, making the whole service testable with mock adapters.
//!
//! ```text
//!  ProbeSet ──▶ ┌──────────────────────────────┐ ──▶ RelayPort
//!               │          AppService          │
//!  changes  ──▶ │ batch · program · safety · FSM│ ──▶ EventSink
//!               └──────────────────────────────┘ ──▶ backend queue / display
//! ```
//!
//! One tick, strictly in this order:
//!
//! 1. sample probes (rate limited) and refresh the readings;
//! 2. drain the inbound queue and apply the batch, side effects once;
//! 3. evaluate program triggers;
//! 4. safety interlocks, which override everything above;
//! 5. FSM tick;
//! 6. mirror the relay bank onto the relay port;
//! 7. publish events, backend requests and the display snapshot.

use core::time::Duration;

use log::{error, info, warn};

use crate::config::SmokerConfig;
use crate::control::pid::PidGains;
use crate::error::{Error, Result, SafetyFault};
use crate::fsm::context::{FsmContext, Readings};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, SmokerMode};
use crate::program::{Advance, Program, ProgramStep, Steps};
use crate::relays::{Relay, RelayStates};
use crate::safety::SafetySupervisor;
use crate::sensors::hub::ProbeSet;

use super::channels::{BackendRequest, ControlRecord, ParameterSnapshot, SmokerChannels};
use super::commands::{ChangeBatch, ParameterChange};
use super::events::{AppEvent, DisplayState, TelemetryData};
use super::ports::{EventSink, RelayPort};

/// Changes from one batch, merged before any of them takes effect.
#[derive(Default)]
struct Pending {
    mode: Option<SmokerMode>,
    target: Option<f64>,
    pmode: Option<f64>,
    gains: Option<PidGains>,
    program_enabled: Option<bool>,
    program: Option<Steps>,
}

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    safety: SafetySupervisor,
    probes: ProbeSet,
    program: Program,
    /// A program fetch has been requested and not yet answered or cancelled.
    program_requested: bool,
    /// What the relay port was last told, per relay.  `None` forces a write.
    applied: [Option<bool>; 3],
    tick_count: u64,
}

impl AppService {
    /// Construct the service.  The probe set must report in the configured
    /// unit and contain the primary probe.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: SmokerConfig, probes: ProbeSet, now: Duration) -> Result<Self> {
        config.validate()?;
        if probes.unit() != config.unit {
            return Err(Error::InvalidParameter("probe set unit differs from config unit"));
        }
        if !probes.contains(&config.primary_probe) {
            return Err(Error::InvalidParameter("primary probe not in probe set"));
        }
        let safety = SafetySupervisor::new(&config);
        let ctx = FsmContext::new(config, now);
        let fsm = Fsm::new(build_state_table(), SmokerMode::Off);

        Ok(Self {
            fsm,
            ctx,
            safety,
            probes,
            program: Program::new(),
            program_requested: false,
            applied: [None; 3],
            tick_count: 0,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter `Off`, drive every relay to match and announce the parameters.
    pub fn start(
        &mut self,
        now: Duration,
        relays: &mut impl RelayPort,
        sink: &mut impl EventSink,
        channels: &SmokerChannels,
    ) -> Result<()> {
        self.ctx.now = now;
        self.fsm.start(&mut self.ctx);
        self.apply_relays(relays)?;
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        channels.request(BackendRequest::WriteParameters(self.parameter_snapshot()));
        channels.publish_display(self.display_state());
        info!("AppService started in {}", self.fsm.current_state());
        Ok(())
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.  Fails only if the relay port does; the
    /// caller must then drive the relays off.
    pub fn tick(
        &mut self,
        now: Duration,
        relays: &mut impl RelayPort,
        sink: &mut impl EventSink,
        channels: &SmokerChannels,
    ) -> Result<()> {
        self.tick_count += 1;
        self.ctx.now = now;
        let prev_mode = self.fsm.current_state();
        let prev_relays = self.ctx.relays.states();
        let mut params_dirty = false;

        // 1. Sample
        let sampled = self.sample(channels);
        self.refresh_readings();

        // 2. Parameter batch
        let batch = channels.drain_changes();
        if !batch.is_empty() {
            params_dirty |= self.apply_batch(batch, sink, channels);
        }

        // 3. Program triggers
        params_dirty |= self.poll_program(sink, channels);

        // 4. Safety
        self.evaluate_safety(sink);

        // 5. FSM
        self.fsm.tick(&mut self.ctx);
        if self.ctx.pid_updated {
            self.ctx.pid_updated = false;
            channels.request(BackendRequest::WriteControl(ControlRecord {
                time: now.as_secs_f64(),
                u: self.ctx.u,
                pid: self.ctx.pid.telemetry(),
            }));
            params_dirty = true;
        }

        // 6. Relays
        self.apply_relays(relays)?;

        // 7. Publish
        let mode = self.fsm.current_state();
        if mode != prev_mode {
            sink.emit(&AppEvent::StateChanged {
                from: prev_mode,
                to: mode,
            });
        }
        if params_dirty || mode != prev_mode || self.ctx.relays.states() != prev_relays {
            channels.request(BackendRequest::WriteParameters(self.parameter_snapshot()));
        }
        let display = self.display_state();
        if sampled {
            sink.emit(&AppEvent::Telemetry(TelemetryData {
                time: now.as_secs_f64(),
                state: display,
            }));
        }
        channels.publish_display(display);
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn mode(&self) -> SmokerMode {
        self.fsm.current_state()
    }

    pub fn target(&self) -> f64 {
        self.ctx.target()
    }

    pub fn u(&self) -> f64 {
        self.ctx.u
    }

    pub fn cycle_secs(&self) -> f64 {
        self.ctx.cycle_secs
    }

    pub fn pmode(&self) -> f64 {
        self.ctx.pmode
    }

    pub fn gains(&self) -> PidGains {
        self.ctx.pid.gains()
    }

    pub fn relays(&self) -> RelayStates {
        self.ctx.relays.states()
    }

    pub fn readings(&self) -> Readings {
        self.ctx.readings
    }

    /// Current safety fault bitmask (0 = no faults).
    pub fn fault_flags(&self) -> u8 {
        self.ctx.fault_flags
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn probes(&self) -> &ProbeSet {
        &self.probes
    }

    pub fn config(&self) -> &SmokerConfig {
        &self.ctx.config
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn display_state(&self) -> DisplayState {
        DisplayState {
            mode: self.fsm.current_state(),
            target: self.ctx.target(),
            u: self.ctx.u,
            pmode: self.ctx.pmode,
            primary: self.ctx.readings.primary,
            meat: self.ctx.readings.meat,
            relays: self.ctx.relays.states(),
            faults: self.ctx.fault_flags,
            stale_probes: self.probes.active_faults().count() as u8,
            program_active: self.program.is_active(),
        }
    }

    pub fn parameter_snapshot(&self) -> ParameterSnapshot {
        let gains = self.ctx.pid.gains();
        ParameterSnapshot {
            mode: self.fsm.current_state(),
            target: self.ctx.target(),
            pb: gains.pb,
            ti: gains.ti,
            td: gains.td,
            pmode: self.ctx.pmode,
            cycle_secs: self.ctx.cycle_secs,
            u: self.ctx.u,
            program: self.program.is_active(),
            relays: self.ctx.relays.states(),
        }
    }

    // ── Internal: sampling ────────────────────────────────────

    /// Returns whether a sample was taken.
    fn sample(&mut self, channels: &SmokerChannels) -> bool {
        let target = self.ctx.target();
        match self.probes.sample_if_due(self.ctx.now, target) {
            Some(sample) => {
                channels.request(BackendRequest::PostTemperatures(sample.clone()));
                true
            }
            None => false,
        }
    }

    fn refresh_readings(&mut self) {
        let cfg = &self.ctx.config;
        let since = self.ctx.pid.last_update().unwrap_or(Duration::ZERO);
        // A probe with no value yet stays `None`; the gates hold their state.
        self.ctx.readings = Readings {
            primary: self.probes.reading(&cfg.primary_probe).ok(),
            primary_average: self.probes.average_since(&cfg.primary_probe, since),
            meat: self.probes.reading(&cfg.meat_probe).ok(),
        };
    }

    // ── Internal: parameter batch ─────────────────────────────

    /// Merge the batch, then run each side effect once: gains, PMode, mode,
    /// target, program.  Returns whether any parameter changed.
    fn apply_batch(&mut self, batch: ChangeBatch, sink: &mut impl EventSink, channels: &SmokerChannels) -> bool {
        let pending = self.merge(batch);
        let mut changed = false;

        if let Some(gains) = pending.gains
            && gains != self.ctx.pid.gains()
        {
            info!("New parameters: PB {} Ti {} Td {}", gains.pb, gains.ti, gains.td);
            self.ctx.pid.set_gains(gains);
            changed = true;
        }

        let mut reenter = false;
        if let Some(pmode) = pending.pmode
            && pmode != self.ctx.pmode
        {
            info!("New parameter: PMode {pmode} ({})", self.ctx.pmode);
            self.ctx.pmode = pmode;
            reenter = self.fsm.current_state().uses_pmode();
            changed = true;
        }

        match pending.mode {
            Some(mode) if mode != self.fsm.current_state() => {
                info!("New parameter: mode {mode} ({})", self.fsm.current_state());
                self.fsm.force_transition(mode, &mut self.ctx);
                changed = true;
            }
            _ if reenter => self.fsm.reenter(&mut self.ctx),
            _ => {}
        }

        if let Some(target) = pending.target
            && target != self.ctx.target()
        {
            info!("New parameter: target {target} ({})", self.ctx.target());
            self.ctx.pid.set_target(target);
            changed = true;
        }

        match pending.program_enabled {
            Some(true) if !self.program.is_active() && !self.program_requested => {
                info!("Program enabled, fetching program");
                self.program_requested = true;
                channels.request(BackendRequest::ReadProgram);
            }
            Some(false) => {
                self.program_requested = false;
                if self.program.is_active() {
                    self.program.stop();
                    changed = true;
                }
            }
            _ => {}
        }

        if let Some(steps) = pending.program {
            changed |= self.load_program(&steps, sink, channels);
        }

        changed
    }

    fn merge(&self, batch: ChangeBatch) -> Pending {
        let mut p = Pending::default();
        for change in batch {
            match change {
                ParameterChange::Mode(mode) => p.mode = Some(mode),
                ParameterChange::Target(t) => p.target = self.checked_target(t).or(p.target),
                ParameterChange::TargetStep(d) => {
                    let base = p.target.unwrap_or_else(|| self.ctx.target());
                    p.target = self.checked_target(base + d).or(p.target);
                }
                ParameterChange::PMode(v) => p.pmode = self.checked_pmode(v).or(p.pmode),
                ParameterChange::PModeStep(d) => {
                    let base = p.pmode.unwrap_or(self.ctx.pmode);
                    p.pmode = self.checked_pmode(base + d).or(p.pmode);
                }
                ParameterChange::Pb(pb) => {
                    if pb.is_finite() && pb > 0.0 {
                        p.gains = Some(PidGains { pb, ..self.pending_gains(&p) });
                    } else {
                        warn!("rejecting PB {pb}");
                    }
                }
                ParameterChange::Ti(ti) => {
                    if ti >= 0.0 {
                        p.gains = Some(PidGains { ti, ..self.pending_gains(&p) });
                    } else {
                        warn!("rejecting Ti {ti}");
                    }
                }
                ParameterChange::Td(td) => {
                    if td.is_finite() && td >= 0.0 {
                        p.gains = Some(PidGains { td, ..self.pending_gains(&p) });
                    } else {
                        warn!("rejecting Td {td}");
                    }
                }
                ParameterChange::ProgramEnabled(on) => p.program_enabled = Some(on),
                ParameterChange::LoadProgram(steps) => p.program = Some(steps),
            }
        }
        p
    }

    fn pending_gains(&self, p: &Pending) -> PidGains {
        p.gains.unwrap_or_else(|| self.ctx.pid.gains())
    }

    fn checked_target(&self, t: f64) -> Option<f64> {
        if t.is_finite() {
            Some(t)
        } else {
            warn!("rejecting target {t}");
            None
        }
    }

    fn checked_pmode(&self, v: f64) -> Option<f64> {
        if (0.0..=self.ctx.config.pmode_max).contains(&v) {
            Some(v)
        } else {
            warn!("rejecting PMode {v}: outside 0..={}", self.ctx.config.pmode_max);
            None
        }
    }

    // ── Internal: program ─────────────────────────────────────

    /// Replace the program and apply its first step.  A program identical to
    /// the running one is left alone.
    fn load_program(&mut self, steps: &[ProgramStep], sink: &mut impl EventSink, channels: &SmokerChannels) -> bool {
        self.program_requested = false;
        if self.program.is_active() && self.program.matches(steps) {
            return false;
        }
        let Some(first) = self.program.load(steps, self.ctx.now) else {
            info!("Empty program received, program disabled");
            return true;
        };
        self.apply_step(first);
        sink.emit(&AppEvent::ProgramAdvanced {
            mode: first.mode,
            target: first.target,
            remaining: self.program.len(),
        });
        channels.request(BackendRequest::WriteProgram(self.program.steps()));
        true
    }

    fn poll_program(&mut self, sink: &mut impl EventSink, channels: &SmokerChannels) -> bool {
        let meat = self.ctx.readings.meat;
        match self.program.poll(self.ctx.now, meat) {
            None => false,
            Some(Advance::Next(step)) => {
                self.apply_step(step);
                sink.emit(&AppEvent::ProgramAdvanced {
                    mode: step.mode,
                    target: step.target,
                    remaining: self.program.len(),
                });
                channels.request(BackendRequest::WriteProgram(self.program.steps()));
                true
            }
            Some(Advance::Finished) => {
                self.program_requested = false;
                sink.emit(&AppEvent::ProgramFinished);
                channels.request(BackendRequest::WriteProgram(Steps::new()));
                true
            }
        }
    }

    /// Set mode and target from a program step.  The mode is entered afresh
    /// even if it is already current.
    fn apply_step(&mut self, step: ProgramStep) {
        if step.mode == self.fsm.current_state() {
            self.fsm.reenter(&mut self.ctx);
        } else {
            self.fsm.force_transition(step.mode, &mut self.ctx);
        }
        self.ctx.pid.set_target(step.target);
    }

    // ── Internal: safety ──────────────────────────────────────

    fn evaluate_safety(&mut self, sink: &mut impl EventSink) {
        let before = self.ctx.fault_flags;
        let flags = self.safety.evaluate(&self.ctx.relays, self.ctx.now);
        self.ctx.fault_flags = flags;

        match self.ctx.interlock() {
            Err(cause) => {
                if self.ctx.has_fault(SafetyFault::IgniterTimeout) {
                    self.ctx.relays.set(Relay::Igniter, false, self.ctx.now);
                }
                self.program.stop();
                self.fsm.force_transition(SmokerMode::Shutdown, &mut self.ctx);

                let raised = flags & !before;
                if raised != 0 {
                    error!("{cause}: forcing Shutdown");
                    sink.emit(&AppEvent::FaultDetected { flags: raised, cause });
                }
            }
            Ok(()) if before != 0 => sink.emit(&AppEvent::FaultCleared),
            Ok(()) => {}
        }
    }

    // ── Internal: relays ──────────────────────────────────────

    /// Write every relay whose state differs from what the port last got.
    fn apply_relays(&mut self, port: &mut impl RelayPort) -> Result<()> {
        for relay in Relay::ALL {
            let on = self.ctx.relays.is_on(relay);
            let slot = &mut self.applied[relay as usize];
            if *slot != Some(on) {
                *slot = None;
                port.set(relay, on)?;
                *slot = Some(on);
            }
        }
        Ok(())
    }
}
