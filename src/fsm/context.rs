//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that mode handlers read from and
//! write to: the latest temperatures, the relay bank, the duty-cycle
//! parameters, the PID, configuration and the safety fault mask.  It is
//! the "blackboard" the service fills before each tick and reads after.

use core::time::Duration;

use crate::config::SmokerConfig;
use crate::control::pid::{PidController, PidGains};
use crate::error::{Result, SafetyFault};
use crate::relays::RelayBank;

// ---------------------------------------------------------------------------
// Temperature snapshot (read-only to handlers; written by the service)
// ---------------------------------------------------------------------------

/// Temperatures in the display unit.  `None` until the probe has produced
/// a first reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    /// Latest primary (grill) probe value.
    pub primary: Option<f64>,
    /// Mean of the primary probe since the last PID update.
    pub primary_average: Option<f64>,
    /// Latest meat probe value.
    pub meat: Option<f64>,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

pub struct FsmContext {
    // -- Timing --
    /// Controller time for this tick.
    pub now: Duration,

    // -- Inputs --
    pub readings: Readings,

    // -- Outputs --
    pub relays: RelayBank,
    /// Auger cycle length in seconds.
    pub cycle_secs: f64,
    /// Auger duty ratio in [0, 1].
    pub u: f64,
    /// Set by Hold when the PID ran this tick.  Cleared by the service.
    pub pid_updated: bool,

    // -- Control --
    pub pmode: f64,
    pub pid: PidController,

    // -- Configuration --
    pub config: SmokerConfig,

    // -- Safety --
    /// Accumulated safety fault bitmask (see `SafetyFault::mask()`).
    pub fault_flags: u8,
}

impl FsmContext {
    /// Build a context from configuration.  Relays start off at `now`.
    pub fn new(config: SmokerConfig, now: Duration) -> Self {
        let mut pid = PidController::new(
            PidGains {
                pb: config.pb,
                ti: config.ti_secs,
                td: config.td_secs,
            },
            config.pid_bias,
            config.integral_limit,
            config.target,
        );
        pid.set_output_limits(config.u_min, config.u_max);

        Self {
            now,
            readings: Readings::default(),
            relays: RelayBank::new(now),
            cycle_secs: config.pid_cycle_secs,
            u: config.u_min,
            pid_updated: false,
            pmode: config.pmode,
            pid,
            config,
            fault_flags: 0,
        }
    }

    /// Cycle length and duty ratio for the fixed-feed modes at the current
    /// PMode: `on` seconds of feed, then the base off-time stretched by
    /// `pmode_step` per level.
    pub fn fixed_feed_cycle(&self) -> (f64, f64) {
        let on = self.config.auger_on_secs;
        let off = self.config.auger_off_secs + self.pmode * self.config.pmode_step_secs;
        let cycle = on + off;
        (cycle, on / cycle)
    }

    /// Check whether a specific fault flag is set.
    pub fn has_fault(&self, fault: SafetyFault) -> bool {
        self.fault_flags & fault.mask() != 0
    }

    /// `Err(SafetyInterlock)` naming the first active fault while any
    /// interlock holds the smoker down.
    pub fn interlock(&self) -> Result<()> {
        match SafetyFault::ALL.into_iter().find(|f| self.has_fault(*f)) {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }

    /// The set point in force.
    pub fn target(&self) -> f64 {
        self.pid.target()
    }
}
