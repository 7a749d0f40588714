//! System configuration parameters
//!
//! All tunable parameters for the smoker controller.  Temperatures are in
//! the configured display unit (Fahrenheit by default); the thresholds below
//! must be expressed in that same unit.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sensors::TemperatureUnit;

/// Core controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokerConfig {
    // --- Units / probes ---
    /// Unit every temperature in the core is expressed in.
    pub unit: TemperatureUnit,
    /// Name of the probe that drives the control loop (grill air).
    pub primary_probe: String,
    /// Name of the probe used by meat-temperature program triggers.
    pub meat_probe: String,

    // --- Control ---
    /// Initial set point.
    pub target: f64,
    /// Proportional band (a divisor: larger is gentler).
    pub pb: f64,
    /// Integral time in seconds.  Zero or infinity disables integral action.
    pub ti_secs: f64,
    /// Derivative time in seconds.  Zero disables derivative action.
    pub td_secs: f64,
    /// Output offset applied at zero error (manual reset).
    pub pid_bias: f64,
    /// Largest magnitude the integral component may contribute.
    pub integral_limit: f64,
    /// Hold-mode cycle time, also the PID evaluation period (seconds).
    pub pid_cycle_secs: f64,
    /// Lower bound of the Hold-mode duty ratio (maintenance feed).
    pub u_min: f64,
    /// Upper bound of the Hold-mode duty ratio.
    pub u_max: f64,

    // --- Auger ---
    /// Auger on-time per cycle in the fixed-ratio modes (seconds).
    pub auger_on_secs: f64,
    /// Auger off-time per cycle before the PMode extension (seconds).
    pub auger_off_secs: f64,
    /// Extra off-time per PMode step (seconds).
    pub pmode_step_secs: f64,
    /// Initial smoke-density level.
    pub pmode: f64,
    /// Highest PMode the operator may select.
    pub pmode_max: f64,

    // --- Thresholds ---
    /// Primary-probe temperature below which the igniter is energised.
    pub igniter_temp: f64,
    /// Primary-probe temperature that ends the Start phase.
    pub startup_temp: f64,

    // --- Safety ---
    /// Fan run-on time after shutdown (seconds).
    pub shutdown_secs: f64,
    /// Hard ceiling on continuous igniter on-time (seconds).
    pub igniter_max_on_secs: f64,

    // --- Timing ---
    /// Control loop tick (milliseconds).
    pub tick_interval_ms: u32,
    /// Minimum time between probe samples (seconds).
    pub sample_interval_secs: f64,
    /// How long samples are kept for averaging (seconds).
    pub record_window_secs: f64,
}

impl Default for SmokerConfig {
    fn default() -> Self {
        Self {
            unit: TemperatureUnit::Fahrenheit,
            primary_probe: "grill".into(),
            meat_probe: "meat".into(),

            target: 225.0,
            pb: 60.0,
            ti_secs: 180.0,
            td_secs: 45.0,
            pid_bias: 0.5,
            integral_limit: 0.5,
            pid_cycle_secs: 20.0,
            u_min: 0.15,
            u_max: 1.0,

            auger_on_secs: 15.0,
            auger_off_secs: 45.0,
            pmode_step_secs: 10.0,
            pmode: 2.0,
            pmode_max: 9.0,

            igniter_temp: 100.0,
            startup_temp: 115.0,

            shutdown_secs: 600.0,
            igniter_max_on_secs: 1200.0,

            tick_interval_ms: 50,          // 20 Hz
            sample_interval_secs: 3.0,
            record_window_secs: 60.0,
        }
    }
}

impl SmokerConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|_| Error::InvalidParameter("config: malformed JSON"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject inconsistent values.  Nothing is clamped here.
    pub fn validate(&self) -> Result<()> {
        if !positive(self.pb) {
            return Err(Error::InvalidParameter("config: PB must be positive"));
        }
        if !non_negative(self.ti_secs) || !non_negative(self.td_secs) {
            return Err(Error::InvalidParameter("config: Ti/Td must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.u_min) || !(0.0..=1.0).contains(&self.u_max) {
            return Err(Error::InvalidParameter("config: u band must lie in [0, 1]"));
        }
        if self.u_min > self.u_max {
            return Err(Error::InvalidParameter("config: u_min above u_max"));
        }
        if !positive(self.pid_cycle_secs) || !positive(self.auger_on_secs) {
            return Err(Error::InvalidParameter("config: cycle times must be positive"));
        }
        if !non_negative(self.auger_off_secs) || !non_negative(self.pmode_step_secs) {
            return Err(Error::InvalidParameter("config: off-times must not be negative"));
        }
        if !(0.0..=self.pmode_max).contains(&self.pmode) {
            return Err(Error::InvalidParameter("config: PMode outside [0, pmode_max]"));
        }
        if self.igniter_temp > self.startup_temp {
            return Err(Error::InvalidParameter(
                "config: igniter threshold above startup threshold",
            ));
        }
        if !positive(self.igniter_max_on_secs) || !positive(self.shutdown_secs) {
            return Err(Error::InvalidParameter("config: safety timers must be positive"));
        }
        if self.tick_interval_ms == 0 || !positive(self.sample_interval_secs) {
            return Err(Error::InvalidParameter("config: timing intervals must be positive"));
        }
        if self.record_window_secs < self.sample_interval_secs {
            return Err(Error::InvalidParameter(
                "config: record window shorter than the sample interval",
            ));
        }
        if self.primary_probe.is_empty() {
            return Err(Error::InvalidParameter("config: primary probe name empty"));
        }
        Ok(())
    }

    /// Period of the control loop.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.tick_interval_ms))
    }
}

fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

/// False for NaN and infinities as well as negatives.
fn non_negative(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}
