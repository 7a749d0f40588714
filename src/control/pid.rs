//! PID controller for the auger duty ratio.
//!
//! Standard (ISA) form with a proportional band instead of a gain:
//!
//! ```text
//!   u = bias + (1/PB) · ( e + (1/Ti)·∫e dt + Td·de/dt ),   e = target − measured
//! ```
//!
//! The integrator is bounded so its contribution never exceeds
//! `integral_limit`, and it stops accumulating while the output is already
//! past the operating band in the direction the error is pushing.

use core::time::Duration;

use serde::Serialize;

/// Tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional band; the error span that moves the output by 1.0.
    pub pb: f64,
    /// Integral time in seconds.  Zero or infinity disables integral action.
    pub ti: f64,
    /// Derivative time in seconds.  Zero disables derivative action.
    pub td: f64,
}

/// Components of the most recent update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PidTelemetry {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub output: f64,
    pub error: f64,
    pub derivative: f64,
    pub integral: f64,
}

pub struct PidController {
    gains: PidGains,
    bias: f64,
    integral_limit: f64,
    target: f64,
    out_min: f64,
    out_max: f64,

    /// ∫e dt, already bounded.
    integral: f64,
    prev_error: Option<f64>,
    last_update: Option<Duration>,
    last: PidTelemetry,
}

impl PidController {
    pub fn new(gains: PidGains, bias: f64, integral_limit: f64, target: f64) -> Self {
        Self {
            gains,
            bias,
            integral_limit: integral_limit.abs(),
            target,
            out_min: 0.0,
            out_max: 1.0,
            integral: 0.0,
            prev_error: None,
            last_update: None,
            last: PidTelemetry::default(),
        }
    }

    /// Band outside which integration is suspended.
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        self.out_min = min;
        self.out_max = max;
    }

    /// Change the set point.  The integrator restarts and the next update
    /// takes no derivative kick from the step.
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
        self.integral = 0.0;
        self.prev_error = None;
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        self.integral = self.integral.clamp(-self.integral_bound(), self.integral_bound());
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
        self.last_update = None;
        self.last = PidTelemetry::default();
    }

    /// `true` when no update has run yet or `cycle` has elapsed since the
    /// last one.
    pub fn is_due(&self, now: Duration, cycle: Duration) -> bool {
        self.last_update.is_none_or(|t| now.saturating_sub(t) >= cycle)
    }

    /// Run one update and return the unclamped output.
    pub fn update(&mut self, measured: f64, now: Duration) -> f64 {
        let error = self.target - measured;
        let dt = self
            .last_update
            .map_or(0.0, |t| now.saturating_sub(t).as_secs_f64());

        let derivative = match self.prev_error {
            Some(prev) if dt > 0.0 => (error - prev) / dt,
            _ => 0.0,
        };

        if self.integral_enabled() && dt > 0.0 {
            let before = self.bias + (error + self.integral / self.gains.ti) / self.gains.pb;
            let winding_up = before >= self.out_max && error > 0.0;
            let winding_down = before <= self.out_min && error < 0.0;
            if !winding_up && !winding_down {
                let bound = self.integral_bound();
                self.integral = (self.integral + error * dt).clamp(-bound, bound);
            }
        }

        let p = error / self.gains.pb;
        let i = if self.integral_enabled() {
            self.integral / (self.gains.pb * self.gains.ti)
        } else {
            0.0
        };
        let d = self.gains.td * derivative / self.gains.pb;
        let output = self.bias + p + i + d;

        self.last = PidTelemetry {
            p,
            i,
            d,
            output,
            error,
            derivative,
            integral: self.integral,
        };
        self.prev_error = Some(error);
        self.last_update = Some(now);
        output
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn last_update(&self) -> Option<Duration> {
        self.last_update
    }

    pub fn telemetry(&self) -> PidTelemetry {
        self.last
    }

    fn integral_enabled(&self) -> bool {
        self.gains.ti.is_finite() && self.gains.ti > 0.0
    }

    /// Largest |∫e dt| that keeps |I| within the limit.
    fn integral_bound(&self) -> f64 {
        if self.integral_enabled() {
            self.integral_limit * self.gains.pb * self.gains.ti
        } else {
            0.0
        }
    }
}
