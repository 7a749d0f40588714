//! Safety supervisor.
//!
//! The supervisor runs **every tick, after the parameter batch and before
//! the FSM**, and accumulates a fault bitmask that the service copies into
//! `FsmContext.fault_flags`.
//!
//! ## Fault lifecycle
//!
//! 1. A condition trips (the igniter has been on past its ceiling).
//! 2. The supervisor sets the bit and logs at error level.
//! 3. The service switches the offending relay off and forces `Shutdown`,
//!    whatever mode logic or operator input said this tick.
//! 4. Once the condition no longer holds the bit clears.  The smoker stays
//!    in `Shutdown` until it burns out to `Off`; nothing restarts it.

use core::time::Duration;

use log::{error, info};

use crate::config::SmokerConfig;
use crate::error::SafetyFault;
use crate::relays::{Relay, RelayBank};

/// Safety supervisor.
pub struct SafetySupervisor {
    igniter_max_on_secs: f64,
    /// Latched fault bitmask.
    faults: u8,
}

impl SafetySupervisor {
    pub fn new(config: &SmokerConfig) -> Self {
        Self {
            igniter_max_on_secs: config.igniter_max_on_secs,
            faults: 0,
        }
    }

    /// Evaluate every interlock against the relay bank.
    /// Returns the updated fault bitmask.
    pub fn evaluate(&mut self, relays: &RelayBank, now: Duration) -> u8 {
        let igniter_on = relays
            .on_for(Relay::Igniter, now)
            .map_or(0.0, |d| d.as_secs_f64());
        self.eval_fault(
            SafetyFault::IgniterTimeout,
            igniter_on > self.igniter_max_on_secs,
        );

        self.faults
    }

    /// Current fault bitmask.
    pub fn faults(&self) -> u8 {
        self.faults
    }

    /// Set or clear a fault bit based on a boolean condition.
    fn eval_fault(&mut self, fault: SafetyFault, condition: bool) {
        if condition {
            if self.faults & fault.mask() == 0 {
                error!("SAFETY FAULT SET: {fault}");
            }
            self.faults |= fault.mask();
        } else {
            if self.faults & fault.mask() != 0 {
                info!("SAFETY FAULT CLEARED: {fault}");
            }
            self.faults &= !fault.mask();
        }
    }
}
