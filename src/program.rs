//! Cook programs: an ordered list of mode/target steps, each ended by a
//! trigger.
//!
//! The head of the queue is the step in force.  Every tick the service
//! polls the program; when the head's trigger fires the head is dropped and
//! the next step (if any) is handed back to be applied.  Running off the end
//! deactivates the program and leaves mode and target as they are.

use core::time::Duration;

use heapless::{Deque, Vec};
use log::info;
use serde::{Deserialize, Serialize};

use crate::fsm::SmokerMode;

pub const MAX_STEPS: usize = 16;

/// A program as exchanged with the backend.
pub type Steps = Vec<ProgramStep, MAX_STEPS>;

/// What ends a step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Trigger {
    /// Seconds since the step was applied.
    Time(f64),
    /// Meat probe reading, in the display unit.
    MeatTemp(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgramStep {
    pub mode: SmokerMode,
    pub target: f64,
    pub trigger: Trigger,
}

/// Result of a trigger firing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    /// Apply this step now.
    Next(ProgramStep),
    /// The last step ended; the program is no longer active.
    Finished,
}

#[derive(Debug, Default)]
pub struct Program {
    steps: Deque<ProgramStep, MAX_STEPS>,
    active: bool,
    step_started: Duration,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the program and activate it.  Returns the first step, which
    /// the caller applies; `None` (and inactive) for an empty program.
    pub fn load(&mut self, steps: &[ProgramStep], now: Duration) -> Option<ProgramStep> {
        self.steps.clear();
        for step in steps.iter().take(MAX_STEPS) {
            // Bounded by take() above.
            let _ = self.steps.push_back(*step);
        }
        self.step_started = now;
        self.active = !self.steps.is_empty();
        if self.active {
            info!("Program loaded: {} steps", self.steps.len());
        }
        self.steps.front().copied()
    }

    /// Deactivate without discarding the remaining steps.
    pub fn stop(&mut self) {
        if self.active {
            info!("Program stopped with {} steps left", self.steps.len());
        }
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The step in force.
    pub fn current(&self) -> Option<&ProgramStep> {
        self.steps.front()
    }

    /// Remaining steps, head first.
    pub fn steps(&self) -> Steps {
        self.steps.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether `steps` is exactly the remaining program.
    pub fn matches(&self, steps: &[ProgramStep]) -> bool {
        self.steps.len() == steps.len() && self.steps.iter().zip(steps).all(|(a, b)| a == b)
    }

    /// Check the head's trigger.  Fires when elapsed time or the meat
    /// temperature reaches the trigger value.
    pub fn poll(&mut self, now: Duration, meat: Option<f64>) -> Option<Advance> {
        if !self.active {
            return None;
        }
        let Some(step) = self.steps.front() else {
            self.active = false;
            return Some(Advance::Finished);
        };
        let fired = match step.trigger {
            Trigger::Time(secs) => now.saturating_sub(self.step_started).as_secs_f64() >= secs,
            Trigger::MeatTemp(value) => meat.is_some_and(|m| m >= value),
        };
        if !fired {
            return None;
        }

        self.steps.pop_front();
        match self.steps.front() {
            Some(next) => {
                info!(
                    "Advancing to next program step: {} at {:.1} ({} left)",
                    next.mode,
                    next.target,
                    self.steps.len()
                );
                self.step_started = now;
                Some(Advance::Next(*next))
            }
            None => {
                info!("Last program step reached, disabling program");
                self.active = false;
                Some(Advance::Finished)
            }
        }
    }
}
