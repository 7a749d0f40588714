//! Host time adapter.
//!
//! Provides the monotonic [`Clock`] the control loop and backend worker
//! run on, backed by `std::time::Instant`.

use core::time::Duration;
use std::time::Instant;

use crate::app::ports::Clock;

/// Monotonic clock measured from construction.
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
