//! Relay state owned by the mode state machine.
//!
//! The bank is the domain's view of the auger, fan and igniter outputs plus
//! the instant each one last changed.  Duty-cycle timing and the igniter
//! ceiling are measured from those instants.  The service mirrors the bank
//! onto a [`RelayPort`](crate::app::ports::RelayPort) after every tick.

use core::fmt;
use core::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relay {
    Auger,
    Fan,
    Igniter,
}

impl Relay {
    pub const ALL: [Relay; 3] = [Relay::Auger, Relay::Fan, Relay::Igniter];

    const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Auger => "auger",
            Self::Fan => "fan",
            Self::Igniter => "igniter",
        }
    }
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of every output, for the display and the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStates {
    pub auger: bool,
    pub fan: bool,
    pub igniter: bool,
}

impl RelayStates {
    pub fn get(&self, relay: Relay) -> bool {
        match relay {
            Relay::Auger => self.auger,
            Relay::Fan => self.fan,
            Relay::Igniter => self.igniter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayBank {
    on: [bool; 3],
    toggled_at: [Duration; 3],
}

impl RelayBank {
    /// All relays off, stamped at `now`.
    pub fn new(now: Duration) -> Self {
        Self {
            on: [false; 3],
            toggled_at: [now; 3],
        }
    }

    /// Switch `relay`.  The toggle time moves only when the state actually
    /// changes.  Returns whether it did.
    pub fn set(&mut self, relay: Relay, on: bool, now: Duration) -> bool {
        let i = relay.index();
        if self.on[i] == on {
            return false;
        }
        info!("Toggling {relay}: {}", if on { "On" } else { "Off" });
        self.on[i] = on;
        self.toggled_at[i] = now;
        true
    }

    /// Switch `relay` and restart its timer even if it was already in that
    /// state.  Used when a mode begins a fresh duty cycle.
    pub fn restart(&mut self, relay: Relay, on: bool, now: Duration) {
        if !self.set(relay, on, now) {
            self.toggled_at[relay.index()] = now;
        }
    }

    pub fn all_off(&mut self, now: Duration) {
        for relay in Relay::ALL {
            self.set(relay, false, now);
        }
    }

    pub fn is_on(&self, relay: Relay) -> bool {
        self.on[relay.index()]
    }

    pub fn toggled_at(&self, relay: Relay) -> Duration {
        self.toggled_at[relay.index()]
    }

    /// Time since `relay` last changed state.
    pub fn since_toggle(&self, relay: Relay, now: Duration) -> Duration {
        now.saturating_sub(self.toggled_at(relay))
    }

    /// How long `relay` has been continuously on, or `None` while it is off.
    pub fn on_for(&self, relay: Relay, now: Duration) -> Option<Duration> {
        self.is_on(relay).then(|| self.since_toggle(relay, now))
    }

    pub fn states(&self) -> RelayStates {
        RelayStates {
            auger: self.is_on(Relay::Auger),
            fan: self.is_on(Relay::Fan),
            igniter: self.is_on(Relay::Igniter),
        }
    }
}
