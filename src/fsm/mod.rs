//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  StateTable                                                │
//! │  ┌──────────┬───────────┬──────────┬───────────────────┐   │
//! │  │ Mode     │ on_enter  │ on_exit  │ on_update         │   │
//! │  ├──────────┼───────────┼──────────┼───────────────────┤   │
//! │  │ Off      │ fn(ctx)   │    -     │ fn(ctx)->Option<> │   │
//! │  │ Start    │ fn(ctx)   │    -     │ fn(ctx)->Option<> │   │
//! │  │ Smoke    │ fn(ctx)   │    -     │ fn(ctx)->Option<> │   │
//! │  │ Hold     │ fn(ctx)   │    -     │ fn(ctx)->Option<> │   │
//! │  │ Ignite   │ fn(ctx)   │    -     │ fn(ctx)->Option<> │   │
//! │  │ Shutdown │ fn(ctx)   │    -     │ fn(ctx)->Option<> │   │
//! │  └──────────┴───────────┴──────────┴───────────────────┘   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** mode.
//! If it returns `Some(next)`, the engine runs `on_exit` for the
//! current mode, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut FsmContext` which
//! holds the latest temperatures, the relay bank, the PID and config.

pub mod context;
pub mod states;

use core::fmt;
use core::str::FromStr;

use context::FsmContext;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Mode identity
// ---------------------------------------------------------------------------

/// Operating modes of the smoker.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SmokerMode {
    Off = 0,
    Start = 1,
    Smoke = 2,
    Hold = 3,
    Ignite = 4,
    Shutdown = 5,
}

impl SmokerMode {
    /// Total number of modes, used to size the table array.
    pub const COUNT: usize = 6;

    pub const ALL: [SmokerMode; Self::COUNT] = [
        Self::Off,
        Self::Start,
        Self::Smoke,
        Self::Hold,
        Self::Ignite,
        Self::Shutdown,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Start => "Start",
            Self::Smoke => "Smoke",
            Self::Hold => "Hold",
            Self::Ignite => "Ignite",
            Self::Shutdown => "Shutdown",
        }
    }

    /// Modes whose auger cycle depends on the PMode setting.
    pub const fn uses_pmode(self) -> bool {
        matches!(self, Self::Smoke | Self::Ignite)
    }
}

impl fmt::Display for SmokerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SmokerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or(Error::InvalidParameter("unknown mode"))
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<SmokerMode>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single mode.
/// Stored in a fixed-size array: no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: SmokerMode,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]); the mutable
/// [`FsmContext`] is threaded through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `SmokerMode as usize`.
    table: [StateDescriptor; SmokerMode::COUNT],
    /// Index of the currently active mode.
    current: usize,
}

impl Fsm {
    /// Construct a new FSM with the given table, starting in `initial`.
    pub fn new(table: [StateDescriptor; SmokerMode::COUNT], initial: SmokerMode) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, row)| row.id as usize == i),
            "state table rows out of order"
        );
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting mode.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in mode: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current mode.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition (operator mode change, program step,
    /// safety shutdown).  A no-op when already in `next`.
    pub fn force_transition(&mut self, next: SmokerMode, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// Run the current mode's exit and entry actions again, so it picks up
    /// changed settings and starts a fresh cycle.
    pub fn reenter(&mut self, ctx: &mut FsmContext) {
        info!("FSM re-entering mode: {}", self.table[self.current].name);
        self.transition(self.current_state(), ctx);
    }

    /// The current mode.
    pub fn current_state(&self) -> SmokerMode {
        self.table[self.current].id
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: SmokerMode, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        if next_idx != self.current {
            info!(
                "FSM transition: {} -> {}",
                self.table[self.current].name, self.table[next_idx].name
            );
        }

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
