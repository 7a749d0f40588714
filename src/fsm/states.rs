//! Concrete mode handler functions and table builder.
//!
//! Each mode is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  OFF ──[operator]──▶ START ──[grill > startup temp]──▶ HOLD
//!                                                         │
//!  SMOKE / IGNITE / HOLD ◀──────[operator / program]──────┘
//!
//!  Any mode ──[operator / igniter ceiling]──▶ SHUTDOWN ──[fan run-on]──▶ OFF
//! ```
//!
//! The duty modes (Start, Smoke, Ignite, Hold) share one auger routine.
//! It takes the mode's igniter policy as a function pointer: Start and
//! Ignite hold the igniter on, Smoke and Hold gate it on grill temperature.

use core::time::Duration;

use log::info;

use super::context::FsmContext;
use super::{SmokerMode, StateDescriptor};
use crate::relays::Relay;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static mode table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; SmokerMode::COUNT] {
    [
        StateDescriptor {
            id: SmokerMode::Off,
            name: "Off",
            on_enter: Some(off_enter),
            on_exit: None,
            on_update: off_update,
        },
        StateDescriptor {
            id: SmokerMode::Start,
            name: "Start",
            on_enter: Some(start_enter),
            on_exit: None,
            on_update: start_update,
        },
        StateDescriptor {
            id: SmokerMode::Smoke,
            name: "Smoke",
            on_enter: Some(smoke_enter),
            on_exit: None,
            on_update: smoke_update,
        },
        StateDescriptor {
            id: SmokerMode::Hold,
            name: "Hold",
            on_enter: Some(hold_enter),
            on_exit: None,
            on_update: hold_update,
        },
        StateDescriptor {
            id: SmokerMode::Ignite,
            name: "Ignite",
            on_enter: Some(ignite_enter),
            on_exit: None,
            on_update: ignite_update,
        },
        StateDescriptor {
            id: SmokerMode::Shutdown,
            name: "Shutdown",
            on_enter: Some(shutdown_enter),
            on_exit: None,
            on_update: shutdown_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared duty-cycle helpers
// ═══════════════════════════════════════════════════════════════════════════

type IgniterPolicy = fn(&mut FsmContext);

/// Igniter on while the grill is below the igniter threshold.  Without a
/// reading the igniter is left as it is.
fn gate_igniter(ctx: &mut FsmContext) {
    if let Some(t) = ctx.readings.primary {
        let on = t < ctx.config.igniter_temp;
        ctx.relays.set(Relay::Igniter, on, ctx.now);
    }
}

fn force_igniter(ctx: &mut FsmContext) {
    ctx.relays.set(Relay::Igniter, true, ctx.now);
}

/// Toggle the auger when its on- or off-share of the cycle has elapsed,
/// re-evaluating the igniter at each toggle point.
fn auger_control(ctx: &mut FsmContext, igniter: IgniterPolicy) {
    let elapsed = ctx.relays.since_toggle(Relay::Auger, ctx.now).as_secs_f64();
    if ctx.relays.is_on(Relay::Auger) {
        if elapsed >= ctx.cycle_secs * ctx.u {
            if ctx.u < 1.0 {
                ctx.relays.set(Relay::Auger, false, ctx.now);
            }
            igniter(ctx);
        }
    } else if elapsed >= ctx.cycle_secs * (1.0 - ctx.u) {
        ctx.relays.set(Relay::Auger, true, ctx.now);
        igniter(ctx);
    }
}

/// Fan on and a fresh auger cycle.
fn begin_feeding(ctx: &mut FsmContext) {
    ctx.relays.set(Relay::Fan, true, ctx.now);
    ctx.relays.restart(Relay::Auger, true, ctx.now);
}

// ═══════════════════════════════════════════════════════════════════════════
//  OFF
// ═══════════════════════════════════════════════════════════════════════════

fn off_enter(ctx: &mut FsmContext) {
    ctx.relays.all_off(ctx.now);
    info!("OFF: all relays off");
}

fn off_update(_ctx: &mut FsmContext) -> Option<SmokerMode> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  START: light the fire pot with a fixed feed
// ═══════════════════════════════════════════════════════════════════════════

fn start_enter(ctx: &mut FsmContext) {
    begin_feeding(ctx);
    force_igniter(ctx);
    ctx.cycle_secs = ctx.config.auger_on_secs + ctx.config.auger_off_secs;
    ctx.u = ctx.config.auger_on_secs / ctx.cycle_secs;
    info!(
        "START: cycle {:.0}s, u {:.2}, waiting for {:.0}",
        ctx.cycle_secs, ctx.u, ctx.config.startup_temp
    );
}

fn start_update(ctx: &mut FsmContext) -> Option<SmokerMode> {
    auger_control(ctx, force_igniter);
    force_igniter(ctx);
    match ctx.readings.primary {
        Some(t) if t > ctx.config.startup_temp => {
            info!("START: grill at {t:.1}, handing over to Hold");
            Some(SmokerMode::Hold)
        }
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SMOKE / IGNITE: fixed feed stretched by PMode
// ═══════════════════════════════════════════════════════════════════════════

fn apply_fixed_feed(ctx: &mut FsmContext) {
    let (cycle, u) = ctx.fixed_feed_cycle();
    ctx.cycle_secs = cycle;
    ctx.u = u;
}

fn smoke_enter(ctx: &mut FsmContext) {
    begin_feeding(ctx);
    gate_igniter(ctx);
    apply_fixed_feed(ctx);
    info!("SMOKE: PMode {:.0}, cycle {:.0}s, u {:.3}", ctx.pmode, ctx.cycle_secs, ctx.u);
}

fn smoke_update(ctx: &mut FsmContext) -> Option<SmokerMode> {
    auger_control(ctx, gate_igniter);
    None
}

fn ignite_enter(ctx: &mut FsmContext) {
    begin_feeding(ctx);
    force_igniter(ctx);
    apply_fixed_feed(ctx);
    info!("IGNITE: PMode {:.0}, cycle {:.0}s, u {:.3}", ctx.pmode, ctx.cycle_secs, ctx.u);
}

fn ignite_update(ctx: &mut FsmContext) -> Option<SmokerMode> {
    auger_control(ctx, force_igniter);
    force_igniter(ctx);
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HOLD: closed-loop feed
// ═══════════════════════════════════════════════════════════════════════════

fn hold_enter(ctx: &mut FsmContext) {
    begin_feeding(ctx);
    gate_igniter(ctx);
    ctx.cycle_secs = ctx.config.pid_cycle_secs;
    ctx.u = ctx.config.u_min;
    ctx.pid.reset();
    info!("HOLD: target {:.1}, cycle {:.0}s", ctx.target(), ctx.cycle_secs);
}

fn hold_update(ctx: &mut FsmContext) -> Option<SmokerMode> {
    run_pid(ctx);
    auger_control(ctx, gate_igniter);
    None
}

/// Once per cycle, feed the grill average since the previous update to the
/// PID and clamp its output into the duty band.
fn run_pid(ctx: &mut FsmContext) {
    let cycle = Duration::try_from_secs_f64(ctx.cycle_secs).unwrap_or(Duration::MAX);
    if !ctx.pid.is_due(ctx.now, cycle) {
        return;
    }
    let Some(average) = ctx.readings.primary_average else {
        return;
    };
    let output = ctx.pid.update(average, ctx.now);
    ctx.u = output.clamp(ctx.config.u_min, ctx.config.u_max);
    ctx.pid_updated = true;
    info!("HOLD: u {:.3} (avg {:.1}, target {:.1})", ctx.u, average, ctx.target());
}

// ═══════════════════════════════════════════════════════════════════════════
//  SHUTDOWN: burn out with the fan only
// ═══════════════════════════════════════════════════════════════════════════

fn shutdown_enter(ctx: &mut FsmContext) {
    ctx.relays.all_off(ctx.now);
    ctx.relays.set(Relay::Fan, true, ctx.now);
    info!("SHUTDOWN: fan running for {:.0}s", ctx.config.shutdown_secs);
}

fn shutdown_update(ctx: &mut FsmContext) -> Option<SmokerMode> {
    let fan_on = ctx.relays.since_toggle(Relay::Fan, ctx.now).as_secs_f64();
    (fan_on >= ctx.config.shutdown_secs).then_some(SmokerMode::Off)
}
