//! The control loop driver.
//!
//! Calls [`AppService::tick`] at the configured interval until told to stop.
//! However the loop ends (stop flag, relay error, or a panic unwinding
//! through it) every relay is driven off on the way out.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};

use super::channels::SmokerChannels;
use super::ports::{Clock, EventSink, RelayPort};
use super::service::AppService;
use crate::error::Result;

/// Drives every relay off when dropped.
struct RelaysOffGuard<'a, R: RelayPort> {
    relays: &'a mut R,
}

impl<R: RelayPort> Drop for RelaysOffGuard<'_, R> {
    fn drop(&mut self) {
        match self.relays.all_off() {
            Ok(()) => info!("Relays off"),
            Err(e) => error!("failed to turn relays off: {e}"),
        }
    }
}

/// Start the service and tick it until `stop` is set.
pub fn run<R, S, C>(
    service: &mut AppService,
    relays: &mut R,
    sink: &mut S,
    clock: &C,
    channels: &SmokerChannels,
    stop: &AtomicBool,
) -> Result<()>
where
    R: RelayPort,
    S: EventSink,
    C: Clock,
{
    let mut guard = RelaysOffGuard { relays };
    let tick = service.config().tick_interval();

    service.start(clock.now(), &mut *guard.relays, sink, channels)?;
    info!("Control loop running, tick {} ms", tick.as_millis());

    while !stop.load(Ordering::Relaxed) {
        let started = clock.now();
        if let Err(e) = service.tick(started, &mut *guard.relays, sink, channels) {
            error!("control tick failed: {e}");
            return Err(e);
        }
        let elapsed = clock.now().saturating_sub(started);
        if let Some(rest) = tick.checked_sub(elapsed) {
            clock.sleep(rest);
        }
    }

    info!("Control loop stopped after {} ticks", service.tick_count());
    Ok(())
}
