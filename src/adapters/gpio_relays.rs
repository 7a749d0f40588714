//! GPIO relay adapter.
//!
//! Implements [`RelayPort`] over three `embedded-hal` output pins.  Relay
//! boards are commonly active-low, so the logical "on" level is
//! configurable.  Construction drives every relay off before anything
//! else can touch them.

use embedded_hal::digital::StatefulOutputPin;
use log::error;

use crate::app::ports::RelayPort;
use crate::error::{Result, pin};
use crate::relays::Relay;

/// Relay outputs for the auger, fan and igniter.
pub struct GpioRelays<A, F, I> {
    auger: A,
    fan: F,
    igniter: I,
    active_low: bool,
}

impl<A, F, I> GpioRelays<A, F, I>
where
    A: StatefulOutputPin,
    F: StatefulOutputPin,
    I: StatefulOutputPin,
{
    pub fn new(auger: A, fan: F, igniter: I, active_low: bool) -> Result<Self> {
        let mut relays = Self {
            auger,
            fan,
            igniter,
            active_low,
        };
        relays.all_off()?;
        Ok(relays)
    }

    /// Hand the pins back.
    pub fn release(self) -> (A, F, I) {
        (self.auger, self.fan, self.igniter)
    }
}

fn drive<P: StatefulOutputPin>(p: &mut P, high: bool) -> Result<()> {
    let result = if high { p.set_high() } else { p.set_low() };
    result.map_err(pin)
}

fn level<P: StatefulOutputPin>(p: &mut P) -> Result<bool> {
    p.is_set_high().map_err(pin)
}

impl<A, F, I> RelayPort for GpioRelays<A, F, I>
where
    A: StatefulOutputPin,
    F: StatefulOutputPin,
    I: StatefulOutputPin,
{
    fn set(&mut self, relay: Relay, on: bool) -> Result<()> {
        let high = on != self.active_low;
        match relay {
            Relay::Auger => drive(&mut self.auger, high),
            Relay::Fan => drive(&mut self.fan, high),
            Relay::Igniter => drive(&mut self.igniter, high),
        }
    }

    fn get(&mut self, relay: Relay) -> Result<bool> {
        let high = match relay {
            Relay::Auger => level(&mut self.auger)?,
            Relay::Fan => level(&mut self.fan)?,
            Relay::Igniter => level(&mut self.igniter)?,
        };
        Ok(high != self.active_low)
    }

    fn all_off(&mut self) -> Result<()> {
        let mut first_err = None;
        for relay in Relay::ALL {
            if let Err(e) = self.set(relay, false) {
                error!("relay {relay}: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
