//! [`SignalSource`] handles onto the SPI drivers.
//!
//! One chip usually serves several probes (the ADS1118 carries both the
//! thermocouple input and its own die sensor as cold junction), so each
//! handle holds a shared reference to the driver and names its channel.
//! The control loop is single-threaded and samples probes one after the
//! other, so a `RefCell` borrow never overlaps another.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use super::{Signal, SignalKind, SignalSource};
use crate::drivers::ads1118::{Ads1118, Mux};
use crate::drivers::max31865::Max31865;
use crate::drivers::mcp320x::{Input, Mcp320x};
use crate::error::{Result, SensorFault};

pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a driver so several sources can use it.
pub fn share<T>(dev: T) -> Shared<T> {
    Rc::new(RefCell::new(dev))
}

/// One multiplexer input of an ADS1118, in volts.
pub struct Ads1118Input<SPI, D> {
    dev: Shared<Ads1118<SPI, D>>,
    mux: Mux,
}

impl<SPI, D> Ads1118Input<SPI, D> {
    pub fn new(dev: Shared<Ads1118<SPI, D>>, mux: Mux) -> Self {
        Self { dev, mux }
    }
}

impl<SPI: SpiDevice, D: DelayNs> SignalSource for Ads1118Input<SPI, D> {
    fn kind(&self) -> SignalKind {
        SignalKind::Volts
    }

    fn sample(&mut self) -> Result<Signal> {
        self.dev.borrow_mut().read(self.mux).map(Signal::Volts)
    }
}

/// The ADS1118 die sensor, usable as a cold-junction reference.  The die
/// changes temperature slowly, so reads go through the driver's cache.
pub struct Ads1118DieTemperature<SPI, D> {
    dev: Shared<Ads1118<SPI, D>>,
    clock: Box<dyn Fn() -> Duration>,
}

impl<SPI, D> Ads1118DieTemperature<SPI, D> {
    /// Cache ages are measured from the moment of construction.
    pub fn new(dev: Shared<Ads1118<SPI, D>>) -> Self {
        let origin = Instant::now();
        Self::with_clock(dev, move || origin.elapsed())
    }

    /// Use the controller's own time base for cache ages.
    pub fn with_clock(dev: Shared<Ads1118<SPI, D>>, clock: impl Fn() -> Duration + 'static) -> Self {
        Self {
            dev,
            clock: Box::new(clock),
        }
    }
}

impl<SPI: SpiDevice, D: DelayNs> SignalSource for Ads1118DieTemperature<SPI, D> {
    fn kind(&self) -> SignalKind {
        SignalKind::Celsius
    }

    fn sample(&mut self) -> Result<Signal> {
        let now = (self.clock)();
        self.dev.borrow_mut().internal_temperature(now).map(Signal::Celsius)
    }
}

/// RTD resistance from a MAX31865.  Surfaces the chip's fault status.
pub struct RtdInput<SPI, D> {
    dev: Shared<Max31865<SPI, D>>,
}

impl<SPI, D> RtdInput<SPI, D> {
    pub fn new(dev: Shared<Max31865<SPI, D>>) -> Self {
        Self { dev }
    }
}

impl<SPI: SpiDevice, D: DelayNs> SignalSource for RtdInput<SPI, D> {
    fn kind(&self) -> SignalKind {
        SignalKind::Ohms
    }

    fn sample(&mut self) -> Result<Signal> {
        self.dev.borrow_mut().read().map(Signal::Ohms)
    }

    fn fault(&self) -> Option<SensorFault> {
        self.dev.borrow().fault().map(SensorFault::Rtd)
    }
}

/// One input of an MCP3204/3208, in volts.
pub struct Mcp320xInput<SPI> {
    dev: Shared<Mcp320x<SPI>>,
    input: Input,
}

impl<SPI> Mcp320xInput<SPI> {
    pub fn new(dev: Shared<Mcp320x<SPI>>, input: Input) -> Self {
        Self { dev, input }
    }
}

impl<SPI: SpiDevice> SignalSource for Mcp320xInput<SPI> {
    fn kind(&self) -> SignalKind {
        SignalKind::Volts
    }

    fn sample(&mut self) -> Result<Signal> {
        self.dev.borrow_mut().read(self.input).map(Signal::Volts)
    }
}
