//! smokectl: pellet-smoker controller library.
//!
//! Exposes the SPI temperature front-ends, probe physics, the PID, the
//! mode state machine and the control loop.  Hardware is reached only
//! through `embedded-hal` traits; everything else is host-testable.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod drivers;
pub mod fsm;
pub mod program;
pub mod relays;
pub mod safety;
pub mod sensors;

mod error;

pub use error::{Error, Result, SafetyFault, SensorFault};
