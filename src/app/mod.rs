//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules for the smoker controller:
//! parameter batching, program sequencing, safety interlocks and the mode
//! FSM, orchestrated by [`service::AppService`].  All interaction with
//! hardware and the backend happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod channels;
pub mod commands;
pub mod events;
pub mod ports;
pub mod runner;
pub mod service;
