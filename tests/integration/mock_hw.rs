//! Mock hardware and collaborators for integration tests.
//!
//! Records every relay call and event so tests can assert on the full
//! history without touching real GPIO.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::bail;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::ErrorKind;
use embedded_hal::spi::{ErrorType as SpiErrorType, Operation, SpiDevice};
use serde_json::{Map, Value};
use smokectl::app::channels::{ControlRecord, ParameterSnapshot};
use smokectl::app::events::AppEvent;
use smokectl::app::ports::{Backend, Clock, EventSink, RelayPort};
use smokectl::program::{ProgramStep, Steps};
use smokectl::relays::Relay;
use smokectl::sensors::hub::{ProbeSet, TemperatureSample};
use smokectl::sensors::rtd::celsius_to_resistance;
use smokectl::sensors::{Probe, RtdType, Signal, SignalKind, SignalSource, TemperatureUnit};
use smokectl::{Error, Result};

// ── Probe input ───────────────────────────────────────────────

/// A Pt100 element whose temperature (°F) the test sets.
pub struct SimRtd {
    pub fahrenheit: Rc<Cell<f64>>,
    pub fail: Rc<Cell<bool>>,
}

#[allow(dead_code)]
impl SimRtd {
    pub fn new(fahrenheit: f64) -> (Self, Rc<Cell<f64>>, Rc<Cell<bool>>) {
        let temp = Rc::new(Cell::new(fahrenheit));
        let fail = Rc::new(Cell::new(false));
        (
            Self {
                fahrenheit: temp.clone(),
                fail: fail.clone(),
            },
            temp,
            fail,
        )
    }
}

impl SignalSource for SimRtd {
    fn kind(&self) -> SignalKind {
        SignalKind::Ohms
    }

    fn sample(&mut self) -> Result<Signal> {
        if self.fail.get() {
            return Err(Error::Protocol("probe unplugged"));
        }
        let celsius = (self.fahrenheit.get() - 32.0) * 5.0 / 9.0;
        Ok(Signal::Ohms(celsius_to_resistance(celsius, 100.0)))
    }
}

/// A Fahrenheit probe set holding a `grill` and a `meat` probe.
#[allow(dead_code)]
pub fn smoker_probes(grill_f: f64, meat_f: f64) -> (ProbeSet, Rc<Cell<f64>>, Rc<Cell<f64>>) {
    let mut probes = ProbeSet::new(TemperatureUnit::Fahrenheit, Duration::from_secs(3), Duration::from_secs(60));
    let (grill_src, grill, _) = SimRtd::new(grill_f);
    let (meat_src, meat, _) = SimRtd::new(meat_f);
    probes
        .add(Probe::rtd("grill", RtdType::Pt100, Box::new(grill_src)).expect("valid probe"))
        .expect("room for probe");
    probes
        .add(Probe::rtd("meat", RtdType::Pt100, Box::new(meat_src)).expect("valid probe"))
        .expect("room for probe");
    (probes, grill, meat)
}

// ── SPI bus ───────────────────────────────────────────────────

/// An SPI device that answers each in-place transfer with the next
/// scripted reply.  The transmit log is shared so it stays readable after
/// a driver takes ownership of the device.
#[derive(Default)]
pub struct ScriptedSpi {
    pub replies: VecDeque<Vec<u8>>,
    pub sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

#[allow(dead_code)]
impl ScriptedSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.replies.push_back(bytes.to_vec());
        self
    }
}

impl SpiErrorType for ScriptedSpi {
    type Error = core::convert::Infallible;
}

impl SpiDevice for ScriptedSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> core::result::Result<(), Self::Error> {
        for op in operations {
            if let Operation::TransferInPlace(buf) = op {
                self.sent.borrow_mut().push(buf.to_vec());
                let reply = self.replies.pop_front().unwrap_or_else(|| vec![0; buf.len()]);
                for (dst, src) in buf.iter_mut().zip(reply) {
                    *dst = src;
                }
            }
        }
        Ok(())
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Relay call record ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayCall {
    Set(Relay, bool),
    AllOff,
}

pub struct RecordingRelays {
    pub calls: Vec<RelayCall>,
    pub state: [bool; 3],
    /// Fail every `set` once this many calls have been recorded.
    pub fail_after: Option<usize>,
}

#[allow(dead_code)]
impl RecordingRelays {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            state: [false; 3],
            fail_after: None,
        }
    }

    pub fn is_on(&self, relay: Relay) -> bool {
        self.state[relay as usize]
    }

    pub fn last_call(&self) -> Option<&RelayCall> {
        self.calls.last()
    }

    pub fn count(&self, call: RelayCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl RelayPort for RecordingRelays {
    fn set(&mut self, relay: Relay, on: bool) -> Result<()> {
        if self.fail_after.is_some_and(|n| self.calls.len() >= n) {
            return Err(Error::Pin(ErrorKind::Other));
        }
        self.calls.push(RelayCall::Set(relay, on));
        self.state[relay as usize] = on;
        Ok(())
    }

    fn get(&mut self, relay: Relay) -> Result<bool> {
        Ok(self.is_on(relay))
    }

    fn all_off(&mut self) -> Result<()> {
        self.calls.push(RelayCall::AllOff);
        self.state = [false; 3];
        Ok(())
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_changes(&self) -> Vec<(smokectl::fsm::SmokerMode, smokectl::fsm::SmokerMode)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Backend ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockBackend {
    /// What `read_parameters` returns.
    pub parameters: Map<String, Value>,
    pub stored_program: Option<Steps>,
    pub fail: bool,
    pub samples: Vec<TemperatureSample>,
    pub written_parameters: Vec<ParameterSnapshot>,
    pub control: Vec<ControlRecord>,
    pub programs: Vec<Vec<ProgramStep>>,
    pub program_reads: usize,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(json: &str) -> Self {
        Self {
            parameters: serde_json::from_str(json).expect("valid parameter JSON"),
            ..Self::default()
        }
    }
}

impl Backend for MockBackend {
    fn post_temperature_sample(&mut self, _target: f64, sample: &TemperatureSample) -> anyhow::Result<()> {
        if self.fail {
            bail!("backend offline");
        }
        self.samples.push(sample.clone());
        Ok(())
    }

    fn read_parameters(&mut self) -> anyhow::Result<Map<String, Value>> {
        if self.fail {
            bail!("backend offline");
        }
        Ok(self.parameters.clone())
    }

    fn write_parameters(&mut self, params: &ParameterSnapshot) -> anyhow::Result<()> {
        if self.fail {
            bail!("backend offline");
        }
        // Like a real store: what was written is what is read back.
        if let Value::Object(map) = serde_json::to_value(params)? {
            self.parameters.extend(map);
        }
        self.written_parameters.push(*params);
        Ok(())
    }

    fn write_control_telemetry(&mut self, record: &ControlRecord) -> anyhow::Result<()> {
        self.control.push(*record);
        Ok(())
    }

    fn read_program(&mut self, _active: bool) -> anyhow::Result<Option<Steps>> {
        if self.fail {
            bail!("backend offline");
        }
        self.program_reads += 1;
        Ok(self.stored_program.clone())
    }

    fn write_program(&mut self, steps: &[ProgramStep]) -> anyhow::Result<()> {
        self.programs.push(steps.to_vec());
        Ok(())
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Simulated clock: `sleep` advances time instantly, and the stop flag is
/// raised once `stop_at` is reached.
pub struct SimClock<'a> {
    now: Cell<Duration>,
    stop_at: Duration,
    stop: &'a AtomicBool,
    pub sleeps: RefCell<VecDeque<Duration>>,
}

#[allow(dead_code)]
impl<'a> SimClock<'a> {
    pub fn new(stop_at: Duration, stop: &'a AtomicBool) -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            stop_at,
            stop,
            sleeps: RefCell::new(VecDeque::new()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get()
    }
}

impl Clock for SimClock<'_> {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push_back(duration);
        let now = self.now.get() + duration;
        self.now.set(now);
        if now >= self.stop_at {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}
