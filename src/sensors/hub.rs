//! Probe aggregation: rate-limited sampling and a rolling temperature record.
//!
//! [`ProbeSet`] owns every probe.  The control loop calls
//! [`ProbeSet::sample_if_due`] every tick; at most once per sample interval
//! it reads all probes, keeps the last known value for any probe that
//! failed, and appends the sample to a time-windowed record used for
//! averaging.

use core::time::Duration;

use heapless::{Deque, Vec};
use log::{debug, warn};
use serde::Serialize;

use super::{Probe, TemperatureUnit};
use crate::error::{Error, Result, SensorFault};

/// Upper bound on probes in one set.
pub const MAX_PROBES: usize = 8;

/// Samples kept in the rolling record.  Older entries are pruned by age
/// first; this only bounds memory.
const RECORD_CAPACITY: usize = 128;

// ---------------------------------------------------------------------------
// Samples
// ---------------------------------------------------------------------------

/// One probe's value inside a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReading {
    pub probe: String,
    pub value: f64,
    /// The value is a held-over one because the probe failed or faulted.
    pub stale: bool,
}

/// Every probe read at one instant, plus the set point in force.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSample {
    /// Seconds since the controller started.
    pub time: f64,
    pub target: f64,
    pub readings: Vec<ProbeReading, MAX_PROBES>,
}

impl TemperatureSample {
    pub fn get(&self, probe: &str) -> Option<f64> {
        self.readings.iter().find(|r| r.probe == probe).map(|r| r.value)
    }
}

// ---------------------------------------------------------------------------
// Rolling record
// ---------------------------------------------------------------------------

/// Samples from the last `window`.
#[derive(Debug)]
pub struct TemperatureRecord {
    window: Duration,
    samples: Deque<TemperatureSample, RECORD_CAPACITY>,
}

impl TemperatureRecord {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Deque::new(),
        }
    }

    pub fn push(&mut self, sample: TemperatureSample) {
        let horizon = sample.time - self.window.as_secs_f64();
        while self.samples.front().is_some_and(|s| s.time < horizon) {
            self.samples.pop_front();
        }
        if self.samples.is_full() {
            self.samples.pop_front();
        }
        // Cannot fail: room was made above.
        let _ = self.samples.push_back(sample);
    }

    /// Mean of `probe` over samples taken at or after `since`.
    pub fn average_since(&self, probe: &str, since: Duration) -> Option<f64> {
        let since = since.as_secs_f64();
        let (sum, n) = self
            .samples
            .iter()
            .filter(|s| s.time >= since)
            .filter_map(|s| s.get(probe))
            .fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
        (n > 0).then(|| sum / f64::from(n))
    }

    pub fn latest(&self) -> Option<&TemperatureSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Probe set
// ---------------------------------------------------------------------------

struct Slot {
    probe: Probe,
    last: Option<f64>,
    fault: Option<Error>,
}

pub struct ProbeSet {
    slots: Vec<Slot, MAX_PROBES>,
    unit: TemperatureUnit,
    interval: Duration,
    last_sampled: Option<Duration>,
    record: TemperatureRecord,
}

impl ProbeSet {
    pub fn new(unit: TemperatureUnit, interval: Duration, window: Duration) -> Self {
        Self {
            slots: Vec::new(),
            unit,
            interval,
            last_sampled: None,
            record: TemperatureRecord::new(window),
        }
    }

    /// Add a probe.  Names must be unique within the set.
    pub fn add(&mut self, probe: Probe) -> Result<()> {
        if self.slots.iter().any(|s| s.probe.name() == probe.name()) {
            return Err(Error::InvalidParameter("duplicate probe name"));
        }
        self.slots
            .push(Slot {
                probe,
                last: None,
                fault: None,
            })
            .map_err(|_| Error::InvalidParameter("too many probes"))
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn contains(&self, probe: &str) -> bool {
        self.slot(probe).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sample every probe if the interval has elapsed since the last sample.
    /// Returns the new sample when one was taken.
    pub fn sample_if_due(&mut self, now: Duration, target: f64) -> Option<&TemperatureSample> {
        if self.last_sampled.is_some_and(|t| now.saturating_sub(t) < self.interval) {
            return None;
        }
        self.last_sampled = Some(now);

        let mut readings = Vec::new();
        for slot in &mut self.slots {
            let result = slot.probe.read(self.unit);
            let latched = slot.probe.fault();
            match (result, latched) {
                (Ok(value), None) => {
                    slot.last = Some(value);
                    slot.fault = None;
                }
                (Ok(value), Some(fault)) => {
                    // The source already substituted its last good value.
                    if slot.last.is_none() {
                        slot.last = Some(value);
                    }
                    slot.fault = Some(fault.into());
                }
                (Err(e), _) => {
                    if slot.fault != Some(e) {
                        warn!("probe {}: {e}", slot.probe.name());
                    }
                    slot.fault = Some(e);
                }
            }
            if let Some(value) = slot.last {
                // Capacity equals MAX_PROBES, same as the slot list.
                let _ = readings.push(ProbeReading {
                    probe: slot.probe.name().into(),
                    value,
                    stale: slot.fault.is_some(),
                });
            }
        }

        let sample = TemperatureSample {
            time: now.as_secs_f64(),
            target,
            readings,
        };
        debug!("sampled {} probes at {:.1}s", sample.readings.len(), sample.time);
        self.record.push(sample);
        self.record.latest()
    }

    /// Last known value of `probe` in the display unit.
    pub fn latest(&self, probe: &str) -> Option<f64> {
        self.reading(probe).ok()
    }

    /// Last known value of `probe`, or why there is none: the probe is not
    /// in the set, or it has not produced a value yet.
    pub fn reading(&self, probe: &str) -> Result<f64> {
        let slot = self
            .slot(probe)
            .ok_or(Error::InvalidParameter("unknown probe"))?;
        slot.last.ok_or(Error::SensorFault(SensorFault::NoReading))
    }

    /// Error from the most recent read of `probe`, if it failed or faulted.
    pub fn fault(&self, probe: &str) -> Option<Error> {
        self.slot(probe).and_then(|s| s.fault)
    }

    /// Sensor faults currently active across all probes.
    pub fn active_faults(&self) -> impl Iterator<Item = (&str, Error)> {
        self.slots
            .iter()
            .filter_map(|s| s.fault.map(|f| (s.probe.name(), f)))
    }

    pub fn average_since(&self, probe: &str, since: Duration) -> Option<f64> {
        self.record.average_since(probe, since)
    }

    pub fn record(&self) -> &TemperatureRecord {
        &self.record
    }

    fn slot(&self, probe: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.probe.name() == probe)
    }
}
