//! Bus-to-temperature tests: scripted SPI replies through a driver, its
//! signal source and a probe, into the probe set.

use std::time::Duration;

use embedded_hal::spi::{MODE_0, MODE_1};
use smokectl::drivers::BusSettings;
use smokectl::drivers::max31865::{Max31865, Max31865Config, RtdFaultSet};
use smokectl::drivers::mcp320x::{Input, Mcp320x, Mcp320xConfig};
use smokectl::sensors::hub::ProbeSet;
use smokectl::sensors::sources::{Mcp320xInput, RtdInput, share};
use smokectl::sensors::{Probe, RtdType, Signal, SignalSource, TemperatureUnit};
use smokectl::{Error, SensorFault};

use super::mock_hw::{NoDelay, ScriptedSpi};

fn max31865(spi: ScriptedSpi) -> Max31865<ScriptedSpi, NoDelay> {
    Max31865::new(spi, NoDelay, BusSettings::new(MODE_1, 1_000_000), Max31865Config::default()).unwrap()
}

#[test]
fn pt100_at_100_ohms_reads_freezing() {
    // Config write, then one burst read of 7620 counts.
    let spi = ScriptedSpi::new().reply(&[0, 0]).reply(&[0, 0x3B, 0x88]);
    let sent = spi.sent.clone();
    let dev = share(max31865(spi));
    let mut probe = Probe::rtd("grill", RtdType::Pt100, Box::new(RtdInput::new(dev))).unwrap();

    let t = probe.read_celsius().unwrap();
    assert!(t.abs() < 0.1, "got {t}");
    let sent = sent.borrow();
    assert_eq!(sent[0][0], 0x80, "configuration write first");
    assert_eq!(sent[1], vec![0x01, 0, 0]);
}

#[test]
fn rtd_fault_keeps_last_value_and_marks_sample_stale() {
    let spi = ScriptedSpi::new()
        .reply(&[0, 0])
        // 138.51 ohm, about 212 F.
        .reply(&[0, 0x52, 0x76])
        // Same word with the fault bit, then the status register.
        .reply(&[0, 0x52, 0x77])
        .reply(&[0, RtdFaultSet::HIGH_THRESHOLD]);
    let sent = spi.sent.clone();
    let dev = share(max31865(spi));
    let mut set = ProbeSet::new(TemperatureUnit::Fahrenheit, Duration::from_secs(3), Duration::from_secs(60));
    set.add(Probe::rtd("grill", RtdType::Pt100, Box::new(RtdInput::new(dev))).unwrap())
        .unwrap();

    let first = set.sample_if_due(Duration::ZERO, 225.0).unwrap().get("grill").unwrap();
    assert!((first - 212.0).abs() < 0.1, "got {first}");
    assert!(set.fault("grill").is_none());

    let sample = set.sample_if_due(Duration::from_secs(3), 225.0).unwrap();
    assert!(sample.readings[0].stale);
    assert!((sample.readings[0].value - first).abs() < 1e-9);
    assert_eq!(
        set.fault("grill"),
        Some(Error::SensorFault(SensorFault::Rtd(RtdFaultSet::from_bits(RtdFaultSet::HIGH_THRESHOLD))))
    );
    // Status read, then the fault is cleared by rewriting the configuration.
    let sent = sent.borrow();
    assert_eq!(sent[3], vec![0x07, 0]);
    assert_eq!(sent[4][0], 0x80);
}

#[test]
fn mcp3208_input_yields_volts() {
    // Half scale on channel 0.
    let spi = ScriptedSpi::new().reply(&[0, 0x08, 0x00]);
    let sent = spi.sent.clone();
    let dev = share(Mcp320x::new(spi, BusSettings::new(MODE_0, 1_000_000), Mcp320xConfig::default()).unwrap());
    let mut input = Mcp320xInput::new(dev, Input::Single(0));

    assert_eq!(input.sample().unwrap(), Signal::Volts(1.65));
    assert_eq!(sent.borrow()[0], vec![0b110, 0, 0]);
}
