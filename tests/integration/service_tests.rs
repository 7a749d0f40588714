//! Integration tests for the probe → AppService → FSM → relays pipeline.
//!
//! Time is injected, so hours of cooking run in milliseconds.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use smokectl::app::channels::{BackendRequest, SmokerChannels};
use smokectl::app::commands::ParameterChange;
use smokectl::app::events::AppEvent;
use smokectl::app::service::AppService;
use smokectl::config::SmokerConfig;
use smokectl::fsm::SmokerMode;
use smokectl::program::{ProgramStep, Steps, Trigger};
use smokectl::relays::Relay;
use smokectl::sensors::hub::ProbeSet;
use smokectl::sensors::{Probe, RtdType, TemperatureUnit};
use smokectl::{Error, SafetyFault, SensorFault};

use super::mock_hw::{RecordingRelays, RecordingSink, RelayCall, SimRtd};

struct Rig {
    app: AppService,
    relays: RecordingRelays,
    sink: RecordingSink,
    channels: SmokerChannels,
    grill: Rc<Cell<f64>>,
    grill_fail: Rc<Cell<bool>>,
    meat: Rc<Cell<f64>>,
}

impl Rig {
    fn new(grill_f: f64) -> Self {
        let config = SmokerConfig::default();
        let mut probes = ProbeSet::new(TemperatureUnit::Fahrenheit, Duration::from_secs(3), Duration::from_secs(60));
        let (grill_src, grill, grill_fail) = SimRtd::new(grill_f);
        let (meat_src, meat, _) = SimRtd::new(40.0);
        probes.add(Probe::rtd("grill", RtdType::Pt100, Box::new(grill_src)).unwrap()).unwrap();
        probes.add(Probe::rtd("meat", RtdType::Pt100, Box::new(meat_src)).unwrap()).unwrap();

        let mut rig = Self {
            app: AppService::new(config, probes, Duration::ZERO).unwrap(),
            relays: RecordingRelays::new(),
            sink: RecordingSink::new(),
            channels: SmokerChannels::new(),
            grill,
            grill_fail,
            meat,
        };
        rig.app
            .start(Duration::ZERO, &mut rig.relays, &mut rig.sink, &rig.channels)
            .unwrap();
        rig
    }

    fn submit(&self, change: ParameterChange) {
        assert!(self.channels.submit(change));
    }

    fn tick(&mut self, t: Duration) {
        self.app
            .tick(t, &mut self.relays, &mut self.sink, &self.channels)
            .unwrap();
    }

    /// Tick once per second over `from..=to` (seconds).
    fn run_secs(&mut self, from: u64, to: u64) {
        for s in from..=to {
            self.tick(Duration::from_secs(s));
        }
    }

    fn requests(&self) -> Vec<BackendRequest> {
        std::iter::from_fn(|| self.channels.next_request()).collect()
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ── Startup ──────────────────────────────────────────────────

#[test]
fn starts_off_with_relays_driven_low() {
    let rig = Rig::new(70.0);
    assert_eq!(rig.app.mode(), SmokerMode::Off);
    assert!(rig.sink.contains(&AppEvent::Started(SmokerMode::Off)));
    for relay in Relay::ALL {
        assert_eq!(rig.relays.count(RelayCall::Set(relay, false)), 1);
    }
    let requests = rig.requests();
    assert!(matches!(requests.as_slice(), [BackendRequest::WriteParameters(p)] if p.mode == SmokerMode::Off));
}

#[test]
fn mismatched_probe_unit_rejected() {
    let probes = ProbeSet::new(TemperatureUnit::Celsius, Duration::from_secs(3), Duration::from_secs(60));
    let err = AppService::new(SmokerConfig::default(), probes, Duration::ZERO).err();
    assert!(matches!(err, Some(Error::InvalidParameter(_))));
}

#[test]
fn missing_primary_probe_rejected() {
    let probes = ProbeSet::new(TemperatureUnit::Fahrenheit, Duration::from_secs(3), Duration::from_secs(60));
    assert!(AppService::new(SmokerConfig::default(), probes, Duration::ZERO).is_err());
}

// ── Safety ───────────────────────────────────────────────────

#[test]
fn igniter_ceiling_forces_shutdown_then_off() {
    let mut rig = Rig::new(70.0);
    rig.submit(ParameterChange::Mode(SmokerMode::Start));
    rig.tick(Duration::ZERO);
    assert_eq!(rig.app.mode(), SmokerMode::Start);
    assert!(rig.relays.is_on(Relay::Igniter));

    // Cold grill: Start never hands over, the igniter stays on.
    rig.run_secs(1, 1200);
    assert_eq!(rig.app.mode(), SmokerMode::Start);
    assert!(rig.relays.is_on(Relay::Igniter));
    assert_eq!(rig.app.fault_flags(), 0);

    rig.tick(Duration::from_secs(1201));
    assert_eq!(rig.app.mode(), SmokerMode::Shutdown);
    assert!(!rig.relays.is_on(Relay::Igniter));
    assert!(!rig.relays.is_on(Relay::Auger));
    assert!(rig.relays.is_on(Relay::Fan));
    assert_ne!(rig.app.fault_flags() & SafetyFault::IgniterTimeout.mask(), 0);
    assert!(rig.sink.contains(&AppEvent::FaultDetected {
        flags: SafetyFault::IgniterTimeout.mask(),
        cause: Error::SafetyInterlock(SafetyFault::IgniterTimeout),
    }));
    assert!(rig.sink.contains(&AppEvent::StateChanged {
        from: SmokerMode::Start,
        to: SmokerMode::Shutdown,
    }));

    // Igniter off: the fault clears on the next evaluation.
    rig.tick(Duration::from_secs(1202));
    assert_eq!(rig.app.fault_flags(), 0);
    assert!(rig.sink.contains(&AppEvent::FaultCleared));

    // Fan runs on for 600 s, then everything is off.
    rig.run_secs(1203, 1800);
    assert_eq!(rig.app.mode(), SmokerMode::Shutdown);
    rig.tick(Duration::from_secs(1801));
    assert_eq!(rig.app.mode(), SmokerMode::Off);
    assert!(Relay::ALL.iter().all(|r| !rig.relays.is_on(*r)));
}

#[test]
fn mode_change_in_the_tripping_tick_cannot_veto_shutdown() {
    let mut rig = Rig::new(70.0);
    rig.submit(ParameterChange::Mode(SmokerMode::Ignite));
    rig.tick(Duration::ZERO);
    rig.run_secs(1, 1200);
    assert_eq!(rig.app.mode(), SmokerMode::Ignite);

    rig.submit(ParameterChange::Mode(SmokerMode::Start));
    rig.tick(Duration::from_secs(1201));
    assert_eq!(rig.app.mode(), SmokerMode::Shutdown);
    assert!(!rig.relays.is_on(Relay::Igniter));
}

#[test]
fn shutdown_runs_fan_for_600_seconds() {
    let mut rig = Rig::new(300.0);
    rig.tick(Duration::ZERO);
    rig.submit(ParameterChange::Mode(SmokerMode::Shutdown));
    rig.tick(Duration::from_secs(10));
    assert!(rig.relays.is_on(Relay::Fan));

    rig.run_secs(11, 609);
    assert_eq!(rig.app.mode(), SmokerMode::Shutdown);
    rig.tick(Duration::from_secs(610));
    assert_eq!(rig.app.mode(), SmokerMode::Off);
    assert!(!rig.relays.is_on(Relay::Fan));
}

// ── Hold ─────────────────────────────────────────────────────

#[test]
fn hold_asserts_igniter_after_an_auger_cycle() {
    let mut rig = Rig::new(150.0);
    rig.submit(ParameterChange::Mode(SmokerMode::Hold));
    rig.submit(ParameterChange::Target(150.0));
    rig.tick(Duration::ZERO);
    assert_eq!(rig.app.mode(), SmokerMode::Hold);
    // At the set point the PID sits at its bias.
    assert!((rig.app.u() - 0.5).abs() < 1e-3);
    assert!(rig.relays.is_on(Relay::Auger));
    assert!(!rig.relays.is_on(Relay::Igniter));

    // The fire dies mid-cycle; nothing happens until the auger toggles.
    rig.grill.set(90.0);
    rig.run_secs(1, 9);
    assert_eq!(rig.app.readings().primary.map(f64::round), Some(90.0));
    assert!(!rig.relays.is_on(Relay::Igniter));

    rig.run_secs(10, 11);
    assert!(!rig.relays.is_on(Relay::Auger));
    assert!(rig.relays.is_on(Relay::Igniter));
}

#[test]
fn hold_publishes_control_telemetry_once_per_cycle() {
    let mut rig = Rig::new(200.0);
    rig.submit(ParameterChange::Mode(SmokerMode::Hold));
    let mut control = Vec::new();
    for s in 0..40 {
        rig.tick(Duration::from_secs(s));
        control.extend(rig.requests().into_iter().filter_map(|r| match r {
            BackendRequest::WriteControl(c) => Some(c),
            _ => None,
        }));
    }
    let times: Vec<f64> = control.iter().map(|c| c.time).collect();
    assert_eq!(times, vec![0.0, 20.0]);
    // 25 below target with PB 60.
    assert!((control[0].pid.p - 25.0 / 60.0).abs() < 1e-3);
}

#[test]
fn start_hands_over_to_hold_when_grill_heats() {
    let mut rig = Rig::new(70.0);
    rig.submit(ParameterChange::Mode(SmokerMode::Start));
    rig.tick(Duration::ZERO);
    rig.grill.set(116.0);
    rig.run_secs(1, 3);
    assert_eq!(rig.app.mode(), SmokerMode::Hold);
    assert_eq!(rig.sink.state_changes().last(), Some(&(SmokerMode::Start, SmokerMode::Hold)));
}

// ── Parameter batches ────────────────────────────────────────

#[test]
fn batch_applies_target_steps_cumulatively() {
    let mut rig = Rig::new(70.0);
    rig.submit(ParameterChange::Target(250.0));
    rig.submit(ParameterChange::TargetStep(5.0));
    rig.submit(ParameterChange::TargetStep(5.0));
    rig.tick(Duration::ZERO);
    assert!(approx(rig.app.target(), 260.0));
}

#[test]
fn pmode_change_reenters_smoke() {
    let mut rig = Rig::new(150.0);
    rig.submit(ParameterChange::Mode(SmokerMode::Smoke));
    rig.tick(Duration::ZERO);
    assert!(approx(rig.app.cycle_secs(), 80.0));

    rig.submit(ParameterChange::PModeStep(2.0));
    rig.tick(Duration::from_secs(1));
    assert!(approx(rig.app.pmode(), 4.0));
    assert!(approx(rig.app.cycle_secs(), 100.0));
    assert!(approx(rig.app.u(), 0.15));
}

#[test]
fn pmode_out_of_range_rejected() {
    let mut rig = Rig::new(150.0);
    rig.submit(ParameterChange::PMode(12.0));
    rig.submit(ParameterChange::Pb(-1.0));
    rig.tick(Duration::ZERO);
    assert!(approx(rig.app.pmode(), 2.0));
    assert!(approx(rig.app.gains().pb, 60.0));
}

#[test]
fn gains_change_is_published() {
    let mut rig = Rig::new(150.0);
    rig.tick(Duration::ZERO);
    rig.requests();
    rig.submit(ParameterChange::Pb(40.0));
    rig.submit(ParameterChange::Ti(0.0));
    rig.tick(Duration::from_millis(50));
    let gains = rig.app.gains();
    assert!(approx(gains.pb, 40.0));
    assert!(approx(gains.ti, 0.0));
    assert!(approx(gains.td, 45.0));
    assert!(
        rig.requests()
            .iter()
            .any(|r| matches!(r, BackendRequest::WriteParameters(p) if approx(p.pb, 40.0)))
    );
}

// ── Programs ─────────────────────────────────────────────────

fn two_step_program() -> Steps {
    let mut steps = Steps::new();
    steps
        .push(ProgramStep {
            mode: SmokerMode::Smoke,
            target: 180.0,
            trigger: Trigger::Time(1.0),
        })
        .unwrap();
    steps
        .push(ProgramStep {
            mode: SmokerMode::Hold,
            target: 225.0,
            trigger: Trigger::MeatTemp(203.0),
        })
        .unwrap();
    steps
}

#[test]
fn two_step_program_advances_on_time_trigger() {
    let mut rig = Rig::new(150.0);
    rig.submit(ParameterChange::LoadProgram(two_step_program()));
    rig.tick(Duration::ZERO);
    assert_eq!(rig.app.mode(), SmokerMode::Smoke);
    assert!(approx(rig.app.target(), 180.0));
    assert!(rig.app.program().is_active());

    rig.tick(Duration::from_millis(500));
    assert_eq!(rig.app.mode(), SmokerMode::Smoke);

    rig.tick(Duration::from_millis(1000));
    assert_eq!(rig.app.mode(), SmokerMode::Hold);
    assert!(approx(rig.app.target(), 225.0));
    assert_eq!(rig.app.program().len(), 1);
    assert!(rig.sink.contains(&AppEvent::ProgramAdvanced {
        mode: SmokerMode::Hold,
        target: 225.0,
        remaining: 1,
    }));

    let written: Vec<usize> = rig
        .requests()
        .into_iter()
        .filter_map(|r| match r {
            BackendRequest::WriteProgram(steps) => Some(steps.len()),
            _ => None,
        })
        .collect();
    assert_eq!(written, vec![2, 1]);
}

#[test]
fn meat_trigger_finishes_program_and_keeps_mode() {
    let mut rig = Rig::new(150.0);
    rig.submit(ParameterChange::LoadProgram(two_step_program()));
    rig.tick(Duration::ZERO);
    rig.tick(Duration::from_secs(1));
    assert_eq!(rig.app.mode(), SmokerMode::Hold);

    rig.meat.set(204.0);
    rig.run_secs(2, 4);
    assert!(!rig.app.program().is_active());
    assert_eq!(rig.app.mode(), SmokerMode::Hold);
    assert!(approx(rig.app.target(), 225.0));
    assert!(rig.sink.contains(&AppEvent::ProgramFinished));
    assert!(!rig.app.display_state().program_active);
}

#[test]
fn identical_program_reload_is_ignored() {
    let mut rig = Rig::new(150.0);
    rig.submit(ParameterChange::LoadProgram(two_step_program()));
    rig.tick(Duration::ZERO);
    rig.requests();

    let mut remaining = two_step_program();
    remaining.remove(0);
    rig.tick(Duration::from_secs(1));
    rig.requests();
    rig.submit(ParameterChange::LoadProgram(remaining));
    rig.tick(Duration::from_secs(2));
    assert!(
        !rig.requests()
            .iter()
            .any(|r| matches!(r, BackendRequest::WriteProgram(_)))
    );
    assert_eq!(rig.app.program().len(), 1);
}

#[test]
fn enabling_program_requests_it_once() {
    let mut rig = Rig::new(150.0);
    rig.tick(Duration::ZERO);
    rig.requests();
    rig.submit(ParameterChange::ProgramEnabled(true));
    rig.tick(Duration::from_secs(1));
    rig.submit(ParameterChange::ProgramEnabled(true));
    rig.tick(Duration::from_secs(2));
    let reads = rig
        .requests()
        .iter()
        .filter(|r| matches!(r, BackendRequest::ReadProgram))
        .count();
    assert_eq!(reads, 1);
}

#[test]
fn safety_trip_stops_program() {
    let mut rig = Rig::new(70.0);
    let mut steps = Steps::new();
    steps
        .push(ProgramStep {
            mode: SmokerMode::Ignite,
            target: 225.0,
            trigger: Trigger::Time(5000.0),
        })
        .unwrap();
    rig.submit(ParameterChange::LoadProgram(steps));
    rig.tick(Duration::ZERO);
    rig.run_secs(1, 1201);
    assert_eq!(rig.app.mode(), SmokerMode::Shutdown);
    assert!(!rig.app.program().is_active());
}

// ── Sensors ──────────────────────────────────────────────────

#[test]
fn failed_probe_keeps_last_value_and_is_reported() {
    let mut rig = Rig::new(180.0);
    rig.tick(Duration::ZERO);
    rig.grill_fail.set(true);
    rig.grill.set(500.0);
    rig.tick(Duration::from_secs(3));
    let display = rig.app.display_state();
    assert_eq!(display.primary.map(f64::round), Some(180.0));
    assert_eq!(display.stale_probes, 1);
    assert_eq!(rig.channels.take_display(), Some(display));
}

#[test]
fn probe_dead_from_boot_has_no_reading() {
    let mut rig = Rig::new(180.0);
    rig.grill_fail.set(true);
    rig.submit(ParameterChange::Mode(SmokerMode::Smoke));
    rig.tick(Duration::ZERO);
    assert_eq!(rig.app.readings().primary, None);
    assert_eq!(
        rig.app.probes().reading("grill"),
        Err(Error::SensorFault(SensorFault::NoReading))
    );
    assert_eq!(rig.app.display_state().primary, None);
    // Without a grill temperature the igniter gate holds its state.
    assert!(!rig.relays.is_on(Relay::Igniter));
}

#[test]
fn samples_are_posted_with_target() {
    let mut rig = Rig::new(180.0);
    rig.requests();
    rig.tick(Duration::ZERO);
    rig.tick(Duration::from_secs(1));
    rig.tick(Duration::from_secs(3));
    let samples: Vec<_> = rig
        .requests()
        .into_iter()
        .filter_map(|r| match r {
            BackendRequest::PostTemperatures(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(samples.len(), 2);
    assert!(approx(samples[0].target, 225.0));
    assert!(samples[1].get("meat").is_some());
}

#[test]
fn relay_port_only_sees_changes() {
    let mut rig = Rig::new(150.0);
    rig.submit(ParameterChange::Mode(SmokerMode::Smoke));
    rig.tick(Duration::ZERO);
    let after_entry = rig.relays.calls.len();
    rig.run_secs(1, 10);
    // Auger stays on for 15 s: nothing new to write.
    assert_eq!(rig.relays.calls.len(), after_entry);
}

#[test]
fn relay_error_propagates() {
    let mut rig = Rig::new(150.0);
    rig.relays.fail_after = Some(rig.relays.calls.len());
    rig.submit(ParameterChange::Mode(SmokerMode::Smoke));
    let err = rig
        .app
        .tick(Duration::ZERO, &mut rig.relays, &mut rig.sink, &rig.channels)
        .err();
    assert!(matches!(err, Some(Error::Pin(_))));
}
