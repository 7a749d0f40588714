//! Integration tests for the backend worker and the control-loop runner.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use serde_json::{Value, json};
use smokectl::adapters::backend_worker::BackendWorker;
use smokectl::app::channels::SmokerChannels;
use smokectl::app::commands::ParameterChange;
use smokectl::app::runner;
use smokectl::app::service::AppService;
use smokectl::config::SmokerConfig;
use smokectl::fsm::SmokerMode;
use smokectl::program::{ProgramStep, Steps, Trigger};
use smokectl::Error;

use super::mock_hw::{MockBackend, RecordingRelays, RecordingSink, RelayCall, SimClock, smoker_probes};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

struct Loop {
    app: AppService,
    relays: RecordingRelays,
    sink: RecordingSink,
    channels: SmokerChannels,
}

impl Loop {
    fn new() -> Self {
        let (probes, _, _) = smoker_probes(150.0, 40.0);
        let mut l = Self {
            app: AppService::new(SmokerConfig::default(), probes, Duration::ZERO).unwrap(),
            relays: RecordingRelays::new(),
            sink: RecordingSink::new(),
            channels: SmokerChannels::new(),
        };
        l.app
            .start(Duration::ZERO, &mut l.relays, &mut l.sink, &l.channels)
            .unwrap();
        l
    }

    fn tick(&mut self, t: Duration) {
        self.app
            .tick(t, &mut self.relays, &mut self.sink, &self.channels)
            .unwrap();
    }
}

// ── Backend worker ───────────────────────────────────────────

#[test]
fn remote_parameter_edits_reach_the_service() {
    let mut l = Loop::new();
    let mut worker = BackendWorker::new(MockBackend::new());
    worker.poll(secs(0), &l.channels);
    assert_eq!(worker.backend().written_parameters.len(), 1);
    assert_eq!(worker.backend().parameters["mode"], "Off");
    assert!(l.channels.drain_changes().is_empty());

    let params = &mut worker.backend_mut().parameters;
    params.insert("mode".into(), Value::from("Smoke"));
    params.insert("target".into(), json!(250.0));
    worker.poll(secs(3), &l.channels);

    l.tick(secs(4));
    assert_eq!(l.app.mode(), SmokerMode::Smoke);
    assert!((l.app.target() - 250.0).abs() < 1e-9);

    // Our own write comes back unchanged: nothing more to forward.
    worker.poll(secs(6), &l.channels);
    assert!(l.channels.drain_changes().is_empty());
}

#[test]
fn parameters_are_polled_every_three_seconds() {
    let l = Loop::new();
    let mut worker = BackendWorker::new(MockBackend::new());
    worker.poll(secs(0), &l.channels);
    worker.backend_mut().parameters.insert("PMode".into(), json!(5.0));

    worker.poll(Duration::from_millis(2900), &l.channels);
    assert!(l.channels.drain_changes().is_empty());
    worker.poll(secs(3), &l.channels);
    assert_eq!(l.channels.drain_changes().as_slice(), &[ParameterChange::PMode(5.0)]);
}

#[test]
fn local_change_is_not_undone_by_the_next_read() {
    let mut l = Loop::new();
    let mut worker = BackendWorker::new(MockBackend::new());
    worker.poll(secs(0), &l.channels);

    assert!(l.channels.submit(ParameterChange::TargetStep(5.0)));
    l.tick(secs(1));
    worker.poll(secs(3), &l.channels);
    assert!(l.channels.drain_changes().is_empty());
    assert!((l.app.target() - 230.0).abs() < 1e-9);
}

#[test]
fn enabling_program_remotely_fetches_and_runs_it() {
    let mut l = Loop::new();
    let mut backend = MockBackend::new();
    let mut steps = Steps::new();
    steps
        .push(ProgramStep {
            mode: SmokerMode::Smoke,
            target: 180.0,
            trigger: Trigger::Time(3600.0),
        })
        .unwrap();
    backend.stored_program = Some(steps);
    let mut worker = BackendWorker::new(backend);
    worker.poll(secs(0), &l.channels);

    worker.backend_mut().parameters.insert("program".into(), json!(true));
    worker.poll(secs(3), &l.channels);
    l.tick(secs(3));
    worker.poll(secs(4), &l.channels);
    l.tick(secs(4));

    assert!(l.app.program().is_active());
    assert_eq!(l.app.mode(), SmokerMode::Smoke);
    assert_eq!(worker.backend().program_reads, 1);

    worker.poll(secs(5), &l.channels);
    assert_eq!(worker.backend().programs.last().map(Vec::len), Some(1));
    assert_eq!(worker.backend().parameters["program"], true);
}

#[test]
fn backend_failures_are_contained() {
    let mut l = Loop::new();
    let mut backend = MockBackend::new();
    backend.fail = true;
    let mut worker = BackendWorker::new(backend);
    l.tick(secs(0));
    worker.poll(secs(0), &l.channels);
    assert!(l.channels.next_request().is_none());
    assert!(l.channels.drain_changes().is_empty());
    assert!(worker.backend().written_parameters.is_empty());
}

// ── Runner ───────────────────────────────────────────────────

#[test]
fn runner_ticks_until_stopped_then_turns_relays_off() {
    let mut l = Loop::new();
    let stop = AtomicBool::new(false);
    let clock = SimClock::new(secs(1), &stop);
    l.channels.submit(ParameterChange::Mode(SmokerMode::Smoke));

    runner::run(&mut l.app, &mut l.relays, &mut l.sink, &clock, &l.channels, &stop).unwrap();

    assert_eq!(l.app.tick_count(), 20);
    assert_eq!(clock.elapsed(), secs(1));
    assert!(clock.sleeps.borrow().iter().all(|d| *d == Duration::from_millis(50)));
    assert_eq!(l.relays.last_call(), Some(&RelayCall::AllOff));
    assert!(l.relays.count(RelayCall::Set(smokectl::relays::Relay::Fan, true)) >= 1);
}

#[test]
fn runner_turns_relays_off_when_a_tick_fails() {
    let mut l = Loop::new();
    let stop = AtomicBool::new(false);
    let clock = SimClock::new(secs(10), &stop);
    l.relays.fail_after = Some(l.relays.calls.len());
    l.channels.submit(ParameterChange::Mode(SmokerMode::Smoke));

    let result = runner::run(&mut l.app, &mut l.relays, &mut l.sink, &clock, &l.channels, &stop);

    assert!(matches!(result, Err(Error::Pin(_))));
    assert_eq!(l.relays.last_call(), Some(&RelayCall::AllOff));
}
