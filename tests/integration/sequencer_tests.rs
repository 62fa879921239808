//! End-to-end runs of the sequencer against the mock rig on a virtual
//! clock: phase order, verdicts, safety aborts and run refusal.

use std::time::Duration;

use leaktester::adapters::log_sink::LogEventSink;
use leaktester::adapters::sim::SimClock;
use leaktester::app::events::{RunEvent, RunWarning};
use leaktester::app::ports::{Clock, EventSink, ValveId};
use leaktester::app::sequencer::Sequencer;
use leaktester::config::TestConfig;
use leaktester::error::{Error, Result, RunFault};
use leaktester::fsm::TestPhase;
use leaktester::fsm::context::{TestResult, TestRun};
use leaktester::safety::SafetyTrip;

use crate::mock_rig::{MockRig, PASS_PHASES, RecordingSink, RigCall, config, rig};

fn assert_chain_is_continuous(sink: &RecordingSink) {
    let mut current = TestPhase::Ready;
    for event in &sink.events {
        if let RunEvent::PhaseChanged { from, to } = event {
            assert_eq!(*from, current, "transition {from} -> {to} skips a phase");
            current = *to;
        }
    }
}

// ── Happy path ────────────────────────────────────────────────

#[test]
fn tight_dut_passes_through_every_phase() {
    let (mut clock, mut rig) = rig();
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());

    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.result, TestResult::Pass);
    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(sink.phases(), PASS_PHASES);
    assert_chain_is_continuous(&sink);
    assert!(run.fault.is_none());
    assert!(run.safety_trip.is_none());
    assert!(run.cleanup_faults.is_empty());
    assert!(rig.state.is_idle());
}

#[test]
fn actuator_commands_follow_the_cycle() {
    let (mut clock, mut rig) = rig();
    let seq = Sequencer::new(config());
    seq.run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(
        rig.calls,
        [
            RigCall::Extend,
            RigCall::Stop,
            RigCall::Open(ValveId::Fill),
            RigCall::Close(ValveId::Fill),
            RigCall::CloseAll,
            RigCall::Close(ValveId::Fill),
            RigCall::Open(ValveId::Exhaust),
            RigCall::Close(ValveId::Exhaust),
            RigCall::Retract,
            RigCall::Stop,
        ]
    );
}

#[test]
fn decay_window_is_sampled_at_one_hertz() {
    let (mut clock, mut rig) = rig();
    let seq = Sequencer::new(config());
    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(run.samples.len(), 31);
    assert_eq!(run.samples[0].elapsed_s, 0.0);
    assert_eq!(run.samples[30].elapsed_s, 30.0);
    assert!(
        run.samples
            .windows(2)
            .all(|w| w[0].elapsed_s < w[1].elapsed_s)
    );
}

#[test]
fn run_takes_the_nominal_time() {
    let (mut clock, mut rig) = rig();
    let seq = Sequencer::new(config());
    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    // extend + fill + stabilise + test + exhaust + retract
    assert_eq!(run.duration_s, 56.0);
    assert_eq!(clock.now(), Duration::from_secs(56));
}

#[test]
fn metrics_come_from_the_window_endpoints() {
    let (mut clock, rig) = rig();
    let mut rig = rig.with_leak(0.002);
    let seq = Sequencer::new(config());
    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    let start = run.start_pressure_psi.unwrap();
    let end = run.end_pressure_psi.unwrap();
    assert_eq!(start, run.samples[0].pressure_psi);
    assert_eq!(end, run.samples[30].pressure_psi);
    assert!((run.pressure_drop_psi.unwrap() - 0.06).abs() < 1e-9);
    assert!((run.leak_rate_psi_per_s.unwrap() - 0.002).abs() < 1e-9);
    assert!((run.decay_slope_psi_per_s.unwrap() + 0.002).abs() < 1e-9);
    assert!(run.leak_rate_sccm.unwrap() > 0.0);
    assert_eq!(run.max_pressure_psi, Some(0.8));
}

#[test]
fn finished_is_last_and_emitted_once() {
    let (mut clock, mut rig) = rig();
    let mut sink = (LogEventSink::new(), RecordingSink::new());
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    let recorded = &sink.1;
    assert_eq!(recorded.finished_count(), 1);
    match recorded.events.last() {
        Some(RunEvent::Finished { result, summary }) => {
            assert_eq!(*result, run.result);
            assert_eq!(summary.final_phase, TestPhase::Complete);
            assert_eq!(summary.samples, 31);
            assert_eq!(summary.leak_rate_psi_per_s, run.leak_rate_psi_per_s);
        }
        other => panic!("expected Finished last, got {other:?}"),
    }
}

// ── Verdicts ──────────────────────────────────────────────────

#[test]
fn leaky_dut_fails() {
    let (mut clock, rig) = rig();
    let mut rig = rig.with_leak(0.01);
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.result, TestResult::Fail);
    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(sink.phases(), PASS_PHASES);
    assert!(run.leak_rate_psi_per_s.unwrap() > seq.config().max_leak_rate);
}

#[test]
fn underfill_warns_but_still_tests() {
    let (mut clock, rig) = rig();
    let mut rig = rig.with_fill(0.5);
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.result, TestResult::Pass);
    assert_eq!(run.warnings.len(), 1);
    let RunWarning::Underfill {
        pressure_psi,
        minimum_psi,
    } = run.warnings[0];
    assert_eq!(pressure_psi, 0.5);
    assert!((minimum_psi - 0.75).abs() < 1e-12);
    assert!(
        sink.events
            .iter()
            .any(|e| matches!(e, RunEvent::Warning(RunWarning::Underfill { .. })))
    );
}

// ── Safety aborts ─────────────────────────────────────────────

#[test]
fn overpressure_while_stabilizing_cleans_up_and_completes() {
    let (mut clock, rig) = rig();
    let mut rig = rig.with_fill(1.5);
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.result, TestResult::Error);
    assert_eq!(run.phase, TestPhase::Complete);
    assert!(matches!(
        run.fault,
        Some(RunFault::SafetyLimitExceeded { pressure_psi, limit_psi })
            if pressure_psi == 1.5 && limit_psi == 1.2
    ));
    assert_eq!(
        sink.phases(),
        [
            TestPhase::ExtendingCylinders,
            TestPhase::FillingDUT,
            TestPhase::Stabilizing,
            TestPhase::Exhausting,
            TestPhase::RetractingCylinders,
            TestPhase::Complete,
        ]
    );
    let trip = SafetyTrip {
        phase: TestPhase::Stabilizing,
        pressure_psi: 1.5,
    };
    assert_eq!(run.safety_trip, Some(trip));
    assert!(sink.events.iter().any(|e| matches!(
        e,
        RunEvent::Finished { result: TestResult::Error, summary }
            if summary.final_phase == TestPhase::Complete
                && summary.safety_trip == Some(trip)
    )));
    // No stabilise time spent: extend + fill + exhaust + retract.
    assert_eq!(run.duration_s, 16.0);
    // De-energise first, then the normal cleanup commands.
    assert_eq!(
        &rig.calls[4..],
        [
            RigCall::CloseAll,
            RigCall::Stop,
            RigCall::Close(ValveId::Fill),
            RigCall::Open(ValveId::Exhaust),
            RigCall::Close(ValveId::Exhaust),
            RigCall::Retract,
            RigCall::Stop,
        ]
    );
    assert_eq!(run.max_pressure_psi, Some(1.5));
}

#[test]
fn overpressure_while_testing_stops_sampling() {
    let (mut clock, mut rig) = rig();
    // Testing starts at 18 s.
    rig.surge = Some((Duration::from_secs(25), 2.0));
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(run.result, TestResult::Error);
    assert_eq!(run.samples.len(), 7);
    assert_eq!(run.duration_s, 33.0);
    assert!(matches!(
        run.safety_trip,
        Some(SafetyTrip { phase: TestPhase::Testing, pressure_psi }) if pressure_psi == 2.0
    ));
    assert!(run.leak_rate_psi_per_s.is_none());
    assert!(sink.events.iter().any(|e| matches!(
        e,
        RunEvent::Fault {
            phase: TestPhase::Testing,
            fault: RunFault::SafetyLimitExceeded { .. },
            during_cleanup: false,
        }
    )));
}

#[test]
fn pressure_at_the_limit_is_safe() {
    let (mut clock, rig) = rig();
    let mut rig = rig.with_fill(1.2).with_leak(0.0);
    let seq = Sequencer::new(config());
    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();
    assert_eq!(run.result, TestResult::Pass);
    assert_eq!(run.phase, TestPhase::Complete);
}

// ── Refusals ──────────────────────────────────────────────────

#[test]
fn invalid_config_is_refused_before_anything_moves() {
    let (mut clock, mut rig) = rig();
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(TestConfig {
        test_duration: 0.0,
        ..config()
    });

    let refused = seq.run(&mut rig, &mut clock, &mut sink);

    assert!(matches!(
        refused,
        Err(Error::Run(RunFault::ConfigurationInvalid(_)))
    ));
    assert!(rig.calls.is_empty());
    assert!(sink.phases().is_empty());
    assert_eq!(sink.finished_count(), 0);
    assert!(matches!(
        sink.events.as_slice(),
        [RunEvent::Fault {
            phase: TestPhase::Ready,
            fault: RunFault::ConfigurationInvalid(_),
            during_cleanup: false,
        }]
    ));
}

#[test]
fn pressurised_time_over_timeout_is_refused() {
    let (mut clock, mut rig) = rig();
    let seq = Sequencer::new(TestConfig {
        pressure_timeout: 20.0,
        ..config()
    });
    assert!(
        seq.run(&mut rig, &mut clock, &mut RecordingSink::new())
            .is_err()
    );
    assert!(rig.calls.is_empty());
}

#[test]
fn unholdable_test_window_is_refused_before_filling() {
    let (mut clock, mut rig) = rig();
    let seq = Sequencer::new(TestConfig {
        test_duration: 1e20,
        pressure_timeout: 1e21,
        ..config()
    });

    let refused = seq.run(&mut rig, &mut clock, &mut RecordingSink::new());

    assert!(matches!(
        refused,
        Err(Error::Run(RunFault::ConfigurationInvalid(_)))
    ));
    assert!(rig.calls.is_empty());
    assert_eq!(clock.now(), Duration::ZERO);
}

/// Tries to start a second run from inside the first one's event stream.
struct ReentrantSink<'s> {
    seq: &'s Sequencer,
    rig: MockRig,
    clock: SimClock,
    nested: Option<Result<TestRun>>,
}

impl EventSink for ReentrantSink<'_> {
    fn emit(&mut self, _event: &RunEvent) {
        if self.nested.is_none() {
            let outcome = self
                .seq
                .run(&mut self.rig, &mut self.clock, &mut RecordingSink::new());
            self.nested = Some(outcome);
        }
    }
}

#[test]
fn second_run_is_refused_while_one_is_active() {
    let (mut clock, mut rig) = rig();
    let seq = Sequencer::new(config());
    let side_clock = SimClock::new();
    let mut sink = ReentrantSink {
        seq: &seq,
        rig: MockRig::new(side_clock.clone()),
        clock: side_clock,
        nested: None,
    };

    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.result, TestResult::Pass);
    assert!(matches!(sink.nested, Some(Err(Error::Busy))));
    assert!(sink.rig.calls.is_empty());
    assert!(!seq.is_running());
}

#[test]
fn sequencer_is_reusable_across_runs() {
    let seq = Sequencer::new(config());
    for leak in [0.001, 0.02, 0.0] {
        let (mut clock, rig) = rig();
        let mut rig = rig.with_leak(leak);
        let run = seq
            .run(&mut rig, &mut clock, &mut RecordingSink::new())
            .unwrap();
        let expected = if leak <= 0.005 {
            TestResult::Pass
        } else {
            TestResult::Fail
        };
        assert_eq!(run.result, expected, "leak {leak}");
    }
}
