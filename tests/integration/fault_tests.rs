//! Actuator and sensor faults: every exit from the primary sequence must
//! still vent and retract, and cleanup faults never re-enter cleanup.

use leaktester::app::events::RunEvent;
use leaktester::app::ports::ValveId;
use leaktester::app::sequencer::Sequencer;
use leaktester::error::{ActuatorError, RunFault, SensorError};
use leaktester::fsm::TestPhase;
use leaktester::fsm::context::TestResult;

use crate::mock_rig::{RecordingSink, RigCall, config, rig};

const CLEANUP_CALLS: [RigCall; 5] = [
    RigCall::Close(ValveId::Fill),
    RigCall::Open(ValveId::Exhaust),
    RigCall::Close(ValveId::Exhaust),
    RigCall::Retract,
    RigCall::Stop,
];

// ── Primary-phase actuator faults ─────────────────────────────

#[test]
fn actuator_fault_in_any_primary_phase_still_cleans_up() {
    let cases = [
        (RigCall::Extend, TestPhase::ExtendingCylinders),
        (RigCall::Stop, TestPhase::ExtendingCylinders),
        (RigCall::Open(ValveId::Fill), TestPhase::FillingDUT),
        (RigCall::Close(ValveId::Fill), TestPhase::FillingDUT),
        (RigCall::CloseAll, TestPhase::Isolating),
    ];
    for (call, faulted_in) in cases {
        let (mut clock, rig) = rig();
        let mut rig = rig.failing(call);
        let mut sink = RecordingSink::new();
        let seq = Sequencer::new(config());

        let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

        assert_eq!(run.result, TestResult::Error, "{call:?}");
        assert_eq!(run.phase, TestPhase::Complete, "{call:?}");
        assert!(
            matches!(run.fault, Some(RunFault::ActuatorFault(_))),
            "{call:?}: {:?}",
            run.fault
        );

        let phases = sink.phases();
        let at = phases.iter().position(|p| *p == faulted_in).unwrap();
        assert_eq!(
            phases[at + 1..],
            [
                TestPhase::Exhausting,
                TestPhase::RetractingCylinders,
                TestPhase::Complete,
            ],
            "{call:?}"
        );
        assert!(rig.calls.ends_with(&CLEANUP_CALLS), "{call:?}: {:?}", rig.calls);
        assert!(sink.events.iter().any(|e| matches!(
            e,
            RunEvent::Fault { phase, during_cleanup: false, .. } if *phase == faulted_in
        )));
    }
}

#[test]
fn abort_skips_the_remaining_primary_phases() {
    let (mut clock, rig) = rig();
    let mut rig = rig.failing(RigCall::Open(ValveId::Fill));
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(
        sink.phases(),
        [
            TestPhase::ExtendingCylinders,
            TestPhase::FillingDUT,
            TestPhase::Exhausting,
            TestPhase::RetractingCylinders,
            TestPhase::Complete,
        ]
    );
    assert!(run.samples.is_empty());
    assert!(run.leak_rate_psi_per_s.is_none());
    // Aborts do not de-energise up front.
    assert_eq!(rig.count_of(RigCall::CloseAll), 0);
    assert_eq!(
        run.fault,
        Some(RunFault::ActuatorFault(ActuatorError::Valve(ValveId::Fill)))
    );
}

// ── Cleanup faults ────────────────────────────────────────────

#[test]
fn retract_failure_is_reported_without_re_entering_cleanup() {
    let (mut clock, rig) = rig();
    let mut rig = rig.failing(RigCall::Retract);
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.result, TestResult::Pass);
    assert_eq!(run.phase, TestPhase::Complete);
    assert!(run.fault.is_none());
    assert_eq!(
        run.cleanup_faults,
        [RunFault::ActuatorFault(ActuatorError::Cylinder)]
    );
    let phases = sink.phases();
    assert_eq!(
        phases
            .iter()
            .filter(|p| **p == TestPhase::Exhausting)
            .count(),
        1
    );
    assert_eq!(rig.count_of(RigCall::Retract), 1);
    // The coil is still released.
    assert_eq!(rig.calls.last(), Some(&RigCall::Stop));
    assert!(sink.events.iter().any(|e| matches!(
        e,
        RunEvent::Fault {
            phase: TestPhase::RetractingCylinders,
            during_cleanup: true,
            ..
        }
    )));
}

#[test]
fn exhaust_failure_still_retracts() {
    let (mut clock, rig) = rig();
    let mut rig = rig.failing(RigCall::Open(ValveId::Exhaust));
    let seq = Sequencer::new(config());
    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(run.result, TestResult::Pass);
    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(
        run.cleanup_faults,
        [RunFault::ActuatorFault(ActuatorError::Valve(ValveId::Exhaust))]
    );
    assert!(rig.position_of(RigCall::Retract).is_some());
    // Exhaust hold skipped: extend + fill + stabilise + test + retract.
    assert_eq!(run.duration_s, 51.0);
}

#[test]
fn cleanup_fault_after_an_abort_keeps_the_first_fault() {
    let (mut clock, rig) = rig();
    let mut rig = rig
        .failing(RigCall::CloseAll)
        .failing(RigCall::Retract);
    let seq = Sequencer::new(config());
    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(run.result, TestResult::Error);
    assert_eq!(
        run.fault,
        Some(RunFault::ActuatorFault(ActuatorError::RelayWriteFailed))
    );
    assert_eq!(run.cleanup_faults.len(), 1);
}

// ── Sensor faults ─────────────────────────────────────────────

#[test]
fn sensor_fault_is_fatal() {
    let (mut clock, mut rig) = rig();
    rig.sensor_fails_after = Some(0);
    let mut sink = RecordingSink::new();
    let seq = Sequencer::new(config());
    let run = seq.run(&mut rig, &mut clock, &mut sink).unwrap();

    assert_eq!(run.result, TestResult::Error);
    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(
        run.fault,
        Some(RunFault::SensorFault(SensorError::AdcReadFailed))
    );
    // The fill read fails before the valve opens; de-energise, then clean up.
    let mut expected = vec![RigCall::Extend, RigCall::Stop, RigCall::CloseAll, RigCall::Stop];
    expected.extend(CLEANUP_CALLS);
    assert_eq!(rig.calls, expected);
}

#[test]
fn sensor_loss_mid_window_keeps_partial_samples() {
    let (mut clock, mut rig) = rig();
    // fill: 2 reads, stabilise: 6, isolate: 1, then three samples.
    rig.sensor_fails_after = Some(12);
    let seq = Sequencer::new(config());
    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(run.result, TestResult::Error);
    assert_eq!(run.samples.len(), 3);
    assert!(rig.state.is_idle());
}
