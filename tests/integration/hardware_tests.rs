//! The relay-board rig and current-loop sensor wired together, driven by
//! the sequencer through `embedded-hal` test pins.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use leaktester::adapters::relay::{RelayOutputs, RelayRig};
use leaktester::adapters::sim::SimClock;
use leaktester::app::sequencer::Sequencer;
use leaktester::config::CalibrationConfig;
use leaktester::error::{RunFault, SensorError};
use leaktester::fsm::TestPhase;
use leaktester::fsm::context::TestResult;
use leaktester::sensors::calibration::{CalibrationPoint, Calibrator, TransducerRange};
use leaktester::sensors::current_loop::{CurrentLoopAdc, CurrentLoopSensor};

use crate::mock_rig::{RecordingSink, config};

// ── Test pins and ADC ─────────────────────────────────────────

type Levels = Rc<RefCell<[bool; 4]>>;

struct Pin {
    index: usize,
    levels: Levels,
}

impl ErrorType for Pin {
    type Error = ErrorKind;
}

impl OutputPin for Pin {
    fn set_low(&mut self) -> Result<(), ErrorKind> {
        self.levels.borrow_mut()[self.index] = false;
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), ErrorKind> {
        self.levels.borrow_mut()[self.index] = true;
        Ok(())
    }
}

/// Fixed counts, or an open loop once `broken` is set.
struct SteadyAdc {
    counts: i32,
    broken: Rc<RefCell<bool>>,
}

impl CurrentLoopAdc for SteadyAdc {
    fn read_counts(&mut self) -> Result<i32, SensorError> {
        Ok(if *self.broken.borrow() { 0 } else { self.counts })
    }
}

const COUNTS_4MA: i32 = 6400;
const COUNTS_20MA: i32 = 32000;

fn counts_for(current_ma: f64) -> i32 {
    COUNTS_4MA + ((current_ma - 4.0) * f64::from(COUNTS_20MA - COUNTS_4MA) / 16.0) as i32
}

fn board(
    current_ma: f64,
) -> (
    Levels,
    Rc<RefCell<bool>>,
    RelayRig<Pin, CurrentLoopSensor<SteadyAdc>>,
) {
    let levels = Levels::default();
    let pin = |index| Pin {
        index,
        levels: levels.clone(),
    };
    let relays = RelayOutputs {
        fill: pin(0),
        exhaust: pin(1),
        extend: pin(2),
        retract: pin(3),
    };
    let cal_config = CalibrationConfig {
        adc_counts_4ma: COUNTS_4MA,
        adc_counts_20ma: COUNTS_20MA,
        samples_per_read: 4,
        ..CalibrationConfig::default()
    };
    let mut calibrator = Calibrator::new(TransducerRange::default());
    calibrator
        .replace_points(&[
            CalibrationPoint::new(4.0, 0.0),
            CalibrationPoint::new(20.0, 1.0),
        ])
        .unwrap();
    let broken = Rc::new(RefCell::new(false));
    let adc = SteadyAdc {
        counts: counts_for(current_ma),
        broken: broken.clone(),
    };
    let sensor = CurrentLoopSensor::new(adc, calibrator, &cal_config);
    (levels, broken, RelayRig::new(relays, sensor, false))
}

// ── Runs ──────────────────────────────────────────────────────

#[test]
fn steady_loop_current_passes_and_releases_every_relay() {
    // 16.8 mA is 0.8 psi on a 0–1 psi transducer.
    let (levels, _broken, mut rig) = board(16.8);
    let mut clock = SimClock::new();
    let seq = Sequencer::new(config());

    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(run.result, TestResult::Pass);
    assert_eq!(run.phase, TestPhase::Complete);
    let start = run.start_pressure_psi.unwrap();
    assert!((start - 0.8).abs() < 1e-3, "start = {start}");
    assert!((run.samples[0].raw_current_ma - 16.8).abs() < 1e-3);
    assert_eq!(*levels.borrow(), [false; 4]);
}

#[test]
fn broken_loop_is_a_fatal_sensor_fault() {
    let (levels, broken, mut rig) = board(16.8);
    *broken.borrow_mut() = true;
    let mut clock = SimClock::new();
    let seq = Sequencer::new(config());

    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(run.result, TestResult::Error);
    assert_eq!(
        run.fault,
        Some(RunFault::SensorFault(SensorError::LoopFault))
    );
    assert_eq!(*levels.borrow(), [false; 4]);
}

#[test]
fn transducer_over_range_trips_the_safety_limit() {
    // 20.8 mA is inside the loop band but reads as full scale plus.
    let (_levels, _broken, mut rig) = board(20.8);
    rig.sensor_mut()
        .calibrator_mut()
        .replace_points(&[
            CalibrationPoint::new(4.0, 0.0),
            CalibrationPoint::new(20.0, 1.0),
            CalibrationPoint::new(21.0, 1.5),
        ])
        .unwrap();
    let mut clock = SimClock::new();
    let seq = Sequencer::new(config());

    let run = seq
        .run(&mut rig, &mut clock, &mut RecordingSink::new())
        .unwrap();

    assert_eq!(run.phase, TestPhase::Complete);
    assert_eq!(run.result, TestResult::Error);
    assert!(matches!(
        run.fault,
        Some(RunFault::SafetyLimitExceeded { .. })
    ));
}
