//! Per-run context threaded through every phase function.
//!
//! `RunContext` is the blackboard for one cycle: the borrowed rig, clock,
//! event sink and emergency-stop latch, the immutable config, the safety
//! monitor, and the [`TestRun`] record the phases fill in.  Phase functions
//! never touch hardware except through it, so every read is accounted for
//! in the max-pressure track and every transition reaches the observer.

use core::fmt;
use core::time::Duration;

use log::{debug, error, info};

use crate::app::estop::{self, EmergencyStop};
use crate::app::events::{RunEvent, RunSummary, RunWarning};
use crate::app::ports::{Clock, EventSink, TestRig};
use crate::config::TestConfig;
use crate::error::RunFault;
use crate::safety::{SafetyMonitor, SafetyTrip};
use crate::sensors::PressureReading;

use super::TestPhase;

/// Longest uninterrupted sleep inside an interruptible hold; bounds the
/// latency between an emergency-stop trigger and the sequencer reacting.
pub const HOLD_SLICE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Run record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestResult {
    /// No verdict yet.
    #[default]
    None,
    Pass,
    Fail,
    Error,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// One decay-window sample; `elapsed_s` counts from the start of `Testing`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSample {
    pub elapsed_s: f64,
    pub pressure_psi: f64,
    pub raw_current_ma: f64,
}

impl PressureSample {
    pub const fn new(elapsed_s: f64, pressure_psi: f64, raw_current_ma: f64) -> Self {
        Self {
            elapsed_s,
            pressure_psi,
            raw_current_ma,
        }
    }
}

/// Everything recorded about one cycle.
#[derive(Debug, Clone)]
pub struct TestRun {
    /// Snapshot of the config the run executed with.
    pub config: TestConfig,
    pub phase: TestPhase,
    /// Set once; never reset within a run.
    pub result: TestResult,
    /// Ordered by `elapsed_s`.
    pub samples: Vec<PressureSample>,
    pub start_pressure_psi: Option<f64>,
    pub end_pressure_psi: Option<f64>,
    pub pressure_drop_psi: Option<f64>,
    /// Endpoint decay rate, the pass/fail metric (psi/s).
    pub leak_rate_psi_per_s: Option<f64>,
    /// Least-squares decay slope over every sample (psi/s).
    pub decay_slope_psi_per_s: Option<f64>,
    pub leak_rate_sccm: Option<f64>,
    /// Highest pressure read at any point in the run.
    pub max_pressure_psi: Option<f64>,
    /// First fault of the primary sequence.
    pub fault: Option<RunFault>,
    /// Faults raised while exhausting or retracting.
    pub cleanup_faults: Vec<RunFault>,
    /// Where and at what pressure the safety limit first tripped.
    pub safety_trip: Option<SafetyTrip>,
    pub warnings: Vec<RunWarning>,
    pub duration_s: f64,
}

impl TestRun {
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            phase: TestPhase::Ready,
            result: TestResult::None,
            samples: Vec::new(),
            start_pressure_psi: None,
            end_pressure_psi: None,
            pressure_drop_psi: None,
            leak_rate_psi_per_s: None,
            decay_slope_psi_per_s: None,
            leak_rate_sccm: None,
            max_pressure_psi: None,
            fault: None,
            cleanup_faults: Vec::new(),
            safety_trip: None,
            warnings: Vec::new(),
            duration_s: 0.0,
        }
    }

    pub fn has_verdict(&self) -> bool {
        self.result != TestResult::None
    }

    /// Record the verdict.  Returns `false` and leaves the record untouched
    /// if one was already set.
    pub fn set_result(&mut self, result: TestResult) -> bool {
        if self.has_verdict() {
            return false;
        }
        self.result = result;
        true
    }

    fn observe_pressure(&mut self, pressure_psi: f64) {
        // NaN never replaces a real peak.
        self.max_pressure_psi = match self.max_pressure_psi {
            Some(peak) if peak >= pressure_psi || pressure_psi.is_nan() => Some(peak),
            _ => Some(pressure_psi),
        };
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            final_phase: self.phase,
            start_pressure_psi: self.start_pressure_psi,
            end_pressure_psi: self.end_pressure_psi,
            pressure_drop_psi: self.pressure_drop_psi,
            leak_rate_psi_per_s: self.leak_rate_psi_per_s,
            decay_slope_psi_per_s: self.decay_slope_psi_per_s,
            leak_rate_sccm: self.leak_rate_sccm,
            max_pressure_psi: self.max_pressure_psi,
            samples: self.samples.len(),
            duration_s: self.duration_s,
            fault: self.fault,
            safety_trip: self.safety_trip,
        }
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Whether the emergency-stop latch may cut a hold short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Interruptible,
    /// Cleanup holds always run to the end.
    Uninterruptible,
}

pub struct RunContext<'a> {
    pub config: &'a TestConfig,
    pub run: TestRun,
    pub safety: SafetyMonitor,
    rig: &'a mut dyn TestRig,
    clock: &'a mut dyn Clock,
    sink: &'a mut dyn EventSink,
    estop: &'a EmergencyStop,
    started: Duration,
}

impl<'a> RunContext<'a> {
    pub fn new(
        config: &'a TestConfig,
        rig: &'a mut dyn TestRig,
        clock: &'a mut dyn Clock,
        sink: &'a mut dyn EventSink,
        estop: &'a EmergencyStop,
    ) -> Self {
        let started = clock.now();
        Self {
            config,
            run: TestRun::new(config.clone()),
            safety: SafetyMonitor::new(config),
            rig,
            clock,
            sink,
            estop,
            started,
        }
    }

    pub fn rig(&mut self) -> &mut dyn TestRig {
        &mut *self.rig
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn run_elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }

    pub fn estop_latched(&self) -> bool {
        self.estop.is_triggered()
    }

    pub fn emit(&mut self, event: &RunEvent) {
        self.sink.emit(event);
    }

    /// Record the transition and tell the observer.
    pub fn enter(&mut self, to: TestPhase) {
        let from = self.run.phase;
        self.run.phase = to;
        info!("phase {from} -> {to}");
        self.emit(&RunEvent::PhaseChanged { from, to });
    }

    /// Sleep for `duration` in slices of at most [`HOLD_SLICE`].
    ///
    /// An interruptible hold checks the emergency-stop latch before every
    /// slice, so a zero-length hold is a pure checkpoint.
    pub fn hold(&mut self, duration: Duration, mode: Hold) -> Result<(), RunFault> {
        let deadline = self.clock.now().saturating_add(duration);
        loop {
            if mode == Hold::Interruptible && self.estop.is_triggered() {
                return Err(RunFault::EmergencyStop);
            }
            let now = self.clock.now();
            if now >= deadline {
                return Ok(());
            }
            self.clock.sleep((deadline - now).min(HOLD_SLICE));
        }
    }

    /// Read the sensor, track the peak and publish the sample.
    pub fn read_pressure(&mut self) -> Result<PressureReading, RunFault> {
        let reading = self.rig.read()?;
        self.run.observe_pressure(reading.pressure_psi);
        let event = RunEvent::PressureSample {
            phase: self.run.phase,
            run_elapsed_s: self.run_elapsed().as_secs_f64(),
            reading,
        };
        self.emit(&event);
        Ok(reading)
    }

    /// [`read_pressure`](Self::read_pressure) followed by the over-pressure
    /// check.
    pub fn read_checked(&mut self) -> Result<PressureReading, RunFault> {
        let reading = self.read_pressure()?;
        self.safety.check(self.run.phase, reading.pressure_psi)?;
        Ok(reading)
    }

    pub fn warn(&mut self, warning: RunWarning) {
        self.run.warnings.push(warning);
        self.emit(&RunEvent::Warning(warning));
    }

    /// Record the fault that ended the primary sequence.  Only the first
    /// one sticks, and it overrides any verdict already reached.
    pub fn fail(&mut self, fault: RunFault) {
        if self.run.fault.is_none() {
            self.run.fault = Some(fault);
        }
        self.run.result = TestResult::Error;
        let event = RunEvent::Fault {
            phase: self.run.phase,
            fault,
            during_cleanup: false,
        };
        self.emit(&event);
    }

    pub fn report_cleanup_fault(&mut self, fault: RunFault) {
        self.run.cleanup_faults.push(fault);
        let event = RunEvent::Fault {
            phase: self.run.phase,
            fault,
            during_cleanup: true,
        };
        self.emit(&event);
    }

    /// De-energise everything immediately.  Failures are reported as
    /// cleanup faults; cleanup still follows.
    pub fn emergency_stop(&mut self) {
        if let Err(e) = estop::de_energize_all(&mut *self.rig) {
            error!("emergency stop incomplete: {e}");
            self.report_cleanup_fault(e.into());
        } else {
            debug!("all valves closed, cylinders idle");
        }
    }

    /// Close out the record.
    pub fn finish(mut self) -> TestRun {
        self.run.duration_s = self.run_elapsed().as_secs_f64();
        self.run.safety_trip = self.safety.trip();
        self.run
    }
}
