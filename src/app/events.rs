//! Outbound run events.
//!
//! The [`Sequencer`](super::sequencer::Sequencer) emits these through the
//! [`EventSink`](super::ports::EventSink) port from the run's own thread.
//! Adapters on the other side decide what to do with them: log to the
//! console, forward over a channel to a UI loop, append to a results file.

use crate::error::RunFault;
use crate::fsm::TestPhase;
use crate::fsm::context::TestResult;
use crate::safety::SafetyTrip;
use crate::sensors::PressureReading;

/// Structured events emitted by a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The run moved between phases.  Fired on every transition, including
    /// the final one into `Complete` or `Error`.
    PhaseChanged { from: TestPhase, to: TestPhase },

    /// One pressure read taken during `phase`.
    PressureSample {
        phase: TestPhase,
        /// Seconds since the run started.
        run_elapsed_s: f64,
        reading: PressureReading,
    },

    /// Something worth flagging that does not change the outcome.
    Warning(RunWarning),

    /// A fault was raised.  `during_cleanup` faults never change the result.
    Fault {
        phase: TestPhase,
        fault: RunFault,
        during_cleanup: bool,
    },

    /// The run reached a terminal phase.  Emitted exactly once per run.
    Finished {
        result: TestResult,
        summary: RunSummary,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunWarning {
    /// Pressure after filling fell short of `target - tolerance`.
    Underfill { pressure_psi: f64, minimum_psi: f64 },
}

/// Final figures for one run, as shown to the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub final_phase: TestPhase,
    pub start_pressure_psi: Option<f64>,
    pub end_pressure_psi: Option<f64>,
    pub pressure_drop_psi: Option<f64>,
    pub leak_rate_psi_per_s: Option<f64>,
    pub decay_slope_psi_per_s: Option<f64>,
    pub leak_rate_sccm: Option<f64>,
    pub max_pressure_psi: Option<f64>,
    pub samples: usize,
    pub duration_s: f64,
    pub fault: Option<RunFault>,
    pub safety_trip: Option<SafetyTrip>,
}
