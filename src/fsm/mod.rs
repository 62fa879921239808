//! Function-pointer phase machine for one leak-test cycle.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  PhaseTable                                               │
//! │  ┌────────────────────┬──────────────┬──────────────────┐ │
//! │  │ TestPhase          │ run          │ next             │ │
//! │  ├────────────────────┼──────────────┼──────────────────┤ │
//! │  │ ExtendingCylinders │ fn(ctx)->Out │ FillingDUT       │ │
//! │  │ FillingDUT         │ fn(ctx)->Out │ Stabilizing      │ │
//! │  │ Stabilizing        │ fn(ctx)->Out │ Isolating        │ │
//! │  │ Isolating          │ fn(ctx)->Out │ Testing          │ │
//! │  │ Testing            │ fn(ctx)->Out │ Evaluating       │ │
//! │  │ Evaluating         │ fn(ctx)->Out │ Exhausting       │ │
//! │  │ Exhausting         │ fn(ctx)->Out │ Retracting...    │ │
//! │  │ RetractingCylinders│ fn(ctx)->Out │ Complete         │ │
//! │  └────────────────────┴──────────────┴──────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike a ticked controller, a test cycle is a straight line: the engine
//! runs each phase function to completion, and the [`PhaseOutcome`] it
//! returns decides whether to advance along the table or divert into
//! cleanup.  Every exit from the primary sequence passes through
//! `Exhausting` and `RetractingCylinders`.
//!
//! ```text
//!  Ready ─▶ Extending ─▶ Filling ─▶ Stabilizing ─▶ Isolating ─▶ Testing ─▶ Evaluating
//!               │           │            │             │           │           │
//!               └───────────┴─[fault]────┴─────────────┴───────────┴───────────┤
//!                                                                              ▼
//!                                   Complete / Error ◀── Retracting ◀── Exhausting
//! ```

pub mod context;
pub mod phases;

use core::fmt;

use context::{RunContext, TestResult};
use log::{error, info, warn};

use crate::error::RunFault;

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

/// Every phase a run can report.  `Ready`, `Complete` and `Error` have no
/// row in the phase table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TestPhase {
    Ready = 0,
    ExtendingCylinders = 1,
    FillingDUT = 2,
    Stabilizing = 3,
    Isolating = 4,
    Testing = 5,
    Evaluating = 6,
    Exhausting = 7,
    RetractingCylinders = 8,
    Complete = 9,
    Error = 10,
}

impl TestPhase {
    /// Phases with a row in the table.
    pub const ACTIVE_COUNT: usize = 8;

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::ExtendingCylinders => "ExtendingCylinders",
            Self::FillingDUT => "FillingDUT",
            Self::Stabilizing => "Stabilizing",
            Self::Isolating => "Isolating",
            Self::Testing => "Testing",
            Self::Evaluating => "Evaluating",
            Self::Exhausting => "Exhausting",
            Self::RetractingCylinders => "RetractingCylinders",
            Self::Complete => "Complete",
            Self::Error => "Error",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// `Exhausting` and `RetractingCylinders` run on every exit path.
    pub const fn is_cleanup(self) -> bool {
        matches!(self, Self::Exhausting | Self::RetractingCylinders)
    }

    /// Row index in the phase table, `None` for Ready and terminal phases.
    const fn table_index(self) -> Option<usize> {
        match self {
            Self::Ready | Self::Complete | Self::Error => None,
            active => Some(active as usize - 1),
        }
    }
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Phase outcome
// ---------------------------------------------------------------------------

/// What a phase function tells the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseOutcome {
    /// Advance to the table's `next` phase.
    Continue,
    /// Skip the rest of the primary sequence and go straight to cleanup.
    AbortToCleanup(RunFault),
    /// Emergency-stop first, then cleanup.
    Fatal(RunFault),
}

impl From<RunFault> for PhaseOutcome {
    fn from(fault: RunFault) -> Self {
        if fault.is_fatal() {
            Self::Fatal(fault)
        } else {
            Self::AbortToCleanup(fault)
        }
    }
}

impl From<Result<(), RunFault>> for PhaseOutcome {
    fn from(result: Result<(), RunFault>) -> Self {
        match result {
            Ok(()) => Self::Continue,
            Err(fault) => fault.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Signature of a phase body.  Runs once per cycle, to completion.
pub type PhaseFn = fn(&mut RunContext<'_>) -> PhaseOutcome;

pub struct PhaseDescriptor {
    pub phase: TestPhase,
    pub run: PhaseFn,
    /// Where a `Continue` leads.
    pub next: TestPhase,
}

pub type PhaseTable = [PhaseDescriptor; TestPhase::ACTIVE_COUNT];

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Walks a [`PhaseTable`] for one run.
pub struct PhaseMachine<'t> {
    table: &'t PhaseTable,
}

impl<'t> PhaseMachine<'t> {
    pub fn new(table: &'t PhaseTable) -> Self {
        Self { table }
    }

    /// Drive the run from `Ready` to a terminal phase, returning it.
    ///
    /// The first fault in the primary sequence wins and is recorded on the
    /// run.  Faults raised by cleanup phases are reported but never divert
    /// the walk, so cleanup always finishes.  The emergency-stop latch is
    /// checked after every primary phase and once more after cleanup.
    ///
    /// Every handled fault ends in `Complete` with result `Error`; only an
    /// emergency stop ends in `Error`.
    pub fn run(&self, ctx: &mut RunContext<'_>) -> TestPhase {
        let mut phase = TestPhase::ExtendingCylinders;
        let mut stopped = false;

        while let Some(idx) = phase.table_index() {
            let row = &self.table[idx];
            debug_assert_eq!(row.phase, phase, "phase table out of order");
            ctx.enter(phase);

            let mut outcome = (row.run)(ctx);
            if outcome == PhaseOutcome::Continue && !phase.is_cleanup() && ctx.estop_latched() {
                outcome = PhaseOutcome::Fatal(RunFault::EmergencyStop);
            }
            phase = match outcome {
                PhaseOutcome::Continue => row.next,
                PhaseOutcome::AbortToCleanup(fault) | PhaseOutcome::Fatal(fault)
                    if phase.is_cleanup() =>
                {
                    warn!("{phase}: cleanup fault: {fault}");
                    ctx.report_cleanup_fault(fault);
                    row.next
                }
                PhaseOutcome::AbortToCleanup(fault) => {
                    warn!("{phase}: aborting to cleanup: {fault}");
                    ctx.fail(fault);
                    TestPhase::Exhausting
                }
                PhaseOutcome::Fatal(fault) => {
                    error!("{phase}: fatal: {fault}");
                    stopped |= fault == RunFault::EmergencyStop;
                    ctx.emergency_stop();
                    ctx.fail(fault);
                    TestPhase::Exhausting
                }
            };
        }

        // A stop raised during cleanup still ends the run in Error.
        if !stopped && ctx.estop_latched() {
            error!("emergency stop raised during cleanup");
            stopped = true;
            ctx.emergency_stop();
            ctx.fail(RunFault::EmergencyStop);
        }

        // No-op when a verdict already stands.
        ctx.run.set_result(TestResult::Error);
        let terminal = if stopped { TestPhase::Error } else { phase };
        ctx.enter(terminal);
        info!("run finished in {terminal} ({})", ctx.run.result);
        terminal
    }
}
