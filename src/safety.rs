//! Over-pressure safety monitor.
//!
//! [`is_safe`] is the pure predicate.  [`SafetyMonitor`] wraps it for the
//! sequencer: it is consulted on every poll in `Stabilizing` and every
//! sample in `Testing`, and latches the first violation so the run record
//! can say where and at what pressure the limit tripped.
//!
//! ## Fault lifecycle
//!
//! 1. A reading above `max_pressure` arrives.
//! 2. The monitor latches it and returns `RunFault::SafetyLimitExceeded`.
//! 3. The sequencer emergency-stops and jumps to cleanup; the latch is never
//!    cleared within a run, so a later in-range reading cannot mask it.
//! 4. The latched trip is copied onto the finished `TestRun` and its
//!    `RunSummary`.
//! 5. A fresh monitor is built for the next run.

use log::error;

use crate::config::TestConfig;
use crate::error::RunFault;
use crate::fsm::TestPhase;

/// Pressure must not exceed `config.max_pressure`; equal is still safe.
pub fn is_safe(current_pressure: f64, config: &TestConfig) -> bool {
    within_limit(current_pressure, config.max_pressure)
}

// NaN compares false and is therefore never within the limit.
fn within_limit(pressure_psi: f64, limit_psi: f64) -> bool {
    pressure_psi <= limit_psi
}

/// The first limit violation seen during a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyTrip {
    pub phase: TestPhase,
    pub pressure_psi: f64,
}

/// Per-run safety monitor.
pub struct SafetyMonitor {
    max_pressure: f64,
    /// Latched first violation.
    trip: Option<SafetyTrip>,
}

impl SafetyMonitor {
    pub fn new(config: &TestConfig) -> Self {
        Self {
            max_pressure: config.max_pressure,
            trip: None,
        }
    }

    /// Evaluate one reading taken during `phase`.
    pub fn check(&mut self, phase: TestPhase, pressure_psi: f64) -> Result<(), RunFault> {
        if within_limit(pressure_psi, self.max_pressure) {
            return Ok(());
        }
        if self.trip.is_none() {
            error!(
                "SAFETY LIMIT: {pressure_psi:.3} psi > {:.3} psi during {phase}",
                self.max_pressure
            );
            self.trip = Some(SafetyTrip {
                phase,
                pressure_psi,
            });
        }
        Err(RunFault::SafetyLimitExceeded {
            pressure_psi,
            limit_psi: self.max_pressure,
        })
    }

    pub fn trip(&self) -> Option<SafetyTrip> {
        self.trip
    }

    pub fn has_tripped(&self) -> bool {
        self.trip.is_some()
    }
}
