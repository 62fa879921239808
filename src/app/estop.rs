//! Emergency-stop latch.
//!
//! A cloneable handle shared between the run's worker thread and whatever
//! raises the stop (operator button, UI, signal handler).  Triggering only
//! sets the latch; the sequencer observes it at its next suspension point
//! (at most one hold slice later), de-energises every valve and cylinder and
//! routes the run through cleanup to `Error`.
//!
//! The latch stays set until [`EmergencyStop::reset`] is called, and a
//! sequencer refuses to start a run while it is set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;

use crate::app::ports::{CylinderActuator, ValveActuator};
use crate::error::ActuatorError;

#[derive(Debug, Clone, Default)]
pub struct EmergencyStop {
    latched: Arc<AtomicBool>,
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the stop.  Idempotent; safe from any thread.
    pub fn trigger(&self) {
        if !self.latched.swap(true, Ordering::AcqRel) {
            warn!("EMERGENCY STOP latched");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// Clear the latch once the station is safe to restart.
    pub fn reset(&self) {
        self.latched.store(false, Ordering::Release);
    }
}

/// Close every valve and idle both cylinders, regardless of phase.
///
/// Both commands are always attempted; the first failure is returned.
/// Repeating the call leaves the actuators in the same state.
pub fn de_energize_all<R>(rig: &mut R) -> Result<(), ActuatorError>
where
    R: ValveActuator + CylinderActuator + ?Sized,
{
    let valves = rig.close_all();
    let cylinders = rig.stop();
    valves.and(cylinders)
}
