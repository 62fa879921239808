//! Port traits: the hexagonal boundary between the sequencer and the rig.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Sequencer (domain)
//! ```
//!
//! Driven adapters (relay board, current-loop sensor, clock, event sinks,
//! config storage) implement these traits.  The
//! [`Sequencer`](super::sequencer::Sequencer) consumes them through
//! generics and trait objects, so the domain core never touches hardware
//! directly and a mock rig can stand in for tests.
//!
//! No port retries a failed actuation: automatically re-firing a pneumatic
//! valve or cylinder is unsafe, so every error surfaces to the caller.

use core::fmt;
use core::time::Duration;

use crate::config::StationConfig;
use crate::error::{ActuatorError, SensorError};
use crate::sensors::PressureReading;

use super::events::RunEvent;

// ───────────────────────────────────────────────────────────────
// Valve port
// ───────────────────────────────────────────────────────────────

/// The two solenoid valves of the test manifold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValveId {
    /// Connects regulated supply air to the DUT.
    Fill,
    /// Vents the DUT to atmosphere.
    Exhaust,
}

impl fmt::Display for ValveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fill => write!(f, "fill"),
            Self::Exhaust => write!(f, "exhaust"),
        }
    }
}

pub trait ValveActuator {
    /// Energise (open) one valve.
    fn open(&mut self, id: ValveId) -> Result<(), ActuatorError>;

    /// De-energise (close) one valve.
    fn close(&mut self, id: ValveId) -> Result<(), ActuatorError>;

    /// Close every valve, isolating the DUT.
    fn close_all(&mut self) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Cylinder port
// ───────────────────────────────────────────────────────────────

/// The clamp cylinder pair that seals the DUT against the fixture.
///
/// `extend` and `retract` energise the corresponding solenoid and return
/// immediately; `travel` is the commanded stroke time, which the sequencer
/// waits out before calling [`stop`](Self::stop) to de-energise.
pub trait CylinderActuator {
    fn extend(&mut self, travel: Duration) -> Result<(), ActuatorError>;

    fn retract(&mut self, travel: Duration) -> Result<(), ActuatorError>;

    /// De-energise both solenoids, leaving the cylinders idle.
    fn stop(&mut self) -> Result<(), ActuatorError>;
}

// ───────────────────────────────────────────────────────────────
// Sensor port
// ───────────────────────────────────────────────────────────────

/// Calibrated pressure source.  Implementations apply the
/// [`Calibrator`](crate::sensors::calibration::Calibrator) internally.
pub trait PressureSensor {
    fn read(&mut self) -> Result<PressureReading, SensorError>;
}

/// Everything the sequencer drives during a run, owned exclusively for
/// the run's duration.
pub trait TestRig: ValveActuator + CylinderActuator + PressureSensor {}

impl<T: ValveActuator + CylinderActuator + PressureSensor> TestRig for T {}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time source.  Every wait in a run goes through `sleep`, which
/// lets tests run whole cycles on a virtual clock.
pub trait Clock {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → UI / logging)
// ───────────────────────────────────────────────────────────────

/// The sequencer emits structured [`RunEvent`]s through this port from the
/// run's own thread.  Adapters that feed another execution context (a UI
/// loop) must hand the event over rather than act on it in place.
pub trait EventSink {
    fn emit(&mut self, event: &RunEvent);
}

/// Fan an event out to two sinks.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &RunEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

/// An absent sink drops every event.
impl<S: EventSink> EventSink for Option<S> {
    fn emit(&mut self, event: &RunEvent) {
        if let Some(sink) = self {
            sink.emit(event);
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &RunEvent) {
        (**self).emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Loads and persists station configuration.
///
/// Implementations MUST validate before persisting; invalid values are
/// rejected with [`ConfigError::ValidationFailed`], never clamped.
pub trait ConfigPort {
    /// Load configuration.  Returns defaults if nothing is stored yet.
    fn load(&self) -> Result<StationConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &StationConfig) -> Result<(), ConfigError>;
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config could not be parsed.
    Corrupted,
    /// A config field failed validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
