//! Unified error types for the leak tester.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! sequencer's fault handling uniform.  All variants are `Copy` so they can
//! travel through phase outcomes and observer events without allocation.

use core::fmt;

use crate::app::ports::ValveId;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// The pressure sensor could not be read.
    Sensor(SensorError),
    /// A valve or cylinder command failed.
    Actuator(ActuatorError),
    /// A test run ended on a fault.
    Run(RunFault),
    /// Calibration data was rejected.
    Calibration(CalibrationError),
    /// A run is already in progress on this sequencer.
    Busy,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Run(e) => write!(f, "run: {e}"),
            Self::Calibration(e) => write!(f, "calibration: {e}"),
            Self::Busy => write!(f, "a run is already in progress"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC read returned an error or timed out.
    AdcReadFailed,
    /// Loop current is far outside 4–20 mA (open loop or short).
    LoopFault,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdcReadFailed => write!(f, "ADC read failed"),
            Self::LoopFault => write!(f, "current loop fault"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// A relay output could not be driven.
    RelayWriteFailed,
    /// Valve command failed.
    Valve(ValveId),
    /// Cylinder command failed.
    Cylinder,
    /// Extend and retract solenoids would both be energised.
    InterlockViolation,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RelayWriteFailed => write!(f, "relay write failed"),
            Self::Valve(id) => write!(f, "{id} valve command failed"),
            Self::Cylinder => write!(f, "cylinder command failed"),
            Self::InterlockViolation => write!(f, "cylinder solenoid interlock"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Run faults
// ---------------------------------------------------------------------------

/// Faults that end a test run early.  Every one of them forces
/// `TestResult::Error` and is reported to the observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunFault {
    /// A commanded valve/cylinder operation failed.
    ActuatorFault(ActuatorError),
    /// Pressure exceeded `max_pressure`.
    SafetyLimitExceeded { pressure_psi: f64, limit_psi: f64 },
    /// Fewer than two samples were recorded during `Testing`.
    InsufficientData { samples: usize },
    /// The pressure sensor failed mid-run.
    SensorFault(SensorError),
    /// The emergency stop latch was tripped.
    EmergencyStop,
    /// The run was refused before it started.
    ConfigurationInvalid(&'static str),
}

impl RunFault {
    /// Fatal faults de-energise every output before cleanup runs.
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::SafetyLimitExceeded { .. } | Self::SensorFault(_) | Self::EmergencyStop
        )
    }
}

impl fmt::Display for RunFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActuatorFault(e) => write!(f, "actuator fault: {e}"),
            Self::SafetyLimitExceeded {
                pressure_psi,
                limit_psi,
            } => write!(
                f,
                "pressure {pressure_psi:.3} psi exceeds limit {limit_psi:.3} psi"
            ),
            Self::InsufficientData { samples } => {
                write!(f, "insufficient data: {samples} sample(s)")
            }
            Self::SensorFault(e) => write!(f, "sensor fault: {e}"),
            Self::EmergencyStop => write!(f, "emergency stop"),
            Self::ConfigurationInvalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl From<ActuatorError> for RunFault {
    fn from(e: ActuatorError) -> Self {
        Self::ActuatorFault(e)
    }
}

impl From<SensorError> for RunFault {
    fn from(e: SensorError) -> Self {
        Self::SensorFault(e)
    }
}

impl From<RunFault> for Error {
    fn from(e: RunFault) -> Self {
        Self::Run(e)
    }
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// A replacement set must hold at least two points.
    TooFewPoints,
    /// The fixed-capacity point store is full.
    CapacityExceeded,
    /// Two points share the same current value.
    DuplicateCurrent,
    /// A point contains NaN or infinity.
    NonFinite,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewPoints => write!(f, "at least two points required"),
            Self::CapacityExceeded => write!(f, "too many calibration points"),
            Self::DuplicateCurrent => write!(f, "duplicate current value"),
            Self::NonFinite => write!(f, "non-finite value"),
        }
    }
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
