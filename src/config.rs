//! Test configuration parameters
//!
//! All tunable parameters for one leak-test cycle plus the pressure
//! transducer calibration.  Loaded once per run through a
//! [`ConfigPort`](crate::app::ports::ConfigPort) and never mutated while a
//! run is in progress.

use core::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::RunFault;
use crate::sensors::calibration::{CalibrationPoint, MAX_CALIBRATION_POINTS};

/// Longest accepted value for any single timing parameter (s).
pub const MAX_PHASE_SECS: f64 = 86_400.0;

/// Leak-test cycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    // --- Timing (seconds) ---
    /// Cylinder extend travel time
    pub cylinder_extend_time: f64,
    /// Fill valve open time
    pub fill_time: f64,
    /// Stabilisation hold before isolation
    pub stabilize_time: f64,
    /// Decay observation window
    pub test_duration: f64,
    /// Exhaust valve open time
    pub exhaust_time: f64,
    /// Cylinder retract travel time
    pub cylinder_retract_time: f64,

    // --- Pressure targets (psi) ---
    /// Pressure expected after filling
    pub target_fill_pressure: f64,
    /// Allowed shortfall below the fill target before warning
    pub pressure_tolerance: f64,
    /// Pass/fail threshold on the endpoint decay rate (psi/s)
    pub max_leak_rate: f64,

    // --- Safety ---
    /// Pressure ceiling; exceeding it aborts the run (psi)
    pub max_pressure: f64,
    /// Longest the DUT may be held pressurised: fill + stabilise + test (s)
    pub pressure_timeout: f64,

    // --- Leak-rate conversion ---
    /// Internal volume of DUT plus plumbing (cc)
    pub test_volume_cc: f64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            // Timing
            cylinder_extend_time: 3.0,
            fill_time: 5.0,
            stabilize_time: 10.0,
            test_duration: 30.0,
            exhaust_time: 5.0,
            cylinder_retract_time: 3.0,

            // Pressure (0–1 psig transducer)
            target_fill_pressure: 0.8,
            pressure_tolerance: 0.05,
            max_leak_rate: 0.005,

            // Safety
            max_pressure: 1.2,
            pressure_timeout: 60.0,

            test_volume_cc: 100.0,
        }
    }
}

impl TestConfig {
    /// Reject non-positive timing or pressure parameters, and timings
    /// longer than [`MAX_PHASE_SECS`].
    ///
    /// Called before a run starts; a run never re-validates mid-cycle.
    pub fn validate(&self) -> Result<(), RunFault> {
        let timings = [
            (
                self.cylinder_extend_time,
                "cylinder_extend_time must be positive",
                "cylinder_extend_time is longer than a day",
            ),
            (self.fill_time, "fill_time must be positive", "fill_time is longer than a day"),
            (
                self.stabilize_time,
                "stabilize_time must be positive",
                "stabilize_time is longer than a day",
            ),
            (
                self.test_duration,
                "test_duration must be positive",
                "test_duration is longer than a day",
            ),
            (
                self.exhaust_time,
                "exhaust_time must be positive",
                "exhaust_time is longer than a day",
            ),
            (
                self.cylinder_retract_time,
                "cylinder_retract_time must be positive",
                "cylinder_retract_time is longer than a day",
            ),
            (
                self.pressure_timeout,
                "pressure_timeout must be positive",
                "pressure_timeout is longer than a day",
            ),
        ];
        let pressures = [
            (self.target_fill_pressure, "target_fill_pressure must be positive"),
            (self.pressure_tolerance, "pressure_tolerance must be positive"),
            (self.max_leak_rate, "max_leak_rate must be positive"),
            (self.max_pressure, "max_pressure must be positive"),
            (self.test_volume_cc, "test_volume_cc must be positive"),
        ];
        for (value, msg, too_long) in timings {
            if !value.is_finite() || value <= 0.0 {
                return Err(RunFault::ConfigurationInvalid(msg));
            }
            // Every hold converts to a `Duration` mid-run.
            if value > MAX_PHASE_SECS {
                return Err(RunFault::ConfigurationInvalid(too_long));
            }
        }
        for (value, msg) in pressures {
            if !value.is_finite() || value <= 0.0 {
                return Err(RunFault::ConfigurationInvalid(msg));
            }
        }

        if self.pressurised_secs() > self.pressure_timeout {
            return Err(RunFault::ConfigurationInvalid(
                "fill + stabilize + test exceeds pressure_timeout",
            ));
        }

        if self.target_fill_pressure > self.max_pressure {
            warn!(
                "target fill pressure {:.3} psi exceeds max pressure {:.3} psi",
                self.target_fill_pressure, self.max_pressure
            );
        }

        Ok(())
    }

    /// Seconds the DUT is nominally held under pressure.
    pub fn pressurised_secs(&self) -> f64 {
        self.fill_time + self.stabilize_time + self.test_duration
    }

    /// Minimum acceptable pressure after filling.
    pub fn min_fill_pressure(&self) -> f64 {
        self.target_fill_pressure - self.pressure_tolerance
    }

    pub fn extend_duration(&self) -> Duration {
        Duration::from_secs_f64(self.cylinder_extend_time)
    }

    pub fn fill_duration(&self) -> Duration {
        Duration::from_secs_f64(self.fill_time)
    }

    pub fn stabilize_duration(&self) -> Duration {
        Duration::from_secs_f64(self.stabilize_time)
    }

    pub fn test_window(&self) -> Duration {
        Duration::from_secs_f64(self.test_duration)
    }

    pub fn exhaust_duration(&self) -> Duration {
        Duration::from_secs_f64(self.exhaust_time)
    }

    pub fn retract_duration(&self) -> Duration {
        Duration::from_secs_f64(self.cylinder_retract_time)
    }
}

/// Pressure transducer range and calibration points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Loop current at the transducer's zero reading (mA)
    pub min_current_ma: f64,
    /// Loop current at full scale (mA)
    pub max_current_ma: f64,
    /// Pressure at zero reading (psi)
    pub min_pressure_psi: f64,
    /// Pressure at full scale (psi)
    pub max_pressure_psi: f64,
    /// Measured calibration points; empty means "use the range line"
    pub points: heapless::Vec<CalibrationPoint, MAX_CALIBRATION_POINTS>,
    /// ADC counts at 4 mA
    pub adc_counts_4ma: i32,
    /// ADC counts at 20 mA
    pub adc_counts_20ma: i32,
    /// ADC samples averaged per pressure read
    pub samples_per_read: u8,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let mut points = heapless::Vec::new();
        // Balance, midpoint and full-scale of the 0–1 psig transducer.
        for (current_ma, pressure_psi) in [(4.025, 0.0), (12.029, 0.5), (20.037, 1.0)] {
            let _ = points.push(CalibrationPoint {
                current_ma,
                pressure_psi,
            });
        }
        Self {
            min_current_ma: 4.025,
            max_current_ma: 20.037,
            min_pressure_psi: 0.0,
            max_pressure_psi: 1.0,
            points,
            adc_counts_4ma: 6430,
            adc_counts_20ma: 32154,
            samples_per_read: 3,
        }
    }
}

/// Everything a station loads at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub test: TestConfig,
    pub calibration: CalibrationConfig,
}
