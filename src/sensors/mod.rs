//! Pressure sensing: calibration curve and the current-loop transducer.
//!
//! The [`CurrentLoopSensor`](current_loop::CurrentLoopSensor) averages raw
//! ADC counts, converts them to loop milliamps and runs them through a
//! [`Calibrator`](calibration::Calibrator) to produce a [`PressureReading`].

pub mod calibration;
pub mod current_loop;

/// One calibrated pressure measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PressureReading {
    /// Calibrated pressure (psi).
    pub pressure_psi: f64,
    /// Loop current the pressure was derived from (mA).
    pub raw_current_ma: f64,
}
