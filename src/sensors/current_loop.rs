//! 4–20 mA pressure transducer driver.
//!
//! Reads the loop receiver through a [`CurrentLoopAdc`], averages a few
//! conversions, maps counts linearly onto 4–20 mA using the two reference
//! counts measured at 4 mA and 20 mA, and applies the [`Calibrator`].
//!
//! ## Loop supervision
//!
//! Currents below 3.6 mA or above 21 mA are outside the NAMUR NE43 signal
//! band and reported as [`SensorError::LoopFault`] (broken wire, shorted
//! transmitter) instead of being calibrated into a plausible pressure.

use log::{info, warn};

use crate::app::ports::PressureSensor;
use crate::config::CalibrationConfig;
use crate::error::{self, SensorError};

use super::PressureReading;
use super::calibration::{CalibrationPoint, Calibrator};

const LOOP_FAULT_LOW_MA: f64 = 3.6;
const LOOP_FAULT_HIGH_MA: f64 = 21.0;
/// Spread across a calibration capture above which the loop is unsteady.
const UNSTABLE_SPREAD_MA: f64 = 0.5;

/// Raw access to the ADC channel wired to the loop receiver.
///
/// The chip driver itself (ADS1115 or similar) lives outside this crate.
pub trait CurrentLoopAdc {
    /// One single-ended conversion, in signed ADC counts.
    fn read_counts(&mut self) -> Result<i32, SensorError>;
}

pub struct CurrentLoopSensor<A> {
    adc: A,
    calibrator: Calibrator,
    counts_4ma: i32,
    counts_20ma: i32,
    samples_per_read: u8,
}

impl<A: CurrentLoopAdc> CurrentLoopSensor<A> {
    pub fn new(adc: A, calibrator: Calibrator, config: &CalibrationConfig) -> Self {
        Self {
            adc,
            calibrator,
            counts_4ma: config.adc_counts_4ma,
            counts_20ma: config.adc_counts_20ma,
            samples_per_read: config.samples_per_read.max(1),
        }
    }

    /// Average loop current over `samples_per_read` conversions.
    pub fn read_current_ma(&mut self) -> Result<f64, SensorError> {
        let mut sum = 0i64;
        for _ in 0..self.samples_per_read {
            sum += i64::from(self.adc.read_counts()?);
        }
        let counts = sum as f64 / f64::from(self.samples_per_read);
        let current_ma = self.counts_to_ma(counts);
        if !(LOOP_FAULT_LOW_MA..=LOOP_FAULT_HIGH_MA).contains(&current_ma) {
            return Err(SensorError::LoopFault);
        }
        Ok(current_ma)
    }

    pub fn calibrator(&self) -> &Calibrator {
        &self.calibrator
    }

    pub fn calibrator_mut(&mut self) -> &mut Calibrator {
        &mut self.calibrator
    }

    /// Capture a calibration point with `known_psi` applied to the
    /// transducer: average `readings` loop reads and add the result to the
    /// calibrator.  A spread above 0.5 mA is logged but still accepted.
    pub fn calibrate_from_known_pressure(
        &mut self,
        known_psi: f64,
        readings: usize,
    ) -> error::Result<CalibrationPoint> {
        let readings = readings.max(1);
        let (mut sum, mut lo, mut hi) = (0.0, f64::INFINITY, f64::NEG_INFINITY);
        for _ in 0..readings {
            let ma = self.read_current_ma()?;
            sum += ma;
            lo = lo.min(ma);
            hi = hi.max(ma);
        }
        let spread = hi - lo;
        if spread > UNSTABLE_SPREAD_MA {
            warn!("unstable loop current during calibration: {spread:.2} mA spread");
        }

        let point = CalibrationPoint::new(sum / readings as f64, known_psi);
        self.calibrator.add_point(point)?;
        info!(
            "calibrated {:.3} mA = {known_psi:.3} psi (±{:.3} mA)",
            point.current_ma,
            spread / 2.0
        );
        Ok(point)
    }

    fn counts_to_ma(&self, counts: f64) -> f64 {
        // In f64: the i32 difference overflows for extreme configured counts.
        let span = f64::from(self.counts_20ma) - f64::from(self.counts_4ma);
        if span == 0.0 {
            return 4.0;
        }
        4.0 + (counts - f64::from(self.counts_4ma)) * 16.0 / span
    }
}

impl<A: CurrentLoopAdc> PressureSensor for CurrentLoopSensor<A> {
    fn read(&mut self) -> Result<PressureReading, SensorError> {
        let raw_current_ma = self.read_current_ma()?;
        Ok(PressureReading {
            pressure_psi: self.calibrator.pressure_of(raw_current_ma),
            raw_current_ma,
        })
    }
}
