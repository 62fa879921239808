//! Current-loop to pressure calibration.
//!
//! Converts a 4–20 mA loop current into psi with a piecewise-linear curve
//! through measured calibration points.  Readings outside the calibrated
//! span are clamped to the end points rather than extrapolated, so sensor
//! noise beyond the curve can never produce an unbounded pressure.
//!
//! With fewer than two points the calibrator falls back to the straight
//! line through the transducer's nominal range.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

/// Capacity of the fixed-size point store.
pub const MAX_CALIBRATION_POINTS: usize = 16;

/// Coverage fraction below which a calibration is flagged.
const MIN_COVERAGE: f64 = 0.8;
/// R² below which a calibration is flagged as non-linear.
const MIN_R_SQUARED: f64 = 0.99;

/// A single calibration point mapping loop current to pressure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub current_ma: f64,
    pub pressure_psi: f64,
}

impl CalibrationPoint {
    pub const fn new(current_ma: f64, pressure_psi: f64) -> Self {
        Self {
            current_ma,
            pressure_psi,
        }
    }

    fn is_finite(&self) -> bool {
        self.current_ma.is_finite() && self.pressure_psi.is_finite()
    }
}

/// Nominal transducer range used when no calibration curve is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransducerRange {
    pub min_current_ma: f64,
    pub max_current_ma: f64,
    pub min_pressure_psi: f64,
    pub max_pressure_psi: f64,
}

impl Default for TransducerRange {
    fn default() -> Self {
        Self {
            min_current_ma: 4.0,
            max_current_ma: 20.0,
            min_pressure_psi: 0.0,
            max_pressure_psi: 1.0,
        }
    }
}

/// Advisory quality metrics for the loaded calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationReport {
    pub num_points: usize,
    /// Current span actually covered by points (mA).
    pub current_span_ma: f64,
    /// Fraction of the transducer's nominal current span covered (0.0–1.0+).
    pub range_coverage: f64,
    /// Linear-fit coefficient of determination of pressure vs. current.
    pub r_squared: f64,
    pub min_current_ma: f64,
    pub max_current_ma: f64,
    pub min_pressure_psi: f64,
    pub max_pressure_psi: f64,
    pub low_coverage: bool,
    pub poor_linearity: bool,
}

impl CalibrationReport {
    /// True when neither advisory flag is raised.
    pub fn is_good(&self) -> bool {
        !self.low_coverage && !self.poor_linearity
    }
}

/// Piecewise-linear current → pressure converter.
#[derive(Debug, Clone)]
pub struct Calibrator {
    range: TransducerRange,
    /// Sorted ascending by current, strictly increasing.
    points: heapless::Vec<CalibrationPoint, MAX_CALIBRATION_POINTS>,
}

impl Calibrator {
    /// A calibrator with no points; converts along the range line.
    pub fn new(range: TransducerRange) -> Self {
        Self {
            range,
            points: heapless::Vec::new(),
        }
    }

    /// Build from station configuration.  Invalid point sets are rejected
    /// and the range line is used instead.
    pub fn from_config(config: &CalibrationConfig) -> Self {
        let mut cal = Self::new(TransducerRange {
            min_current_ma: config.min_current_ma,
            max_current_ma: config.max_current_ma,
            min_pressure_psi: config.min_pressure_psi,
            max_pressure_psi: config.max_pressure_psi,
        });
        if !config.points.is_empty() {
            if let Err(e) = cal.replace_points(&config.points) {
                warn!("calibration points rejected ({e}), using range line");
            }
        }
        cal
    }

    /// Convert a loop current into pressure.  Never fails.
    pub fn pressure_of(&self, current_ma: f64) -> f64 {
        let points = self.points.as_slice();
        if points.len() < 2 {
            return self.range_line(current_ma);
        }

        let first = points[0];
        let last = points[points.len() - 1];
        if current_ma <= first.current_ma {
            return first.pressure_psi;
        }
        if current_ma >= last.current_ma {
            return last.pressure_psi;
        }

        // NaN falls through both comparisons above and matches no window.
        points
            .windows(2)
            .find(|w| w[0].current_ma <= current_ma && current_ma <= w[1].current_ma)
            .map_or(first.pressure_psi, |w| interpolate(w[0], w[1], current_ma))
    }

    /// Add one point, keeping the set sorted.
    pub fn add_point(&mut self, point: CalibrationPoint) -> Result<(), CalibrationError> {
        if !point.is_finite() {
            return Err(CalibrationError::NonFinite);
        }
        if self.points.iter().any(|p| p.current_ma == point.current_ma) {
            return Err(CalibrationError::DuplicateCurrent);
        }
        let idx = self
            .points
            .iter()
            .position(|p| p.current_ma > point.current_ma)
            .unwrap_or(self.points.len());
        self.points
            .insert(idx, point)
            .map_err(|_| CalibrationError::CapacityExceeded)?;
        info!(
            "added calibration point {:.3} mA -> {:.4} psi",
            point.current_ma, point.pressure_psi
        );
        Ok(())
    }

    /// Replace the whole set.  The existing set is kept on error.
    pub fn replace_points(&mut self, points: &[CalibrationPoint]) -> Result<(), CalibrationError> {
        if points.len() < 2 {
            return Err(CalibrationError::TooFewPoints);
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }
        let mut sorted: heapless::Vec<CalibrationPoint, MAX_CALIBRATION_POINTS> =
            heapless::Vec::from_slice(points).map_err(|_| CalibrationError::CapacityExceeded)?;
        sorted.sort_unstable_by(|a, b| a.current_ma.total_cmp(&b.current_ma));
        if sorted.windows(2).any(|w| w[0].current_ma == w[1].current_ma) {
            return Err(CalibrationError::DuplicateCurrent);
        }
        self.points = sorted;
        info!("calibration replaced with {} points", self.points.len());
        Ok(())
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn range(&self) -> TransducerRange {
        self.range
    }

    /// Compute coverage and linearity.  Advisory only: the calibrator keeps
    /// converting regardless of the outcome.  `None` with fewer than two
    /// points.
    pub fn validate(&self) -> Option<CalibrationReport> {
        let points = self.points.as_slice();
        if points.len() < 2 {
            return None;
        }
        let first = points[0];
        let last = points[points.len() - 1];

        let current_span_ma = last.current_ma - first.current_ma;
        let expected_span = self.range.max_current_ma - self.range.min_current_ma;
        let range_coverage = if expected_span > 0.0 {
            current_span_ma / expected_span
        } else {
            0.0
        };
        let r_squared = r_squared(points);

        let report = CalibrationReport {
            num_points: points.len(),
            current_span_ma,
            range_coverage,
            r_squared,
            min_current_ma: first.current_ma,
            max_current_ma: last.current_ma,
            min_pressure_psi: first.pressure_psi,
            max_pressure_psi: last.pressure_psi,
            low_coverage: range_coverage < MIN_COVERAGE,
            poor_linearity: r_squared < MIN_R_SQUARED,
        };
        if report.low_coverage {
            warn!(
                "calibration covers only {:.0}% of the current range",
                range_coverage * 100.0
            );
        }
        if report.poor_linearity {
            warn!("calibration linearity R²={r_squared:.4} below {MIN_R_SQUARED}");
        }
        Some(report)
    }

    fn range_line(&self, current_ma: f64) -> f64 {
        let r = self.range;
        let current_span = r.max_current_ma - r.min_current_ma;
        if current_span == 0.0 {
            return r.min_pressure_psi;
        }
        let slope = (r.max_pressure_psi - r.min_pressure_psi) / current_span;
        let intercept = r.min_pressure_psi - slope * r.min_current_ma;
        slope * current_ma + intercept
    }
}

fn interpolate(a: CalibrationPoint, b: CalibrationPoint, current_ma: f64) -> f64 {
    let dx = b.current_ma - a.current_ma;
    if dx == 0.0 {
        return a.pressure_psi;
    }
    a.pressure_psi + (b.pressure_psi - a.pressure_psi) * (current_ma - a.current_ma) / dx
}

/// Squared Pearson correlation; exactly 1.0 for two points.
fn r_squared(points: &[CalibrationPoint]) -> f64 {
    if points.len() < 3 {
        return 1.0;
    }
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        sx += p.current_ma;
        sy += p.pressure_psi;
        sxy += p.current_ma * p.pressure_psi;
        sxx += p.current_ma * p.current_ma;
        syy += p.pressure_psi * p.pressure_psi;
    }
    let numerator = n * sxy - sx * sy;
    let denominator = ((n * sxx - sx * sx) * (n * syy - sy * sy)).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    (numerator / denominator).powi(2)
}
