//! Pressure-decay regression and leak-rate conversion.
//!
//! `slope_of` fits pressure against elapsed time by ordinary least squares
//! over every sample in the isolated test window.  `leak_rate_of` turns that
//! slope into an equivalent standard-condition flow:
//!
//! ```text
//! LR [sccm] = V [cc] · |dP/dt| [psi/s] · 60 [s/min] / 14.69 [psi]
//! ```
//!
//! The linearisation only holds for excursions that are small against one
//! atmosphere, as in the 0–1 psig test range.  Larger test pressures need
//! the constant re-derived.

use crate::fsm::context::PressureSample;

/// Standard atmosphere (psi) used to linearise the ideal-gas relation.
pub const STANDARD_ATMOSPHERE_PSI: f64 = 14.69;

/// Least-squares decay slope in psi/s (negative while pressure falls).
///
/// Returns 0.0 with fewer than two samples or when every sample carries the
/// same timestamp.
pub fn slope_of(samples: &[PressureSample]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean_t = samples.iter().map(|s| s.elapsed_s).sum::<f64>() / n;
    let mean_p = samples.iter().map(|s| s.pressure_psi).sum::<f64>() / n;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for s in samples {
        let dt = s.elapsed_s - mean_t;
        sxy += dt * (s.pressure_psi - mean_p);
        sxx += dt * dt;
    }
    if sxx == 0.0 {
        return 0.0;
    }
    sxy / sxx
}

/// Convert a decay slope into a leak rate in sccm.  Always non-negative.
pub fn leak_rate_of(slope_psi_per_s: f64, volume_cc: f64) -> f64 {
    (volume_cc * slope_psi_per_s.abs() * 60.0 / STANDARD_ATMOSPHERE_PSI).abs()
}
