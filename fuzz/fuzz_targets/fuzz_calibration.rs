//! Fuzz target: calibration curve
//!
//! Decodes the input as (current, pressure) pairs of little-endian `f64`s,
//! loads them through `replace_points` and checks:
//! - No panics for any point set, NaN and infinities included
//! - A rejected set leaves the previous curve in place
//! - An accepted curve is clamped to its end points
//!
//! cargo fuzz run fuzz_calibration

#![no_main]

use leaktester::sensors::calibration::{CalibrationPoint, Calibrator, TransducerRange};
use libfuzzer_sys::fuzz_target;

fn f64_at(chunk: &[u8]) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(chunk);
    f64::from_le_bytes(raw)
}

fuzz_target!(|data: &[u8]| {
    let points: Vec<CalibrationPoint> = data
        .chunks_exact(16)
        .map(|c| CalibrationPoint::new(f64_at(&c[..8]), f64_at(&c[8..])))
        .collect();

    let mut cal = Calibrator::new(TransducerRange::default());
    let before = cal.pressure_of(12.0);

    match cal.replace_points(&points) {
        Err(_) => {
            assert!(cal.points().is_empty());
            assert_eq!(cal.pressure_of(12.0), before);
        }
        Ok(()) => {
            let stored = cal.points();
            assert!(stored.windows(2).all(|w| w[0].current_ma < w[1].current_ma));
            let first = stored[0];
            let last = stored[stored.len() - 1];
            assert_eq!(cal.pressure_of(first.current_ma - 1.0), first.pressure_psi);
            assert_eq!(cal.pressure_of(last.current_ma + 1.0), last.pressure_psi);
            let _ = cal.pressure_of(f64::NAN);
            let _ = cal.validate();
        }
    }
});
