//! Fuzz target: station config document
//!
//! Feeds arbitrary bytes to the JSON config parser and, when a document
//! parses, runs validation and builds the calibrator from it:
//! - No panics on malformed or hostile documents
//! - Validation and calibrator construction never panic on parsed values
//! - A config that validates converts every timing to a `Duration`
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use leaktester::config::StationConfig;
use leaktester::sensors::calibration::Calibrator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(config) = serde_json::from_slice::<StationConfig>(data) else {
        return;
    };
    if config.test.validate().is_ok() {
        let t = &config.test;
        let _ = [
            t.extend_duration(),
            t.fill_duration(),
            t.stabilize_duration(),
            t.test_window(),
            t.exhaust_duration(),
            t.retract_duration(),
        ];
    }
    let cal = Calibrator::from_config(&config.calibration);
    let _ = cal.pressure_of(4.0);
    let _ = cal.pressure_of(20.0);
});
