//! Results log: one CSV row per finished run.
//!
//! Only [`RunEvent::Finished`] is recorded.  The file is opened in append
//! mode for every row, so restarts keep adding to the same log; the header
//! is written only when the file is new or empty.  Write errors are logged
//! and never reach the run.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error};
use serde::Serialize;

use crate::app::events::{RunEvent, RunSummary};
use crate::app::ports::EventSink;
use crate::config::TestConfig;
use crate::fsm::context::TestResult;

/// One results-log row.  Column order follows field order.
#[derive(Debug, Serialize)]
struct ResultRecord {
    unix_time_s: u64,
    test_id: u32,
    result: String,
    final_phase: &'static str,
    duration_s: f64,
    start_pressure_psi: Option<f64>,
    end_pressure_psi: Option<f64>,
    pressure_drop_psi: Option<f64>,
    leak_rate_psi_per_s: Option<f64>,
    leak_rate_sccm: Option<f64>,
    max_pressure_psi: Option<f64>,
    samples: usize,
    target_fill_pressure: f64,
    max_leak_rate: f64,
    fill_time: f64,
    stabilize_time: f64,
    test_duration: f64,
    fault: String,
    safety_trip_phase: Option<&'static str>,
    safety_trip_psi: Option<f64>,
}

/// Appends a row to a CSV file for every finished run.
pub struct CsvResultSink {
    path: PathBuf,
    /// Limits and timings copied into every row.
    config: TestConfig,
    next_id: u32,
}

impl CsvResultSink {
    pub fn new(path: impl Into<PathBuf>, config: &TestConfig) -> Self {
        Self {
            path: path.into(),
            config: config.clone(),
            next_id: 1,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, result: TestResult, summary: &RunSummary) -> Result<(), csv::Error> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let fresh = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        writer.serialize(self.record(result, summary))?;
        writer.flush()?;
        Ok(())
    }

    fn record(&self, result: TestResult, s: &RunSummary) -> ResultRecord {
        let unix_time_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        ResultRecord {
            unix_time_s,
            test_id: self.next_id,
            result: result.to_string(),
            final_phase: s.final_phase.name(),
            duration_s: s.duration_s,
            start_pressure_psi: s.start_pressure_psi,
            end_pressure_psi: s.end_pressure_psi,
            pressure_drop_psi: s.pressure_drop_psi,
            leak_rate_psi_per_s: s.leak_rate_psi_per_s,
            leak_rate_sccm: s.leak_rate_sccm,
            max_pressure_psi: s.max_pressure_psi,
            samples: s.samples,
            target_fill_pressure: self.config.target_fill_pressure,
            max_leak_rate: self.config.max_leak_rate,
            fill_time: self.config.fill_time,
            stabilize_time: self.config.stabilize_time,
            test_duration: self.config.test_duration,
            fault: s.fault.map(|f| f.to_string()).unwrap_or_default(),
            safety_trip_phase: s.safety_trip.map(|t| t.phase.name()),
            safety_trip_psi: s.safety_trip.map(|t| t.pressure_psi),
        }
    }
}

impl EventSink for CsvResultSink {
    fn emit(&mut self, event: &RunEvent) {
        let RunEvent::Finished { result, summary } = event else {
            return;
        };
        match self.append(*result, summary) {
            Ok(()) => {
                debug!("run {} logged to {}", self.next_id, self.path.display());
                self.next_id += 1;
            }
            Err(e) => error!("results log {}: {e}", self.path.display()),
        }
    }
}
