//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each [`RunEvent`] through the `log`
//! facade, one tagged line per event.  Samples go out at `debug` so a
//! normal run log shows phases, warnings and the verdict only.

use log::{debug, error, info, warn};

use crate::app::events::{RunEvent, RunWarning};
use crate::app::ports::EventSink;

/// Adapter that logs every [`RunEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &RunEvent) {
        match event {
            RunEvent::PhaseChanged { from, to } => {
                info!("PHASE | {} -> {}", from, to);
            }
            RunEvent::PressureSample {
                phase,
                run_elapsed_s,
                reading,
            } => {
                debug!(
                    "SAMPLE | {} | t={:.1}s | p={:.4} psi | i={:.3} mA",
                    phase, run_elapsed_s, reading.pressure_psi, reading.raw_current_ma
                );
            }
            RunEvent::Warning(RunWarning::Underfill {
                pressure_psi,
                minimum_psi,
            }) => {
                warn!(
                    "WARN | underfill {:.3} psi < {:.3} psi",
                    pressure_psi, minimum_psi
                );
            }
            RunEvent::Fault {
                phase,
                fault,
                during_cleanup,
            } => {
                if *during_cleanup {
                    warn!("FAULT | {} (cleanup) | {}", phase, fault);
                } else {
                    error!("FAULT | {} | {}", phase, fault);
                }
            }
            RunEvent::Finished { result, summary } => {
                info!(
                    "RESULT | {} | phase={} | drop={} psi | rate={} psi/s | \
                     slope={} psi/s | {} sccm | peak={} psi | {} samples | {:.1}s",
                    result,
                    summary.final_phase,
                    fmt_opt(summary.pressure_drop_psi, 4),
                    fmt_opt(summary.leak_rate_psi_per_s, 5),
                    fmt_opt(summary.decay_slope_psi_per_s, 5),
                    fmt_opt(summary.leak_rate_sccm, 2),
                    fmt_opt(summary.max_pressure_psi, 3),
                    summary.samples,
                    summary.duration_s,
                );
                if let Some(trip) = summary.safety_trip {
                    error!(
                        "SAFETY | tripped at {:.3} psi during {}",
                        trip.pressure_psi, trip.phase
                    );
                }
            }
        }
    }
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "-".into(),
    }
}
