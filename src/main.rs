//! Leak tester simulator entry point.
//!
//! Runs full test cycles against the simulated rig so the sequence, the
//! safety trip and the emergency stop can be exercised without hardware.
//!
//! ```text
//! ┌──────────────────────────── worker thread ───────────────────────────┐
//! │  Sequencer ──▶ SimulatedRig (valves · cylinders · transducer)        │
//! │      │                                                               │
//! │      └──▶ (LogEventSink, ChannelEventSink, CsvResultSink) ──┐        │
//! └─────────────────────────────────────────────────────────────│────────┘
//!                                                               ▼ RUN_EVENTS
//! ┌──────────────────────────── main thread ─────────────────────────────┐
//! │  drain loop: progress, emergency-stop trigger, final verdict         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use log::{info, warn};

use leaktester::adapters::channel_sink::{ChannelEventSink, RUN_EVENTS};
use leaktester::adapters::config_file::JsonConfigFile;
use leaktester::adapters::csv_sink::CsvResultSink;
use leaktester::adapters::log_sink::LogEventSink;
use leaktester::adapters::sim::{PneumaticModel, SimClock, SimulatedRig};
use leaktester::app::estop::EmergencyStop;
use leaktester::app::events::{RunEvent, RunSummary};
use leaktester::app::ports::ConfigPort;
use leaktester::app::sequencer::Sequencer;
use leaktester::fsm::TestPhase;
use leaktester::fsm::context::TestResult;
use leaktester::sensors::calibration::Calibrator;

#[derive(Parser)]
#[command(name = "leaktester")]
#[command(author, version, about = "Pneumatic leak test sequencer (simulated rig)")]
struct Cli {
    /// Station config file (JSON); defaults are used if it does not exist
    #[arg(short, long, default_value = "leaktester.json")]
    config: PathBuf,

    /// Write the effective config back to the file before running
    #[arg(long)]
    save_config: bool,

    /// Append one CSV row per finished run to this file
    #[arg(long)]
    results: Option<PathBuf>,

    /// Simulated DUT leak (psi/s)
    #[arg(long, default_value_t = 0.0005)]
    leak: f64,

    /// Supply pressure behind the fill valve (psi); set above the
    /// configured max pressure to exercise the safety trip
    #[arg(long, default_value_t = 0.82)]
    supply: f64,

    /// Latch the emergency stop once the run has been going this long (s)
    #[arg(long, value_name = "SECS")]
    estop_after: Option<f64>,

    /// Pace the simulation in real time instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Number of cycles to run
    #[arg(short = 'n', long, default_value_t = 1)]
    runs: u32,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("leaktester v{}", env!("CARGO_PKG_VERSION"));

    // ── Config ────────────────────────────────────────────────
    let store = JsonConfigFile::new(&cli.config);
    let station = store
        .load()
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if cli.save_config {
        store
            .save(&station)
            .with_context(|| format!("saving {}", cli.config.display()))?;
    }

    let calibrator = Calibrator::from_config(&station.calibration);
    match calibrator.validate() {
        Some(report) if report.is_good() => info!(
            "calibration: {} points, {:.0}% coverage, R²={:.4}",
            report.num_points,
            report.range_coverage * 100.0,
            report.r_squared
        ),
        Some(_) => warn!("calibration quality is poor, results may be off"),
        None => info!("calibration: nominal range line"),
    }

    // ── Rig ───────────────────────────────────────────────────
    let clock = if cli.realtime {
        SimClock::realtime()
    } else {
        SimClock::new()
    };
    let model = PneumaticModel {
        supply_psi: cli.supply,
        leak_psi_per_s: cli.leak,
        ..PneumaticModel::default()
    };
    let sequencer = Sequencer::new(station.test.clone());
    let mut results = cli
        .results
        .as_ref()
        .map(|path| CsvResultSink::new(path, &station.test));

    let mut passed = 0;
    for n in 1..=cli.runs {
        info!("── cycle {n}/{} ──", cli.runs);
        let mut rig = SimulatedRig::new(clock.clone(), model, calibrator.range());
        let estop = sequencer.estop();
        estop.reset();

        let (verdict, record) = std::thread::scope(|s| {
            let seq = &sequencer;
            let rig = &mut rig;
            let results = &mut results;
            let mut run_clock = clock.clone();
            let worker = s.spawn(move || {
                let mut sink = (
                    LogEventSink::new(),
                    (ChannelEventSink::new(&RUN_EVENTS), results),
                );
                seq.run(rig, &mut run_clock, &mut sink)
            });
            let verdict = drain_events(&estop, cli.estop_after);
            (verdict, worker.join())
        });

        let run = record
            .map_err(|_| anyhow!("sequencer thread panicked"))?
            .context("run refused")?;
        if let Some((result, summary)) = verdict {
            print_summary(n, result, &summary);
        }
        if run.result == TestResult::Pass {
            passed += 1;
        }
        for fault in &run.cleanup_faults {
            warn!("cleanup fault on cycle {n}: {fault}");
        }
    }

    info!("{passed}/{} cycles passed", cli.runs);
    Ok(if passed == cli.runs {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// UI side of the event channel.  Returns the verdict, or `None` when the
/// run was refused before starting.
fn drain_events(
    estop: &EmergencyStop,
    estop_after: Option<f64>,
) -> Option<(TestResult, RunSummary)> {
    loop {
        match futures_lite::future::block_on(RUN_EVENTS.receive()) {
            RunEvent::PressureSample { run_elapsed_s, .. } => {
                if estop_after.is_some_and(|t| run_elapsed_s >= t) && !estop.is_triggered() {
                    warn!("operator emergency stop at {run_elapsed_s:.1}s");
                    estop.trigger();
                }
            }
            RunEvent::Fault {
                phase: TestPhase::Ready,
                ..
            } => return None,
            RunEvent::Finished { result, summary } => return Some((result, summary)),
            _ => {}
        }
    }
}

fn print_summary(cycle: u32, result: TestResult, s: &RunSummary) {
    let show = |v: Option<f64>, unit: &str| {
        v.map_or_else(|| "-".to_string(), |v| format!("{v:.5} {unit}"))
    };
    println!("cycle {cycle}: {result} ({})", s.final_phase);
    println!("  start pressure   {}", show(s.start_pressure_psi, "psi"));
    println!("  end pressure     {}", show(s.end_pressure_psi, "psi"));
    println!("  pressure drop    {}", show(s.pressure_drop_psi, "psi"));
    println!("  leak rate        {}", show(s.leak_rate_psi_per_s, "psi/s"));
    println!("  decay slope      {}", show(s.decay_slope_psi_per_s, "psi/s"));
    println!("  equivalent flow  {}", show(s.leak_rate_sccm, "sccm"));
    println!("  peak pressure    {}", show(s.max_pressure_psi, "psi"));
    println!("  samples          {}", s.samples);
    println!("  duration         {:.1} s", s.duration_s);
    if let Some(fault) = s.fault {
        println!("  fault            {fault}");
    }
    if let Some(trip) = s.safety_trip {
        println!(
            "  safety trip      {:.3} psi in {}",
            trip.pressure_psi, trip.phase
        );
    }
}
