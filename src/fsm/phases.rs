//! Concrete phase functions and the table builder.
//!
//! Each phase is one plain `fn` pointer that runs to completion.  Bodies
//! that need `?` are written against `Result<(), RunFault>` and converted
//! into a [`PhaseOutcome`] at the table boundary, which classifies the
//! fault as fatal or abort-to-cleanup.
//!
//! Primary holds are interruptible by the emergency-stop latch.  Cleanup
//! holds (`Exhausting`, `RetractingCylinders`) always run to the end.

use core::time::Duration;

use log::{debug, info, warn};

use super::context::{Hold, PressureSample, RunContext, TestResult};
use super::{PhaseDescriptor, PhaseOutcome, PhaseTable, TestPhase};
use crate::analysis::decay;
use crate::app::events::RunWarning;
use crate::app::ports::ValveId;
use crate::error::RunFault;

/// Pressure poll period while stabilising.
pub const STABILIZE_POLL: Duration = Duration::from_secs(2);
/// Sample period across the decay window.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the phase table.  Called once per sequencer.
pub fn build_phase_table() -> PhaseTable {
    [
        PhaseDescriptor {
            phase: TestPhase::ExtendingCylinders,
            run: extending_cylinders,
            next: TestPhase::FillingDUT,
        },
        PhaseDescriptor {
            phase: TestPhase::FillingDUT,
            run: filling_dut,
            next: TestPhase::Stabilizing,
        },
        PhaseDescriptor {
            phase: TestPhase::Stabilizing,
            run: stabilizing,
            next: TestPhase::Isolating,
        },
        PhaseDescriptor {
            phase: TestPhase::Isolating,
            run: isolating,
            next: TestPhase::Testing,
        },
        PhaseDescriptor {
            phase: TestPhase::Testing,
            run: testing,
            next: TestPhase::Evaluating,
        },
        PhaseDescriptor {
            phase: TestPhase::Evaluating,
            run: evaluating,
            next: TestPhase::Exhausting,
        },
        // Cleanup
        PhaseDescriptor {
            phase: TestPhase::Exhausting,
            run: exhausting,
            next: TestPhase::RetractingCylinders,
        },
        PhaseDescriptor {
            phase: TestPhase::RetractingCylinders,
            run: retracting_cylinders,
            next: TestPhase::Complete,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Primary sequence
// ═══════════════════════════════════════════════════════════════════════════

fn extending_cylinders(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    extend(ctx).into()
}

fn extend(ctx: &mut RunContext<'_>) -> Result<(), RunFault> {
    let travel = ctx.config.extend_duration();
    info!("EXTEND: clamping DUT ({:.1}s)", travel.as_secs_f64());
    ctx.rig().extend(travel)?;
    let held = ctx.hold(travel, Hold::Interruptible);
    let stopped = ctx.rig().stop();
    held?;
    stopped?;
    Ok(())
}

fn filling_dut(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    fill(ctx).into()
}

fn fill(ctx: &mut RunContext<'_>) -> Result<(), RunFault> {
    let fill_time = ctx.config.fill_duration();
    let before = ctx.read_pressure()?;
    info!(
        "FILL: {:.3} psi before fill, filling for {:.1}s",
        before.pressure_psi,
        fill_time.as_secs_f64()
    );

    ctx.rig().open(ValveId::Fill)?;
    let held = ctx.hold(fill_time, Hold::Interruptible);
    let closed = ctx.rig().close(ValveId::Fill);
    held?;
    closed?;

    let after = ctx.read_pressure()?;
    let minimum_psi = ctx.config.min_fill_pressure();
    if after.pressure_psi < minimum_psi {
        warn!(
            "FILL: {:.3} psi is below target {:.3} psi (tolerance {:.3})",
            after.pressure_psi, ctx.config.target_fill_pressure, ctx.config.pressure_tolerance
        );
        ctx.warn(RunWarning::Underfill {
            pressure_psi: after.pressure_psi,
            minimum_psi,
        });
    } else {
        info!("FILL: reached {:.3} psi", after.pressure_psi);
    }
    Ok(())
}

fn stabilizing(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    let window = ctx.config.stabilize_duration();
    info!("STABILIZE: settling for {:.1}s", window.as_secs_f64());
    watch(ctx, window, STABILIZE_POLL, false).into()
}

fn isolating(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    isolate(ctx).into()
}

fn isolate(ctx: &mut RunContext<'_>) -> Result<(), RunFault> {
    ctx.rig().close_all()?;
    let reading = ctx.read_checked()?;
    info!("ISOLATE: DUT sealed at {:.3} psi", reading.pressure_psi);
    Ok(())
}

fn testing(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    let window = ctx.config.test_window();
    info!("TEST: observing decay for {:.1}s", window.as_secs_f64());
    ctx.run.samples.clear();
    watch(ctx, window, SAMPLE_PERIOD, true).into()
}

/// Read and safety-check pressure every `period` from elapsed 0 until the
/// window has passed, appending to the run's samples when `record` is set.
fn watch(
    ctx: &mut RunContext<'_>,
    window: Duration,
    period: Duration,
    record: bool,
) -> Result<(), RunFault> {
    let start = ctx.now();
    loop {
        let elapsed = ctx.now().saturating_sub(start);
        let reading = ctx.read_checked()?;
        debug!(
            "{}: t={:.1}s p={:.4} psi i={:.3} mA",
            ctx.run.phase,
            elapsed.as_secs_f64(),
            reading.pressure_psi,
            reading.raw_current_ma
        );
        if record {
            ctx.run.samples.push(PressureSample::new(
                elapsed.as_secs_f64(),
                reading.pressure_psi,
                reading.raw_current_ma,
            ));
        }
        if elapsed >= window {
            return Ok(());
        }
        ctx.hold(period.min(window - elapsed), Hold::Interruptible)?;
    }
}

fn evaluating(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    evaluate(ctx).into()
}

fn evaluate(ctx: &mut RunContext<'_>) -> Result<(), RunFault> {
    let samples = &ctx.run.samples;
    let (first, last) = match samples.as_slice() {
        [first, .., last] => (*first, *last),
        _ => {
            return Err(RunFault::InsufficientData {
                samples: samples.len(),
            });
        }
    };

    let drop_psi = first.pressure_psi - last.pressure_psi;
    let elapsed_s = last.elapsed_s - first.elapsed_s;
    let leak_rate = if elapsed_s > 0.0 {
        drop_psi / elapsed_s
    } else {
        0.0
    };
    let slope = decay::slope_of(samples);
    let sccm = decay::leak_rate_of(slope, ctx.config.test_volume_cc);

    let run = &mut ctx.run;
    run.start_pressure_psi = Some(first.pressure_psi);
    run.end_pressure_psi = Some(last.pressure_psi);
    run.pressure_drop_psi = Some(drop_psi);
    run.leak_rate_psi_per_s = Some(leak_rate);
    run.decay_slope_psi_per_s = Some(slope);
    run.leak_rate_sccm = Some(sccm);

    // A stop raised while the window closed beats the verdict.
    ctx.hold(Duration::ZERO, Hold::Interruptible)?;

    let verdict = if leak_rate <= ctx.config.max_leak_rate {
        TestResult::Pass
    } else {
        TestResult::Fail
    };
    ctx.run.set_result(verdict);
    info!(
        "EVALUATE: {verdict} | drop={drop_psi:.4} psi over {elapsed_s:.1}s | \
         rate={leak_rate:.5} psi/s (max {:.5}) | slope={slope:.5} psi/s | {sccm:.2} sccm",
        ctx.config.max_leak_rate
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  Cleanup, run on every exit path
// ═══════════════════════════════════════════════════════════════════════════

fn exhausting(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    exhaust(ctx).into()
}

fn exhaust(ctx: &mut RunContext<'_>) -> Result<(), RunFault> {
    let vent_time = ctx.config.exhaust_duration();
    info!("EXHAUST: venting for {:.1}s", vent_time.as_secs_f64());
    let rig = ctx.rig();
    let fill_closed = rig.close(ValveId::Fill);
    let opened = rig.open(ValveId::Exhaust);
    if opened.is_ok() {
        ctx.hold(vent_time, Hold::Uninterruptible)?;
    }
    let closed = ctx.rig().close(ValveId::Exhaust);
    fill_closed.and(opened).and(closed)?;
    Ok(())
}

fn retracting_cylinders(ctx: &mut RunContext<'_>) -> PhaseOutcome {
    retract(ctx).into()
}

fn retract(ctx: &mut RunContext<'_>) -> Result<(), RunFault> {
    let travel = ctx.config.retract_duration();
    info!("RETRACT: releasing DUT ({:.1}s)", travel.as_secs_f64());
    let started = ctx.rig().retract(travel);
    if started.is_ok() {
        ctx.hold(travel, Hold::Uninterruptible)?;
    }
    let stopped = ctx.rig().stop();
    started.and(stopped)?;
    Ok(())
}
