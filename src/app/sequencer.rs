//! Test sequencer: the hexagonal core.
//!
//! [`Sequencer`] owns the validated config, the phase table and the
//! emergency-stop latch.  Each call to [`Sequencer::run`] drives one full
//! cycle against whatever rig, clock and event sink are injected, so the
//! same sequencer runs on relay hardware, the simulator, or a mock.
//!
//! ```text
//!  PressureSensor ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                     │        Sequencer         │
//!  ValveActuator  ◀── │  phases · safety · decay │ ◀── EmergencyStop
//!  CylinderActuator◀─ └──────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};

use crate::config::TestConfig;
use crate::error::{Error, Result, RunFault};
use crate::fsm::context::{RunContext, TestRun};
use crate::fsm::phases::build_phase_table;
use crate::fsm::{PhaseMachine, PhaseTable, TestPhase};

use super::estop::{self, EmergencyStop};
use super::events::RunEvent;
use super::ports::{Clock, CylinderActuator, EventSink, TestRig, ValveActuator};

pub struct Sequencer {
    config: TestConfig,
    table: PhaseTable,
    estop: EmergencyStop,
    active: AtomicBool,
}

impl Sequencer {
    /// The config is validated when a run starts, not here, so a rejected
    /// config reaches the event sink.
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            table: build_phase_table(),
            estop: EmergencyStop::new(),
            active: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Replace the config between runs.
    pub fn set_config(&mut self, config: TestConfig) -> core::result::Result<(), RunFault> {
        config.validate()?;
        self.config = config;
        info!("test config updated");
        Ok(())
    }

    /// A handle that can latch the emergency stop from any thread.
    pub fn estop(&self) -> EmergencyStop {
        self.estop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    // ── Run ───────────────────────────────────────────────────

    /// Execute one complete test cycle.
    ///
    /// Returns the run record for every cycle that started, whatever its
    /// result.  `Err` means the run was refused before any actuator moved:
    /// another run is active, the config is invalid, or the emergency stop
    /// is latched.
    pub fn run<R: TestRig>(
        &self,
        rig: &mut R,
        clock: &mut impl Clock,
        sink: &mut impl EventSink,
    ) -> Result<TestRun> {
        let _guard = RunGuard::acquire(&self.active).ok_or(Error::Busy)?;

        let refused = match self.config.validate() {
            Err(fault) => Some(fault),
            Ok(()) if self.estop.is_triggered() => Some(RunFault::EmergencyStop),
            Ok(()) => None,
        };
        if let Some(fault) = refused {
            error!("run refused: {fault}");
            sink.emit(&RunEvent::Fault {
                phase: TestPhase::Ready,
                fault,
                during_cleanup: false,
            });
            return Err(fault.into());
        }

        info!(
            "run starting: fill {:.2} psi for {:.1}s, test window {:.1}s, max leak {:.4} psi/s",
            self.config.target_fill_pressure,
            self.config.fill_time,
            self.config.test_duration,
            self.config.max_leak_rate
        );

        let mut ctx = RunContext::new(&self.config, rig, clock, sink, &self.estop);
        PhaseMachine::new(&self.table).run(&mut ctx);
        let run = ctx.finish();

        sink.emit(&RunEvent::Finished {
            result: run.result,
            summary: run.summary(),
        });
        Ok(run)
    }

    /// Latch the emergency stop and de-energise the rig directly.
    ///
    /// For use while no run holds the rig; during a run, trigger
    /// [`Sequencer::estop`] instead and the run reacts within one hold
    /// slice.  Idempotent.
    pub fn emergency_stop(
        &self,
        rig: &mut (impl ValveActuator + CylinderActuator),
    ) -> Result<()> {
        self.estop.trigger();
        estop::de_energize_all(rig)?;
        Ok(())
    }
}

/// Marks the sequencer busy for the lifetime of one run.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
