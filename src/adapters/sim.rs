//! Simulated rig and virtual clock.
//!
//! Lets the binary demonstrate a full cycle and the integration tests run
//! whole runs without hardware or wall-clock waits.
//!
//! - [`SimClock`] is a shared virtual clock.  `sleep` advances it; in
//!   real-time mode it also blocks the thread for the same span.
//! - [`SimulatedRig`] models the DUT as a single pneumatic volume: a
//!   first-order approach to the supply pressure while the fill valve is
//!   open, exponential venting through the exhaust valve, and a constant
//!   leak otherwise.  The DUT only holds pressure while clamped.

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::app::ports::{Clock, CylinderActuator, PressureSensor, ValveActuator, ValveId};
use crate::error::{ActuatorError, SensorError};
use crate::sensors::PressureReading;
use crate::sensors::calibration::TransducerRange;

// ---------------------------------------------------------------------------
// Virtual clock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_ns: Arc<AtomicU64>,
    realtime: bool,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock whose `sleep` also blocks the calling thread.
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            ..Self::default()
        }
    }

    /// Move time forward without blocking.
    pub fn advance(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_add(ns, Ordering::AcqRel);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns.load(Ordering::Acquire))
    }

    fn sleep(&mut self, duration: Duration) {
        if self.realtime {
            std::thread::sleep(duration);
        }
        self.advance(duration);
    }
}

// ---------------------------------------------------------------------------
// Pneumatic model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PneumaticModel {
    /// Regulated supply pressure behind the fill valve (psi).
    pub supply_psi: f64,
    /// Fill time constant (s).
    pub fill_tau_s: f64,
    /// Exhaust time constant (s).
    pub exhaust_tau_s: f64,
    /// Pressure lost per second while sealed (psi/s).
    pub leak_psi_per_s: f64,
}

impl Default for PneumaticModel {
    fn default() -> Self {
        Self {
            supply_psi: 0.82,
            fill_tau_s: 0.8,
            exhaust_tau_s: 0.6,
            leak_psi_per_s: 0.0005,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CylinderPosition {
    Retracted,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stroke {
    Extend,
    Retract,
}

pub struct SimulatedRig {
    clock: SimClock,
    model: PneumaticModel,
    range: TransducerRange,
    pressure_psi: f64,
    updated_at: Duration,
    fill_open: bool,
    exhaust_open: bool,
    energized: Option<Stroke>,
    position: CylinderPosition,
}

impl SimulatedRig {
    pub fn new(clock: SimClock, model: PneumaticModel, range: TransducerRange) -> Self {
        let updated_at = clock.now();
        Self {
            clock,
            model,
            range,
            pressure_psi: 0.0,
            updated_at,
            fill_open: false,
            exhaust_open: false,
            energized: None,
            position: CylinderPosition::Retracted,
        }
    }

    pub fn position(&self) -> CylinderPosition {
        self.position
    }

    pub fn is_open(&self, id: ValveId) -> bool {
        match id {
            ValveId::Fill => self.fill_open,
            ValveId::Exhaust => self.exhaust_open,
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.fill_open && !self.exhaust_open && self.energized.is_none()
    }

    /// Integrate the model up to the clock's current time.
    fn settle(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_sub(self.updated_at).as_secs_f64();
        self.updated_at = now;
        if dt == 0.0 {
            return;
        }
        let m = self.model;
        let mut p = self.pressure_psi;
        if self.position != CylinderPosition::Extended {
            // Unclamped DUT cannot hold pressure.
            p = 0.0;
        } else {
            if self.fill_open {
                p += (m.supply_psi - p) * (1.0 - (-dt / m.fill_tau_s).exp());
            }
            if self.exhaust_open {
                p *= (-dt / m.exhaust_tau_s).exp();
            }
            if !self.fill_open && !self.exhaust_open {
                p = (p - m.leak_psi_per_s * dt).max(0.0);
            }
        }
        self.pressure_psi = p;
    }

    fn set_valve(&mut self, id: ValveId, open: bool) {
        self.settle();
        match id {
            ValveId::Fill => self.fill_open = open,
            ValveId::Exhaust => self.exhaust_open = open,
        }
        debug!("sim: {id} valve {}", if open { "open" } else { "closed" });
    }

    fn energize(&mut self, stroke: Stroke) -> Result<(), ActuatorError> {
        if self.energized.is_some_and(|s| s != stroke) {
            return Err(ActuatorError::InterlockViolation);
        }
        self.settle();
        self.energized = Some(stroke);
        Ok(())
    }

    fn current_of(&self, pressure_psi: f64) -> f64 {
        let r = self.range;
        let span_psi = r.max_pressure_psi - r.min_pressure_psi;
        if span_psi == 0.0 {
            return r.min_current_ma;
        }
        r.min_current_ma
            + (pressure_psi - r.min_pressure_psi) * (r.max_current_ma - r.min_current_ma)
                / span_psi
    }
}

impl ValveActuator for SimulatedRig {
    fn open(&mut self, id: ValveId) -> Result<(), ActuatorError> {
        self.set_valve(id, true);
        Ok(())
    }

    fn close(&mut self, id: ValveId) -> Result<(), ActuatorError> {
        self.set_valve(id, false);
        Ok(())
    }

    fn close_all(&mut self) -> Result<(), ActuatorError> {
        self.set_valve(ValveId::Fill, false);
        self.set_valve(ValveId::Exhaust, false);
        Ok(())
    }
}

impl CylinderActuator for SimulatedRig {
    fn extend(&mut self, _travel: Duration) -> Result<(), ActuatorError> {
        self.energize(Stroke::Extend)
    }

    fn retract(&mut self, _travel: Duration) -> Result<(), ActuatorError> {
        self.energize(Stroke::Retract)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        self.settle();
        // Solenoids are held for the full travel time, so the stroke
        // completes before de-energising.
        match self.energized.take() {
            Some(Stroke::Extend) => self.position = CylinderPosition::Extended,
            Some(Stroke::Retract) => self.position = CylinderPosition::Retracted,
            None => {}
        }
        Ok(())
    }
}

impl PressureSensor for SimulatedRig {
    fn read(&mut self) -> Result<PressureReading, SensorError> {
        self.settle();
        Ok(PressureReading {
            pressure_psi: self.pressure_psi,
            raw_current_ma: self.current_of(self.pressure_psi),
        })
    }
}
