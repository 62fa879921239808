//! Relay-board rig adapter: real outputs behind the port traits.
//!
//! Four relay channels drive the solenoids: fill valve, exhaust valve,
//! cylinder extend and cylinder retract.  Each channel is any
//! `embedded-hal` [`OutputPin`], so the adapter runs unchanged on a GPIO
//! expander, a USB relay board, or a microcontroller's own pins.  The
//! pressure sensor is owned alongside so one `&mut RelayRig` satisfies
//! [`TestRig`](crate::app::ports::TestRig).
//!
//! ## Interlock
//!
//! Extend and retract are never energised together: before either coil is
//! driven the opposite one is released, and a failure to release it aborts
//! the command with [`ActuatorError::InterlockViolation`].

use core::time::Duration;

use embedded_hal::digital::{Error as _, OutputPin};
use log::{debug, error};

use crate::app::ports::{CylinderActuator, PressureSensor, ValveActuator, ValveId};
use crate::error::{ActuatorError, SensorError};
use crate::sensors::PressureReading;

/// The four relay outputs.
pub struct RelayOutputs<P> {
    pub fill: P,
    pub exhaust: P,
    pub extend: P,
    pub retract: P,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relay {
    Fill,
    Exhaust,
    Extend,
    Retract,
}

impl Relay {
    const fn name(self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::Exhaust => "exhaust",
            Self::Extend => "extend",
            Self::Retract => "retract",
        }
    }
}

impl From<ValveId> for Relay {
    fn from(id: ValveId) -> Self {
        match id {
            ValveId::Fill => Self::Fill,
            ValveId::Exhaust => Self::Exhaust,
        }
    }
}

pub struct RelayRig<P, S> {
    relays: RelayOutputs<P>,
    sensor: S,
    /// Relay boards that energise on a low input.
    active_low: bool,
}

impl<P: OutputPin, S> RelayRig<P, S> {
    pub fn new(relays: RelayOutputs<P>, sensor: S, active_low: bool) -> Self {
        Self {
            relays,
            sensor,
            active_low,
        }
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    fn drive(&mut self, relay: Relay, energise: bool) -> Result<(), ActuatorError> {
        let pin = match relay {
            Relay::Fill => &mut self.relays.fill,
            Relay::Exhaust => &mut self.relays.exhaust,
            Relay::Extend => &mut self.relays.extend,
            Relay::Retract => &mut self.relays.retract,
        };
        let result = if energise != self.active_low {
            pin.set_high()
        } else {
            pin.set_low()
        };
        result.map_err(|e| {
            error!("relay {} write failed: {:?}", relay.name(), e.kind());
            ActuatorError::RelayWriteFailed
        })?;
        debug!("relay {} {}", relay.name(), if energise { "on" } else { "off" });
        Ok(())
    }

    fn valve(&mut self, id: ValveId, open: bool) -> Result<(), ActuatorError> {
        self.drive(id.into(), open)
            .map_err(|_| ActuatorError::Valve(id))
    }

    fn stroke(&mut self, coil: Relay, opposite: Relay) -> Result<(), ActuatorError> {
        self.drive(opposite, false)
            .map_err(|_| ActuatorError::InterlockViolation)?;
        self.drive(coil, true).map_err(|_| ActuatorError::Cylinder)
    }
}

impl<P: OutputPin, S> ValveActuator for RelayRig<P, S> {
    fn open(&mut self, id: ValveId) -> Result<(), ActuatorError> {
        self.valve(id, true)
    }

    fn close(&mut self, id: ValveId) -> Result<(), ActuatorError> {
        self.valve(id, false)
    }

    fn close_all(&mut self) -> Result<(), ActuatorError> {
        let fill = self.valve(ValveId::Fill, false);
        let exhaust = self.valve(ValveId::Exhaust, false);
        fill.and(exhaust)
    }
}

impl<P: OutputPin, S> CylinderActuator for RelayRig<P, S> {
    fn extend(&mut self, travel: Duration) -> Result<(), ActuatorError> {
        debug!("extend for {:.1}s", travel.as_secs_f64());
        self.stroke(Relay::Extend, Relay::Retract)
    }

    fn retract(&mut self, travel: Duration) -> Result<(), ActuatorError> {
        debug!("retract for {:.1}s", travel.as_secs_f64());
        self.stroke(Relay::Retract, Relay::Extend)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        let extend = self.drive(Relay::Extend, false);
        let retract = self.drive(Relay::Retract, false);
        extend.and(retract).map_err(|_| ActuatorError::Cylinder)
    }
}

impl<P: OutputPin, S: PressureSensor> PressureSensor for RelayRig<P, S> {
    fn read(&mut self) -> Result<PressureReading, SensorError> {
        self.sensor.read()
    }
}
