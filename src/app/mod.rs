//! Application core: run orchestration, zero direct I/O.
//!
//! The [`sequencer::Sequencer`] owns the phase table and drives one test
//! cycle at a time.  All interaction with hardware happens through the
//! **port traits** in [`ports`], keeping this layer testable against a mock
//! or simulated rig.

pub mod estop;
pub mod events;
pub mod ports;
pub mod sequencer;
