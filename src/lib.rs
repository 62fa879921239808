//! End-of-line pneumatic leak tester.
//!
//! Drives one pressure-decay test cycle at a time: clamp the DUT, fill it,
//! let it stabilise, isolate it, watch the pressure decay, decide pass or
//! fail, then always vent and unclamp.  Hardware sits behind the port
//! traits in [`app::ports`]; the crate ships a relay-board adapter, a
//! simulated rig, and the 4–20 mA transducer calibration.

#![deny(unused_must_use)]

pub mod adapters;
pub mod analysis;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod safety;
pub mod sensors;
