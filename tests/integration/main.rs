//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises the sequencer end to end against a mock,
//! simulated or test-pin rig on a virtual clock.  No real hardware and no
//! wall-clock waits, apart from the one real-time emergency-stop test.

mod fault_tests;
mod hardware_tests;
mod sequencer_tests;
