//! Wall-clock time adapter.
//!
//! [`SystemClock`] measures monotonic time from its construction with
//! `std::time::Instant` and sleeps the calling thread.  Used when driving
//! real relay hardware; tests and the simulator use
//! [`SimClock`](super::sim::SimClock) instead.

use core::time::Duration;
use std::time::Instant;

use crate::app::ports::Clock;

pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
