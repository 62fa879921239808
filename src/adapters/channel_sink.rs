//! Channel-backed event sink.
//!
//! Bridges the run's worker thread to the UI / reporting loop through an
//! `embassy-sync` bounded MPMC channel, so observers never run on the
//! sequencer's thread.
//!
//! ```text
//! ┌──────────────┐   RunEvent    ┌──────────────┐
//! │  Sequencer   │─────────────▶│   UI loop     │
//! │  (worker)    │   channel     │  (receiver)   │
//! └──────────────┘               └──────────────┘
//! ```
//!
//! Pressure samples are best-effort: when the channel is full they are
//! dropped and counted.  Phase changes, warnings, faults and the final
//! result always get through; the sender blocks until the receiver has
//! room.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::events::RunEvent;
use crate::app::ports::EventSink;

pub type EventChannel<const N: usize> = Channel<CriticalSectionRawMutex, RunEvent, N>;

/// Channel depth for run events.
pub const RUN_EVENT_DEPTH: usize = 32;

/// Process-wide event channel: sequencer worker → UI loop.
pub static RUN_EVENTS: EventChannel<RUN_EVENT_DEPTH> = Channel::new();

pub struct ChannelEventSink<'c, const N: usize> {
    channel: &'c EventChannel<N>,
    dropped_samples: u32,
}

impl<'c, const N: usize> ChannelEventSink<'c, N> {
    pub fn new(channel: &'c EventChannel<N>) -> Self {
        Self {
            channel,
            dropped_samples: 0,
        }
    }

    /// Samples discarded because the receiver fell behind.
    pub fn dropped_samples(&self) -> u32 {
        self.dropped_samples
    }
}

impl<const N: usize> EventSink for ChannelEventSink<'_, N> {
    fn emit(&mut self, event: &RunEvent) {
        match event {
            RunEvent::PressureSample { .. } => {
                if self.channel.try_send(event.clone()).is_err() {
                    self.dropped_samples += 1;
                    if self.dropped_samples == 1 {
                        warn!("event channel full, dropping pressure samples");
                    }
                }
            }
            _ => futures_lite::future::block_on(self.channel.send(event.clone())),
        }
    }
}
