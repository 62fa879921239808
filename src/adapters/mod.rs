//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements                         | Connects to                 |
//! |----------------|------------------------------------|-----------------------------|
//! | `relay`        | ValveActuator, CylinderActuator,   | `embedded-hal` output pins  |
//! |                | PressureSensor (delegated)         | + current-loop sensor       |
//! | `sim`          | all rig ports, Clock               | in-process pneumatic model  |
//! | `time`         | Clock                              | `std::time::Instant`        |
//! | `log_sink`     | EventSink                          | `log` facade                |
//! | `channel_sink` | EventSink                          | `embassy-sync` channel      |
//! | `csv_sink`     | EventSink (finished runs only)     | CSV results file            |
//! | `config_file`  | ConfigPort                         | JSON file on disk           |

pub mod channel_sink;
pub mod config_file;
pub mod csv_sink;
pub mod log_sink;
pub mod relay;
pub mod sim;
pub mod time;
