//! Wirekey - serial-to-input-events bridge
//!
//! Turns a microcontroller's line-oriented serial stream into OS keyboard
//! presses, MIDI messages, OSC packets and WebSocket broadcasts.
//!
//! The pipeline: serial bytes are framed into lines, the [`decoder`] classifies
//! each line into a tagged record, the [`tracker`] converts repeated key
//! assertions into discrete press/release edges (inferring release from silence
//! when the device never sends one), the [`channel`] registry maps raw sensor
//! values through per-channel smoothing and re-ranging, and the [`dispatch`]
//! layer fans the resulting events out to whichever sinks are connected.
//!
//! The [`engine`] ties the stateful pieces together; the binary owns the
//! transports and the event loop.

pub mod channel;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod engine;
pub mod mapper;
pub mod serial;
pub mod sinks;
pub mod tracker;

pub use config::AppConfig;
pub use decoder::DecodedRecord;
pub use dispatch::{DispatchEvent, Dispatcher};
pub use engine::Engine;
