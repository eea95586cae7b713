//! Transport sinks: the outward-facing halves of the bridge.
//!
//! Each sink owns its connection state and can fail or reconnect
//! independently; the dispatcher treats them as best-effort.

pub mod emulate;
pub mod midi;
pub mod osc;
pub mod websocket;
