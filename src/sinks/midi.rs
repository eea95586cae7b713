//! MIDI output sink.
//!
//! Short channel messages only; data bytes are masked to 7 bits at encode
//! time. The connection lives behind a mutex so the sink can be shared with
//! the control surface (connect/disconnect) while the dispatcher sends.

use anyhow::{anyhow, Context, Result};
use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

const CLIENT_NAME: &str = "wirekey";

/// Outgoing MIDI short message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Control Change: channel (0-15), controller (0-127), value (0-127)
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
}

impl MidiMessage {
    pub fn encode(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
        }
    }
}

/// MIDI output with reconnectable state.
///
/// A failed send drops the broken connection, so the sink reads as
/// disconnected until the next connect; sends while disconnected are no-ops.
#[derive(Default)]
pub struct MidiSink {
    conn: Mutex<Option<(String, MidiOutputConnection)>>,
}

impl MidiSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// List available MIDI output ports.
    pub fn list_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| anyhow!("{e}"))?;
        let mut names = Vec::new();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Find an output port by case-insensitive substring match.
    fn find_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                if name.to_lowercase().contains(&pattern.to_lowercase()) {
                    debug!("Found MIDI port '{name}' matching pattern '{pattern}'");
                    return Some((port, name));
                }
            }
        }
        None
    }

    /// Connect to the first output port matching `pattern`. Replaces any
    /// existing connection. Returns the full port name.
    pub fn connect(&self, pattern: &str) -> Result<String> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| anyhow!("{e}"))?;
        let (port, name) = Self::find_port(&midi_out, pattern)
            .with_context(|| format!("No MIDI output port matching '{pattern}'"))?;
        let connection = midi_out
            .connect(&port, CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to connect to MIDI port '{name}': {e}"))?;
        info!("MIDI output connected: {name}");
        *self.conn.lock() = Some((name.clone(), connection));
        Ok(name)
    }

    pub fn disconnect(&self) {
        if let Some((name, connection)) = self.conn.lock().take() {
            connection.close();
            info!("MIDI output disconnected: {name}");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    pub fn note_on(&self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.send(MidiMessage::NoteOn {
            channel,
            note,
            velocity,
        })
    }

    pub fn note_off(&self, channel: u8, note: u8) -> Result<()> {
        self.send(MidiMessage::NoteOff {
            channel,
            note,
            velocity: 0,
        })
    }

    pub fn control_change(&self, channel: u8, controller: u8, value: u8) -> Result<()> {
        self.send(MidiMessage::ControlChange {
            channel,
            controller,
            value,
        })
    }

    pub fn send(&self, message: MidiMessage) -> Result<()> {
        let mut guard = self.conn.lock();
        let Some((name, connection)) = guard.as_mut() else {
            return Ok(());
        };
        if let Err(e) = connection.send(&message.encode()) {
            let name = name.clone();
            *guard = None;
            warn!("MIDI send to '{name}' failed, dropping connection: {e}");
            return Err(anyhow!("MIDI send failed: {e}"));
        }
        debug!("MIDI sent: {message:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_note_on() {
        let msg = MidiMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 127,
        };
        assert_eq!(msg.encode(), [0x90, 60, 127]);
    }

    #[test]
    fn encode_note_off() {
        let msg = MidiMessage::NoteOff {
            channel: 2,
            note: 7,
            velocity: 0,
        };
        assert_eq!(msg.encode(), [0x82, 7, 0]);
    }

    #[test]
    fn encode_masks_to_seven_bits() {
        let msg = MidiMessage::ControlChange {
            channel: 16,
            controller: 200,
            value: 255,
        };
        assert_eq!(msg.encode(), [0xB0, 200 & 0x7F, 0x7F]);
    }

    #[test]
    fn disconnected_send_is_a_noop() {
        let sink = MidiSink::new();
        assert!(!sink.is_connected());
        assert!(sink.control_change(0, 1, 64).is_ok());
    }
}
