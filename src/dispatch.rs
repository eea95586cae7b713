//! Output dispatcher: fans engine events out to the connected sinks.
//!
//! Sinks are independent and best-effort. A failed send is logged and never
//! blocks the sibling sinks or the event loop; a MIDI failure additionally
//! drops that connection (see [`MidiSink`]).

use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

use crate::channel::{MidiTarget, Modifier};
use crate::sinks::emulate::InputEmulator;
use crate::sinks::midi::MidiSink;
use crate::sinks::osc::OscSink;

/// Vocabulary entry that drives the left mouse button instead of a key.
const MOUSE_KEY: &str = "mouse";

/// MIDI note mirrored alongside a key edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteTarget {
    pub channel: u8,
    pub note: u8,
}

/// A key output resolved by the engine: what to do at the OS and MIDI layer
/// when the key goes down or up.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyAction {
    pub key: String,
    pub modifier: Modifier,
    /// Hold the key between the press and release edges instead of pulsing
    /// down-then-up on the press.
    pub hold: bool,
    pub note: Option<NoteTarget>,
}

/// One effect to apply to the outside world.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    Press(KeyAction),
    Release(KeyAction),
    SampleMapped {
        wire_id: String,
        output: i32,
        midi: Option<MidiTarget>,
    },
    PointerMove {
        x: i32,
        y: i32,
    },
}

/// Holds whichever sinks are currently up. Every field is optional; a
/// missing sink simply skips its share of the event.
#[derive(Default)]
pub struct Dispatcher {
    pub emulator: Option<InputEmulator>,
    pub midi: Option<Arc<MidiSink>>,
    pub osc: Option<OscSink>,
    pub websocket: Option<broadcast::Sender<String>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch_all(&self, events: &[DispatchEvent]) {
        for event in events {
            self.dispatch(event);
        }
    }

    pub fn dispatch(&self, event: &DispatchEvent) {
        match event {
            DispatchEvent::Press(action) => self.press(action),
            DispatchEvent::Release(action) => self.release(action),
            DispatchEvent::SampleMapped {
                wire_id,
                output,
                midi,
            } => self.sample(wire_id, *output, *midi),
            DispatchEvent::PointerMove { x, y } => self.pointer_move(*x, *y),
        }
    }

    fn press(&self, action: &KeyAction) {
        if let Some(emulator) = &self.emulator {
            let result = if action.key == MOUSE_KEY {
                if action.hold {
                    emulator.mouse_down()
                } else {
                    emulator.mouse_down().and_then(|_| emulator.mouse_up())
                }
            } else if action.hold {
                emulator.key_down(&action.key, action.modifier)
            } else {
                emulator.key_pulse(&action.key, action.modifier)
            };
            if let Err(e) = result {
                warn!("Key press '{}' failed: {e}", action.key);
            }
        }
        if let (Some(midi), Some(note)) = (&self.midi, action.note) {
            if let Err(e) = midi.note_on(note.channel, note.note, 127) {
                warn!("MIDI note on for '{}' failed: {e}", action.key);
            }
        }
    }

    fn release(&self, action: &KeyAction) {
        // Pulsed keys already came back up on the press edge.
        if action.hold {
            if let Some(emulator) = &self.emulator {
                let result = if action.key == MOUSE_KEY {
                    emulator.mouse_up()
                } else {
                    emulator.key_up(&action.key, action.modifier)
                };
                if let Err(e) = result {
                    warn!("Key release '{}' failed: {e}", action.key);
                }
            }
        }
        if let (Some(midi), Some(note)) = (&self.midi, action.note) {
            if let Err(e) = midi.note_off(note.channel, note.note) {
                warn!("MIDI note off for '{}' failed: {e}", action.key);
            }
        }
    }

    fn sample(&self, wire_id: &str, output: i32, midi_target: Option<MidiTarget>) {
        if let (Some(midi), Some(target)) = (&self.midi, midi_target) {
            let value = output.clamp(0, 127) as u8;
            if let Err(e) = midi.control_change(target.channel, target.controller, value) {
                warn!("MIDI CC for '{wire_id}' failed: {e}");
            }
        }
        if let Some(osc) = &self.osc {
            if let Err(e) = osc.send(&format!("/{wire_id}"), output as f32) {
                warn!("OSC send for '{wire_id}' failed: {e}");
            }
        }
        if let Some(websocket) = &self.websocket {
            let payload = json!({ "id": wire_id, "msg": output }).to_string();
            // No subscribers just means nobody is listening right now.
            let _ = websocket.send(payload);
        }
    }

    fn pointer_move(&self, x: i32, y: i32) {
        if let Some(emulator) = &self.emulator {
            if let Err(e) = emulator.pointer_move(x, y) {
                warn!("Pointer move failed: {e}");
            }
        }
    }

    /// Tear every sink down. MIDI is closed explicitly; the emulator worker
    /// joins on drop.
    pub fn shutdown(&mut self) {
        if let Some(midi) = self.midi.take() {
            midi.disconnect();
        }
        self.emulator.take();
        self.osc.take();
        self.websocket.take();
    }
}
