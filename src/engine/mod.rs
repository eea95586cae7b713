//! The stateful decode → track → map pipeline.
//!
//! One engine instance owns the decoder, the channel registry and the key
//! tracker; the event loop drives it with lines, ticks and the disconnect
//! edge, and applies the returned event batches through the dispatcher.
//! Each call runs to completion before the next, so state transitions never
//! interleave.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::channel::{ChannelRegistry, Modifier};
use crate::config::AppConfig;
use crate::decoder::{DecodedRecord, LineDecoder};
use crate::dispatch::{DispatchEvent, KeyAction, NoteTarget};
use crate::tracker::KeyTracker;

pub struct Engine {
    decoder: LineDecoder,
    registry: ChannelRegistry,
    tracker: KeyTracker,
    /// Key vocabulary in configuration order; the index doubles as the MIDI
    /// note mirrored on press/release.
    keys: Vec<String>,
    /// Actions for currently-held tracker entries, so a release edge replays
    /// exactly what the press did.
    held: HashMap<String, KeyAction>,
}

impl Engine {
    pub fn new(config: &AppConfig) -> Self {
        let keys: Vec<String> = config.keys.iter().map(|k| k.to_lowercase()).collect();
        Self {
            decoder: LineDecoder::new(keys.iter().cloned()),
            registry: ChannelRegistry::from_channels(config.channels.iter().cloned()),
            tracker: KeyTracker::new(config.release_policy, config.tick_interval()),
            keys,
            held: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// The liveness window; the event loop ticks at this period.
    pub fn tick_interval(&self) -> Duration {
        self.tracker.interval()
    }

    pub fn pressed_count(&self) -> usize {
        self.tracker.pressed_count()
    }

    /// Decode one line (serial or WebSocket) and advance the pipeline.
    /// Returns the ordered batch of effects to dispatch.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Vec<DispatchEvent> {
        let Some(record) = self.decoder.decode(line, &self.registry) else {
            return Vec::new();
        };
        debug!("decoded: {record:?}");

        match record {
            DecodedRecord::KeyEdge {
                key,
                asserting: true,
            } => {
                if self.tracker.assert_key(&key, now) {
                    let action = self.wire_key_action(&key);
                    self.held.insert(key, action.clone());
                    vec![DispatchEvent::Press(action)]
                } else {
                    Vec::new()
                }
            }
            DecodedRecord::KeyEdge {
                key,
                asserting: false,
            } => {
                if self.tracker.release_key(&key) {
                    vec![DispatchEvent::Release(self.take_action(&key))]
                } else {
                    Vec::new()
                }
            }
            DecodedRecord::Coordinate { x, y } => vec![DispatchEvent::PointerMove { x, y }],
            DecodedRecord::Sample { wire_id, raw } => self.handle_sample(&wire_id, raw, now),
        }
    }

    /// Liveness sweep; call once per tick interval.
    pub fn tick(&mut self, now: Instant) -> Vec<DispatchEvent> {
        self.tracker
            .sweep(now)
            .into_iter()
            .map(|id| DispatchEvent::Release(self.take_action(&id)))
            .collect()
    }

    /// Serial link went away: release everything and forget smoothing state
    /// so the next connection starts fresh.
    pub fn disconnect(&mut self) -> Vec<DispatchEvent> {
        let events: Vec<DispatchEvent> = self
            .tracker
            .release_all()
            .into_iter()
            .map(|id| DispatchEvent::Release(self.take_action(&id)))
            .collect();
        self.registry.reset_smoothing();
        events
    }

    fn handle_sample(&mut self, wire_id: &str, raw: i64, now: Instant) -> Vec<DispatchEvent> {
        let Some(sample) = self.registry.map(wire_id, raw as f64) else {
            return Vec::new();
        };

        let Some(channel) = self.registry.get(wire_id) else {
            return Vec::new();
        };
        let midi = channel
            .midi_target
            .filter(|_| channel.key_binding.as_ref().map_or(true, |b| b.send_as_midi));
        let binding = channel.key_binding.clone().filter(|b| b.send_as_key);
        let note = binding.as_ref().and_then(|b| {
            if !b.send_as_midi {
                return None;
            }
            match channel.midi_target {
                Some(target) => Some(NoteTarget {
                    channel: target.channel,
                    note: target.controller,
                }),
                None => self.note_for_key(&b.key),
            }
        });

        let mut events = vec![DispatchEvent::SampleMapped {
            wire_id: sample.wire_id.clone(),
            output: sample.output,
            midi,
        }];

        // Threshold-derived synthetic key edges. Tracked under a composite
        // id so a wire `$space` and a pedal bound to space stay independent.
        // Liveness applies here like it does to wire keys: the edge is only
        // refreshed by arriving samples, so a device must keep reporting
        // while above threshold or the sweep releases the key. The sensors
        // this protocol targets stream continuously.
        if let Some(binding) = binding {
            let tracker_id = format!("{wire_id}:{}", binding.key);
            if sample.output >= binding.threshold {
                if self.tracker.assert_key(&tracker_id, now) {
                    let action = KeyAction {
                        key: binding.key.clone(),
                        modifier: binding.modifier,
                        hold: binding.hold_mode,
                        note,
                    };
                    self.held.insert(tracker_id, action.clone());
                    events.push(DispatchEvent::Press(action));
                }
            } else if self.tracker.force_release(&tracker_id) {
                events.push(DispatchEvent::Release(self.take_action(&tracker_id)));
            }
        }

        events
    }

    fn wire_key_action(&self, key: &str) -> KeyAction {
        KeyAction {
            key: key.to_string(),
            modifier: Modifier::None,
            hold: true,
            note: self.note_for_key(key),
        }
    }

    fn note_for_key(&self, key: &str) -> Option<NoteTarget> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|index| NoteTarget {
                channel: 0,
                note: (index & 0x7F) as u8,
            })
    }

    fn take_action(&mut self, tracker_id: &str) -> KeyAction {
        match self.held.remove(tracker_id) {
            Some(action) => action,
            None => self.wire_key_action(tracker_id),
        }
    }
}
