//! Channel registry: the ordered set of configured IO bindings.
//!
//! A channel pairs a wire identifier (the alphabetic pin token on the serial
//! line, e.g. `a0`) with mapping parameters and output routing. Registration
//! validates the configuration; a bad channel is rejected with a descriptive
//! error and the rest of the registry stays active.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::mapper::{rescale, Range, Smoother};

/// Keyboard modifier held around an emulated key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    #[default]
    None,
    Alt,
    Command,
    Control,
    Shift,
}

/// Key output bound to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key: String,
    #[serde(default)]
    pub modifier: Modifier,
    /// Derive virtual press/release edges from the mapped value.
    #[serde(default)]
    pub send_as_key: bool,
    /// Mirror mapped values as MIDI Control Change.
    #[serde(default = "default_true")]
    pub send_as_midi: bool,
    /// Hold the key down until release instead of pulsing down-then-up.
    #[serde(default)]
    pub hold_mode: bool,
    /// Mapped-value threshold above which the virtual key counts as pressed.
    #[serde(default = "default_threshold")]
    pub threshold: i32,
}

/// MIDI Control Change target for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiTarget {
    pub controller: u8,
    pub channel: u8,
}

/// One configured logical input/output binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub wire_id: String,
    #[serde(default = "default_input_range")]
    pub input_range: Range,
    #[serde(default = "default_output_range")]
    pub output_range: Range,
    #[serde(default = "default_smoothing")]
    pub smoothing: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_binding: Option<KeyBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_target: Option<MidiTarget>,
}

impl Channel {
    pub fn new(wire_id: impl Into<String>) -> Self {
        Self {
            wire_id: wire_id.into(),
            input_range: default_input_range(),
            output_range: default_output_range(),
            smoothing: default_smoothing(),
            key_binding: None,
            midi_target: None,
        }
    }
}

/// Channel registration failure. The offending channel is not added; the
/// registry keeps serving the others.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("duplicate wire id '{0}'")]
    DuplicateWireId(String),
    #[error("channel '{wire_id}': wire id must be non-empty and start with a letter")]
    InvalidWireId { wire_id: String },
    #[error("channel '{wire_id}': input range {min}..{max} is empty")]
    EmptyInputRange { wire_id: String, min: f64, max: f64 },
    #[error("channel '{wire_id}': output range {min}..{max} is empty")]
    EmptyOutputRange { wire_id: String, min: f64, max: f64 },
    #[error("channel '{wire_id}': smoothing {value} outside (0, 1]")]
    InvalidSmoothing { wire_id: String, value: f64 },
}

/// A sample after smoothing and re-ranging.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedSample {
    pub wire_id: String,
    pub smoothed: f64,
    pub output: i32,
}

struct Entry {
    channel: Channel,
    smoother: Smoother,
}

/// Ordered collection of channels, keyed by wire id.
#[derive(Default)]
pub struct ChannelRegistry {
    entries: Vec<Entry>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured channels, skipping invalid ones with a
    /// warning so the rest keep working.
    pub fn from_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        let mut registry = Self::new();
        for channel in channels {
            if let Err(e) = registry.register(channel) {
                warn!("skipping channel: {e}");
            }
        }
        registry
    }

    /// Validate and add a channel. Wire ids are stored lowercased to match the
    /// case-insensitive wire protocol.
    pub fn register(&mut self, mut channel: Channel) -> Result<(), RegistryError> {
        channel.wire_id = channel.wire_id.trim().to_lowercase();

        let starts_alpha = channel
            .wire_id
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic());
        if !starts_alpha {
            return Err(RegistryError::InvalidWireId {
                wire_id: channel.wire_id,
            });
        }
        if self.get(&channel.wire_id).is_some() {
            return Err(RegistryError::DuplicateWireId(channel.wire_id));
        }
        if channel.input_range.width() <= 0.0 {
            return Err(RegistryError::EmptyInputRange {
                wire_id: channel.wire_id,
                min: channel.input_range.min,
                max: channel.input_range.max,
            });
        }
        if channel.output_range.width() <= 0.0 {
            return Err(RegistryError::EmptyOutputRange {
                wire_id: channel.wire_id,
                min: channel.output_range.min,
                max: channel.output_range.max,
            });
        }
        if !(channel.smoothing > 0.0 && channel.smoothing <= 1.0) {
            return Err(RegistryError::InvalidSmoothing {
                wire_id: channel.wire_id,
                value: channel.smoothing,
            });
        }

        self.entries.push(Entry {
            channel,
            smoother: Smoother::new(),
        });
        Ok(())
    }

    pub fn get(&self, wire_id: &str) -> Option<&Channel> {
        self.entries
            .iter()
            .find(|e| e.channel.wire_id == wire_id)
            .map(|e| &e.channel)
    }

    /// Match a wire line against registered ids: longest id that prefixes the
    /// line and leaves a non-empty all-digit remainder wins.
    pub fn match_sample<'a>(&self, line: &'a str) -> Option<(&Channel, &'a str)> {
        let mut best: Option<(&Channel, &'a str)> = None;
        for entry in &self.entries {
            let id = &entry.channel.wire_id;
            if let Some(rest) = line.strip_prefix(id.as_str()) {
                if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                    let longer = best.map_or(true, |(c, _)| id.len() > c.wire_id.len());
                    if longer {
                        best = Some((&entry.channel, rest));
                    }
                }
            }
        }
        best
    }

    /// Run a raw sample through the channel's smoother and ranges.
    pub fn map(&mut self, wire_id: &str, raw: f64) -> Option<MappedSample> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.channel.wire_id == wire_id)?;
        let smoothed = entry.smoother.apply(raw, entry.channel.smoothing);
        let output = rescale(smoothed, entry.channel.input_range, entry.channel.output_range);
        Some(MappedSample {
            wire_id: entry.channel.wire_id.clone(),
            smoothed,
            output,
        })
    }

    /// Reset all smoothing state (e.g. after a serial reconnect).
    pub fn reset_smoothing(&mut self) {
        for entry in &mut self.entries {
            entry.smoother.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> i32 {
    64
}

fn default_input_range() -> Range {
    Range::new(0.0, 1023.0)
}

fn default_output_range() -> Range {
    Range::new(0.0, 127.0)
}

fn default_smoothing() -> f64 {
    1.0
}
