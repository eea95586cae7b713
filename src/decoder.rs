//! Line decoder: classifies one serial line into a typed record.
//!
//! The wire protocol is line-oriented, newline-terminated, case-insensitive:
//!
//!   `$<key>`              key asserted this tick
//!   `!<key>`              key explicitly released (protocol-variant dependent)
//!   `<wireId><integer>`   sensor sample, e.g. `a0512`
//!   `<number>,<number>`   absolute pointer coordinate pair
//!
//! Anything else is protocol noise and is dropped. The decoder never errors
//! across this boundary; a malformed line is simply `None`.

use std::collections::HashSet;

use tracing::debug;

use crate::channel::ChannelRegistry;

/// Marker for "key currently asserted".
pub const ASSERT_MARKER: char = '$';
/// Marker for an explicit key release.
pub const RELEASE_MARKER: char = '!';

/// A classified wire record. Transient; produced and consumed within one
/// decode cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRecord {
    KeyEdge { key: String, asserting: bool },
    Coordinate { x: i32, y: i32 },
    Sample { wire_id: String, raw: i64 },
}

/// Stateless line classifier. Holds the configured key vocabulary; channel
/// routing is resolved against the registry passed to [`decode`].
///
/// [`decode`]: LineDecoder::decode
pub struct LineDecoder {
    vocabulary: HashSet<String>,
}

impl LineDecoder {
    pub fn new(vocabulary: impl IntoIterator<Item = String>) -> Self {
        Self {
            vocabulary: vocabulary
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    pub fn knows_key(&self, key: &str) -> bool {
        self.vocabulary.contains(key)
    }

    /// Classify one line. Returns `None` for noise: empty or single-character
    /// lines, unknown key names, unroutable samples, anything malformed.
    pub fn decode(&self, line: &str, registry: &ChannelRegistry) -> Option<DecodedRecord> {
        let line = line.trim().to_lowercase();
        if line.len() <= 1 {
            return None;
        }

        // 1. Key edge markers
        if let Some(key) = line.strip_prefix(ASSERT_MARKER) {
            return self.key_edge(key, true);
        }
        if let Some(key) = line.strip_prefix(RELEASE_MARKER) {
            return self.key_edge(key, false);
        }

        // 2. Coordinate pair
        if let Some((x, y)) = line.split_once(',') {
            if let (Ok(x), Ok(y)) = (x.trim().parse(), y.trim().parse()) {
                return Some(DecodedRecord::Coordinate { x, y });
            }
            return None;
        }

        // 3. Sensor sample: registered wire id prefix followed by digits
        if let Some((channel, digits)) = registry.match_sample(&line) {
            let raw = digits.parse().ok()?;
            return Some(DecodedRecord::Sample {
                wire_id: channel.wire_id.clone(),
                raw,
            });
        }

        // Sample-shaped but no registered channel: logged, dropped, not fatal.
        if looks_like_sample(&line) {
            debug!("unroutable sample dropped: {line}");
        }
        None
    }

    fn key_edge(&self, key: &str, asserting: bool) -> Option<DecodedRecord> {
        if !self.knows_key(key) {
            debug!("unknown key name dropped: {key}");
            return None;
        }
        Some(DecodedRecord::KeyEdge {
            key: key.to_string(),
            asserting,
        })
    }
}

/// An alphabetic token followed by digits, the generic sample shape.
fn looks_like_sample(line: &str) -> bool {
    let digits_at = line.find(|c: char| c.is_ascii_digit());
    match digits_at {
        Some(at) if at > 0 => {
            line[..at].bytes().all(|b| b.is_ascii_alphabetic())
                && line[at..].bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}
