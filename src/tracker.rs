//! Key-state tracker: edge detection over noisy periodic assertions.
//!
//! Most protocol variants never send "key up"; the device just repeats
//! `$<key>` every tick while the key is held. The tracker turns that stream
//! into discrete press/release transitions: the first assertion presses,
//! repeats refresh a liveness timestamp, and a periodic sweep releases any key
//! that went silent for a full tick window. Variants with an explicit `!<key>`
//! release marker are supported through the release policy.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How a pressed key returns to released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleasePolicy {
    /// Only explicit `!<key>` markers release.
    Explicit,
    /// Only the liveness sweep releases; explicit markers are ignored.
    Liveness,
    /// Either trigger releases; whichever fires first wins, the other becomes
    /// a no-op.
    #[default]
    Both,
}

impl ReleasePolicy {
    pub fn honors_explicit(self) -> bool {
        matches!(self, Self::Explicit | Self::Both)
    }

    pub fn honors_liveness(self) -> bool {
        matches!(self, Self::Liveness | Self::Both)
    }
}

/// Edge-detection state machine over symbolic key names.
///
/// State is exclusively owned here; entries exist only while a key is
/// pressed. The sweep cost is bounded by the number of distinct held keys,
/// not by serial throughput.
pub struct KeyTracker {
    /// Pressed keys and when each was last asserted.
    held: HashMap<String, Instant>,
    policy: ReleasePolicy,
    interval: Duration,
}

impl KeyTracker {
    pub fn new(policy: ReleasePolicy, interval: Duration) -> Self {
        Self {
            held: HashMap::new(),
            policy,
            interval,
        }
    }

    /// The liveness window; also the sweep period the caller should tick at.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_pressed(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }

    pub fn pressed_count(&self) -> usize {
        self.held.len()
    }

    /// Record an assertion. Returns `true` exactly when this is a new press;
    /// repeated assertions of an already-pressed key only refresh liveness.
    pub fn assert_key(&mut self, key: &str, now: Instant) -> bool {
        match self.held.get_mut(key) {
            Some(last_seen) => {
                *last_seen = now;
                false
            }
            None => {
                self.held.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Explicit release marker. Gated by the release policy; releasing an
    /// already-released key is a no-op.
    pub fn release_key(&mut self, key: &str) -> bool {
        if !self.policy.honors_explicit() {
            return false;
        }
        self.force_release(key)
    }

    /// Release regardless of policy. Used for threshold-derived synthetic
    /// edges, where the falling edge is always authoritative.
    pub fn force_release(&mut self, key: &str) -> bool {
        self.held.remove(key).is_some()
    }

    /// Liveness sweep: release every key whose last assertion predates the
    /// current tick window. Returns the released keys in no particular order.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        if !self.policy.honors_liveness() {
            return Vec::new();
        }
        let interval = self.interval;
        let stale: Vec<String> = self
            .held
            .iter()
            .filter(|(_, last_seen)| now.duration_since(**last_seen) >= interval)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.held.remove(key);
        }
        stale
    }

    /// Release everything, e.g. on serial disconnect, so no key stays stuck
    /// down after the device goes away.
    pub fn release_all(&mut self) -> Vec<String> {
        let mut keys: Vec<String> = self.held.drain().map(|(key, _)| key).collect();
        keys.sort();
        keys
    }
}
