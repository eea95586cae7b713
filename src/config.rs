//! Configuration: loading, saving, defaults.
//!
//! The YAML file is read once at startup and written back only on an explicit
//! save or reset. Search order: `--config <path>`, then
//! `<config dir>/wirekey/wirekey.yaml`, then built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::channel::Channel;
use crate::tracker::ReleasePolicy;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    /// Liveness sweep period in milliseconds.
    pub tick_interval_ms: u64,
    pub release_policy: ReleasePolicy,
    /// Key vocabulary accepted on the wire (`$<key>` / `!<key>`).
    pub keys: Vec<String>,
    /// Modifier vocabulary offered to the UI collaborator.
    pub mods: Vec<String>,
    pub window: WindowConfig,
    pub midi: MidiConfig,
    pub websocket: WebSocketConfig,
    pub osc: OscConfig,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Baud rates offered in the port picker.
    pub baud_rates: Vec<u32>,
    /// Port to open at startup; `None` means wait for an explicit connect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// Window geometry persisted for the UI collaborator. The core never reads
/// it; it only round-trips through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub always_on_top: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    pub enabled: bool,
    /// Output port to open at startup (case-insensitive substring match).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,
    pub listen_port: u16,
    /// Non-empty switches the WebSocket role from server to client of this
    /// address.
    pub remote_server: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub enabled: bool,
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            tick_interval_ms: 100,
            release_policy: ReleasePolicy::default(),
            keys: default_keys(),
            mods: default_mods(),
            window: WindowConfig::default(),
            midi: MidiConfig::default(),
            websocket: WebSocketConfig::default(),
            osc: OscConfig::default(),
            channels: Vec::new(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            baud_rates: vec![9600, 115200],
            port: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 200,
            height: 400,
            always_on_top: false,
        }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_port: 8080,
            remote_server: String::new(),
        }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_address: "0.0.0.0".into(),
            local_port: 7000,
            remote_address: "127.0.0.1".into(),
            remote_port: 7001,
        }
    }
}

impl AppConfig {
    /// Load configuration from the given path, or from the default location,
    /// falling back to defaults when no file exists.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                let config: AppConfig = serde_yaml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to the given path, or to the default location.
    pub async fn save(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => default_path().context("No config directory available")?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(&path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(path)
    }

    /// Reset to defaults and persist.
    pub async fn reset(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let config = Self::default();
        let path = config.save(explicit).await?;
        Ok((config, path))
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// `<config dir>/wirekey/wirekey.yaml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wirekey").join("wirekey.yaml"))
}

fn default_keys() -> Vec<String> {
    [
        "backspace", "delete", "insert", "enter", "tab", "escape", "space", "up", "down", "left",
        "right", "home", "end", "pageup", "pagedown", "printscreen", "f1", "f2", "f3", "f4", "f5",
        "f6", "f7", "f8", "f9", "f10", "f11", "f12", "command", "alt", "control", "shift",
        "right_shift", "audio_mute", "audio_vol_down", "audio_vol_up", "audio_play", "audio_stop",
        "audio_prev", "audio_next", "mouse", "a", "b", "c", "d", "e", "f", "g", "h", "i", "j",
        "k", "l", "m", "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "0", "1",
        "2", "3", "4", "5", "6", "7", "8", "9",
    ]
    .map(String::from)
    .to_vec()
}

fn default_mods() -> Vec<String> {
    ["none", "alt", "command", "control", "shift"]
        .map(String::from)
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{KeyBinding, MidiTarget, Modifier};
    use crate::mapper::Range;

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(AppConfig::load(Some(&path)).await.is_err());
    }

    #[tokio::test]
    async fn channel_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wirekey.yaml");

        let mut config = AppConfig::default();
        let mut channel = Channel::new("a0");
        channel.input_range = Range::new(0.0, 1023.0);
        channel.output_range = Range::new(0.0, 127.0);
        channel.smoothing = 0.25;
        channel.key_binding = Some(KeyBinding {
            key: "space".into(),
            modifier: Modifier::Shift,
            send_as_key: true,
            send_as_midi: true,
            hold_mode: true,
            threshold: 100,
        });
        channel.midi_target = Some(MidiTarget {
            controller: 44,
            channel: 1,
        });
        config.channels.push(channel);
        config.websocket.listen_port = 9001;

        config.save(Some(&path)).await.unwrap();
        let reloaded = AppConfig::load(Some(&path)).await.unwrap();

        assert_eq!(reloaded, config);
        assert_eq!(reloaded.channels[0].wire_id, "a0");
        assert_eq!(reloaded.channels[0].smoothing, 0.25);
    }

    #[tokio::test]
    async fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wirekey.yaml");
        tokio::fs::write(&path, "tick_interval_ms: 50\n")
            .await
            .unwrap();

        let config = AppConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.websocket.listen_port, 8080);
        assert!(config.keys.iter().any(|k| k == "space"));
    }

    #[test]
    fn default_vocabulary_covers_pointer_and_media_keys() {
        let keys = default_keys();
        for key in ["mouse", "right_shift", "printscreen", "insert", "audio_stop"] {
            assert!(keys.iter().any(|k| k == key), "missing key: {key}");
        }
    }

    #[tokio::test]
    async fn reset_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wirekey.yaml");

        let mut config = AppConfig::default();
        config.tick_interval_ms = 500;
        config.save(Some(&path)).await.unwrap();

        let (reset, written) = AppConfig::reset(Some(&path)).await.unwrap();
        assert_eq!(written, path);
        assert_eq!(reset.tick_interval_ms, 100);
        assert_eq!(AppConfig::load(Some(&path)).await.unwrap(), reset);
    }
}
