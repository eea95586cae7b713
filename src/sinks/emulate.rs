//! OS input emulation via enigo.
//!
//! enigo handles are not `Send`, and macOS requires all synthesized events to
//! be posted from a single thread, so the emulator owns a dedicated worker
//! thread and is driven over a channel. Commands are fire-and-forget; a
//! failed OS call is logged on the worker and never reaches the event loop.

use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use tracing::{debug, warn};

use crate::channel::Modifier;

enum Command {
    KeyDown { key: String, modifier: Modifier },
    KeyUp { key: String, modifier: Modifier },
    KeyPulse { key: String, modifier: Modifier },
    MouseDown,
    MouseUp,
    PointerMove { x: i32, y: i32 },
    Shutdown,
}

/// Handle to the emulation worker. Dropping it stops the thread.
pub struct InputEmulator {
    tx: mpsc::Sender<Command>,
    worker: Option<thread::JoinHandle<()>>,
}

impl InputEmulator {
    /// Spawn the worker thread. Fails when the OS refuses to hand out an
    /// event source, e.g. a missing accessibility permission on macOS.
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("input-emulator".into())
            .spawn(move || worker_loop(rx, ready_tx))
            .context("Failed to spawn input emulator thread")?;
        ready_rx
            .recv()
            .context("Input emulator thread died during startup")??;
        Ok(Self {
            tx,
            worker: Some(worker),
        })
    }

    /// Press and hold until [`key_up`](Self::key_up).
    pub fn key_down(&self, key: &str, modifier: Modifier) -> Result<()> {
        self.send(Command::KeyDown {
            key: key.to_string(),
            modifier,
        })
    }

    pub fn key_up(&self, key: &str, modifier: Modifier) -> Result<()> {
        self.send(Command::KeyUp {
            key: key.to_string(),
            modifier,
        })
    }

    /// Down-then-up in one go.
    pub fn key_pulse(&self, key: &str, modifier: Modifier) -> Result<()> {
        self.send(Command::KeyPulse {
            key: key.to_string(),
            modifier,
        })
    }

    /// Press and hold the left mouse button.
    pub fn mouse_down(&self) -> Result<()> {
        self.send(Command::MouseDown)
    }

    pub fn mouse_up(&self) -> Result<()> {
        self.send(Command::MouseUp)
    }

    /// Absolute pointer move.
    pub fn pointer_move(&self, x: i32, y: i32) -> Result<()> {
        self.send(Command::PointerMove { x, y })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("Input emulator thread is gone"))
    }
}

impl Drop for InputEmulator {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(rx: mpsc::Receiver<Command>, ready_tx: mpsc::Sender<Result<()>>) {
    let mut enigo = match Enigo::new(&Settings::default()) {
        Ok(enigo) => {
            let _ = ready_tx.send(Ok(()));
            enigo
        }
        Err(e) => {
            let _ = ready_tx.send(Err(anyhow!("Failed to create input source: {e}")));
            return;
        }
    };

    while let Ok(command) = rx.recv() {
        let result = match command {
            Command::KeyDown { key, modifier } => {
                key_event(&mut enigo, &key, modifier, Direction::Press)
            }
            Command::KeyUp { key, modifier } => {
                key_event(&mut enigo, &key, modifier, Direction::Release)
            }
            Command::KeyPulse { key, modifier } => {
                key_event(&mut enigo, &key, modifier, Direction::Click)
            }
            Command::MouseDown => enigo
                .button(Button::Left, Direction::Press)
                .map_err(|e| anyhow!("{e}")),
            Command::MouseUp => enigo
                .button(Button::Left, Direction::Release)
                .map_err(|e| anyhow!("{e}")),
            Command::PointerMove { x, y } => enigo
                .move_mouse(x, y, Coordinate::Abs)
                .map_err(|e| anyhow!("{e}")),
            Command::Shutdown => break,
        };
        if let Err(e) = result {
            warn!("Input emulation failed: {e}");
        }
    }
}

/// Apply one key edge. The modifier is pressed before the key goes down and
/// released after it comes up, so held keys keep their modifier for the
/// whole hold.
fn key_event(enigo: &mut Enigo, name: &str, modifier: Modifier, direction: Direction) -> Result<()> {
    let Some(key) = map_key(name) else {
        debug!("No OS mapping for key '{name}'");
        return Ok(());
    };
    let modifier = modifier_key(modifier);

    match direction {
        Direction::Press => {
            if let Some(m) = modifier {
                enigo.key(m, Direction::Press).map_err(|e| anyhow!("{e}"))?;
            }
            enigo.key(key, Direction::Press).map_err(|e| anyhow!("{e}"))
        }
        Direction::Release => {
            enigo
                .key(key, Direction::Release)
                .map_err(|e| anyhow!("{e}"))?;
            if let Some(m) = modifier {
                enigo
                    .key(m, Direction::Release)
                    .map_err(|e| anyhow!("{e}"))?;
            }
            Ok(())
        }
        Direction::Click => {
            if let Some(m) = modifier {
                enigo.key(m, Direction::Press).map_err(|e| anyhow!("{e}"))?;
            }
            let clicked = enigo.key(key, Direction::Click).map_err(|e| anyhow!("{e}"));
            if let Some(m) = modifier {
                enigo
                    .key(m, Direction::Release)
                    .map_err(|e| anyhow!("{e}"))?;
            }
            clicked
        }
    }
}

fn modifier_key(modifier: Modifier) -> Option<Key> {
    match modifier {
        Modifier::None => None,
        Modifier::Alt => Some(Key::Alt),
        Modifier::Command => Some(Key::Meta),
        Modifier::Control => Some(Key::Control),
        Modifier::Shift => Some(Key::Shift),
    }
}

/// Map a key name to an enigo key. Names without an OS-level key mapping
/// return `None`: the audio_* vocabulary entries (which still carry
/// MIDI/WebSocket meaning) and "mouse", which is a button, not a key, and
/// is routed to [`InputEmulator::mouse_down`]/[`mouse_up`] upstream.
///
/// [`mouse_up`]: InputEmulator::mouse_up
fn map_key(name: &str) -> Option<Key> {
    let lower = name.to_lowercase();
    if lower.chars().count() == 1 {
        return lower.chars().next().map(Key::Unicode);
    }

    match lower.as_str() {
        "space" => Some(Key::Unicode(' ')),
        "enter" | "return" => Some(Key::Return),
        "tab" => Some(Key::Tab),
        "escape" | "esc" => Some(Key::Escape),
        "backspace" => Some(Key::Backspace),
        "delete" => Some(Key::Delete),
        "up" => Some(Key::UpArrow),
        "down" => Some(Key::DownArrow),
        "left" => Some(Key::LeftArrow),
        "right" => Some(Key::RightArrow),
        "home" => Some(Key::Home),
        "end" => Some(Key::End),
        "pageup" => Some(Key::PageUp),
        "pagedown" => Some(Key::PageDown),
        "shift" => Some(Key::Shift),
        #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
        "right_shift" => Some(Key::RShift),
        #[cfg(target_os = "macos")]
        "right_shift" => Some(Key::Shift),
        #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
        "insert" => Some(Key::Insert),
        #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
        "printscreen" => Some(Key::Print),
        "control" | "ctrl" => Some(Key::Control),
        "alt" => Some(Key::Alt),
        "command" | "cmd" | "meta" | "super" => Some(Key::Meta),
        "capslock" => Some(Key::CapsLock),
        "f1" => Some(Key::F1),
        "f2" => Some(Key::F2),
        "f3" => Some(Key::F3),
        "f4" => Some(Key::F4),
        "f5" => Some(Key::F5),
        "f6" => Some(Key::F6),
        "f7" => Some(Key::F7),
        "f8" => Some(Key::F8),
        "f9" => Some(Key::F9),
        "f10" => Some(Key::F10),
        "f11" => Some(Key::F11),
        "f12" => Some(Key::F12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_characters_map_to_unicode() {
        assert_eq!(map_key("a"), Some(Key::Unicode('a')));
        assert_eq!(map_key("A"), Some(Key::Unicode('a')));
        assert_eq!(map_key("7"), Some(Key::Unicode('7')));
    }

    #[test]
    fn named_keys_map() {
        assert_eq!(map_key("enter"), Some(Key::Return));
        assert_eq!(map_key("PageUp"), Some(Key::PageUp));
        assert_eq!(map_key("f12"), Some(Key::F12));
    }

    #[test]
    fn unmapped_names_are_none() {
        assert_eq!(map_key("audio_play"), None);
        assert_eq!(map_key("audio_stop"), None);
        assert_eq!(map_key("bogus"), None);
        // Routed to the button commands, not the keyboard.
        assert_eq!(map_key("mouse"), None);
    }

    #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
    #[test]
    fn extended_named_keys_map() {
        assert_eq!(map_key("right_shift"), Some(Key::RShift));
        assert_eq!(map_key("insert"), Some(Key::Insert));
        assert_eq!(map_key("printscreen"), Some(Key::Print));
    }

    #[test]
    fn modifiers_resolve() {
        assert_eq!(modifier_key(Modifier::None), None);
        assert_eq!(modifier_key(Modifier::Command), Some(Key::Meta));
    }
}
