//! Hotkey module for global keyboard event listening
//!
//! Parses hotkey text into chords, listens to the platform's global key
//! stream and raises an activation when the bound chord is pressed.

pub mod chord;
mod keys;
mod listener;
pub mod platform;
pub mod recorder;

#[cfg(test)]
pub(crate) mod testing;

pub use chord::{Chord, ParseError};
pub use keys::{KeyToken, Modifier, ModifierSet, NamedKey, PressState};
pub use listener::{ChordMatcher, HotkeyListener, ListenerFailure, ListenerHandle};
pub use recorder::{record_chord, CapturedKey, KeyCapture, RecordError, TerminalCapture};

/// Errors that can occur while installing or running a hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("permission to listen for global key events was denied: {0}")]
    PermissionDenied(String),

    #[error("invalid chord: {0}")]
    InvalidChord(String),

    #[error("global hotkeys are not supported on {0}")]
    Unsupported(&'static str),

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("listener did not confirm startup in time")]
    StartTimeout,

    #[error("key event backend failed: {0}")]
    Backend(String),

    #[error("key capture failed: {0}")]
    Capture(String),
}
