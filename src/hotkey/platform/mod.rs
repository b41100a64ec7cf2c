//! Platform seams for global keyboard events
//!
//! A [`KeyBackend`] installs the global hook on the listener thread and
//! yields raw platform key codes; a [`KeyTokenResolver`] maps those codes
//! onto [`KeyToken`]s. The matching logic never sees platform types.

use std::sync::Arc;
use std::time::Duration;

use super::keys::KeyToken;
use super::HotkeyError;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
pub use linux::{EvdevBackend, EvdevKeyResolver};
#[cfg(target_os = "macos")]
pub use macos::{EventTapBackend, MacKeyResolver};

/// Direction of a raw key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
    /// Auto-repeat while the key is held
    Repeat,
}

/// A key event in platform terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    /// Virtual key code (macOS) or evdev key code (Linux)
    pub code: u32,
    pub action: KeyAction,
}

/// Installs the platform's global key hook
pub trait KeyBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Install the hook. Called on the listener thread, which then owns the
    /// returned source until the listener stops.
    fn open(&self) -> Result<Box<dyn KeyEventSource>, HotkeyError>;
}

/// A live global key hook
pub trait KeyEventSource {
    /// Wait up to `timeout` for the next key event. `Ok(None)` means the
    /// interval elapsed without one.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawKeyEvent>, HotkeyError>;
}

/// Maps platform key codes to canonical tokens
pub trait KeyTokenResolver: Send + Sync {
    fn resolve(&self, code: u32) -> Option<KeyToken>;
}

/// Backend and resolver for the host platform
#[cfg(target_os = "macos")]
pub fn native() -> Result<(Arc<dyn KeyBackend>, Arc<dyn KeyTokenResolver>), HotkeyError> {
    Ok((Arc::new(EventTapBackend), Arc::new(MacKeyResolver)))
}

/// Backend and resolver for the host platform
#[cfg(target_os = "linux")]
pub fn native() -> Result<(Arc<dyn KeyBackend>, Arc<dyn KeyTokenResolver>), HotkeyError> {
    Ok((Arc::new(EvdevBackend), Arc::new(EvdevKeyResolver)))
}

/// Backend and resolver for the host platform
#[cfg(not(any(target_os = "macos", target_os = "linux")))]
pub fn native() -> Result<(Arc<dyn KeyBackend>, Arc<dyn KeyTokenResolver>), HotkeyError> {
    Err(HotkeyError::Unsupported(std::env::consts::OS))
}
