//! Foreground chord recording
//!
//! Captures the next complete key press from a focused input (the terminal
//! by default) and turns it into a [`Chord`]. Unlike the global listener
//! this needs no system-wide hook permission.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    ModifierKeyCode, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use tracing::debug;

use super::chord::Chord;
use super::keys::{unshift_us, KeyToken, Modifier, ModifierSet, NamedKey};
use super::{HotkeyError, ParseError};

/// Upper bound for one wait when recording has no deadline
const IDLE_SLICE: Duration = Duration::from_millis(250);

/// A key-down with the modifiers held at that moment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedKey {
    pub modifiers: ModifierSet,
    pub key: KeyToken,
}

/// Source of foreground key-downs
pub trait KeyCapture {
    /// Wait up to `timeout` for the next key-down
    fn next_key(&mut self, timeout: Duration) -> Result<Option<CapturedKey>, HotkeyError>;
}

/// Outcome of a recording that did not produce a chord
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("recording cancelled")]
    Cancelled,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Capture(#[from] HotkeyError),
}

/// Wait for the first complete key-down and convert it to a chord
///
/// Modifier-only presses are skipped. A bare Escape or an elapsed
/// `timeout` cancels.
pub fn record_chord(
    capture: &mut dyn KeyCapture,
    timeout: Option<Duration>,
) -> Result<Chord, RecordError> {
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        let slice = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(RecordError::Cancelled);
                }
                remaining
            }
            None => IDLE_SLICE,
        };

        let Some(captured) = capture.next_key(slice)? else {
            continue;
        };

        if captured.key.is_modifier() {
            debug!(modifiers = ?captured.modifiers, "ignoring modifier-only key-down");
            continue;
        }
        if captured.key == KeyToken::Named(NamedKey::Escape) && captured.modifiers.is_empty() {
            return Err(RecordError::Cancelled);
        }

        return Ok(Chord::new(captured.modifiers, captured.key)?);
    }
}

/// Records from the controlling terminal in raw mode
pub struct TerminalCapture {
    enhanced: bool,
}

impl TerminalCapture {
    /// Switch the terminal to raw mode until the capture is dropped
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        // Report modifier keys and Super where the terminal supports it
        let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false)
            && execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
                )
            )
            .is_ok();
        Ok(Self { enhanced })
    }
}

impl Drop for TerminalCapture {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
        let _ = io::stdout().flush();
    }
}

impl KeyCapture for TerminalCapture {
    fn next_key(&mut self, timeout: Duration) -> Result<Option<CapturedKey>, HotkeyError> {
        let capture_err = |e: io::Error| HotkeyError::Capture(e.to_string());

        if !event::poll(timeout).map_err(capture_err)? {
            return Ok(None);
        }
        match event::read().map_err(capture_err)? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if !self.enhanced && is_ambiguous_legacy(key.code, key.modifiers) {
                    return Err(HotkeyError::Capture(
                        "this terminal reports Ctrl+Shift+letter as Ctrl+letter; \
                         set the hotkey with `autoscreen bind <chord>` instead"
                            .to_string(),
                    ));
                }
                Ok(captured_from_terminal(key.code, key.modifiers))
            }
            _ => Ok(None),
        }
    }
}

/// Legacy terminal encodings drop Shift from Ctrl+letter
fn is_ambiguous_legacy(code: KeyCode, modifiers: KeyModifiers) -> bool {
    matches!(code, KeyCode::Char(c) if c.is_ascii_alphabetic())
        && modifiers.contains(KeyModifiers::CONTROL)
        && !modifiers.contains(KeyModifiers::SHIFT)
}

fn captured_from_terminal(code: KeyCode, modifiers: KeyModifiers) -> Option<CapturedKey> {
    let mut held = ModifierSet::EMPTY;
    if modifiers.contains(KeyModifiers::CONTROL) {
        held.insert(Modifier::Ctrl);
    }
    if modifiers.contains(KeyModifiers::ALT) {
        held.insert(Modifier::Alt);
    }
    if modifiers.contains(KeyModifiers::SHIFT) {
        held.insert(Modifier::Shift);
    }
    if modifiers.intersects(KeyModifiers::SUPER | KeyModifiers::META | KeyModifiers::HYPER) {
        held.insert(Modifier::Super);
    }

    let key = match code {
        KeyCode::Char(' ') => KeyToken::Named(NamedKey::Space),
        KeyCode::Char(c) => {
            // The terminal sends the shifted character, not the Shift flag
            if c.is_uppercase() || unshift_us(c) != c {
                held.insert(Modifier::Shift);
            }
            KeyToken::from_char(c)?
        }
        KeyCode::F(n) => KeyToken::Function(n),
        KeyCode::Enter => KeyToken::Named(NamedKey::Enter),
        KeyCode::Esc => KeyToken::Named(NamedKey::Escape),
        KeyCode::Tab | KeyCode::BackTab => KeyToken::Named(NamedKey::Tab),
        KeyCode::Backspace => KeyToken::Named(NamedKey::Backspace),
        KeyCode::Delete => KeyToken::Named(NamedKey::Delete),
        KeyCode::Insert => KeyToken::Named(NamedKey::Insert),
        KeyCode::Home => KeyToken::Named(NamedKey::Home),
        KeyCode::End => KeyToken::Named(NamedKey::End),
        KeyCode::PageUp => KeyToken::Named(NamedKey::PageUp),
        KeyCode::PageDown => KeyToken::Named(NamedKey::PageDown),
        KeyCode::Up => KeyToken::Named(NamedKey::Up),
        KeyCode::Down => KeyToken::Named(NamedKey::Down),
        KeyCode::Left => KeyToken::Named(NamedKey::Left),
        KeyCode::Right => KeyToken::Named(NamedKey::Right),
        KeyCode::PrintScreen => KeyToken::Named(NamedKey::PrintScreen),
        KeyCode::Pause => KeyToken::Named(NamedKey::Pause),
        KeyCode::ScrollLock => KeyToken::Named(NamedKey::ScrollLock),
        KeyCode::CapsLock => KeyToken::Named(NamedKey::CapsLock),
        KeyCode::Modifier(modifier) => KeyToken::Modifier(match modifier {
            ModifierKeyCode::LeftControl | ModifierKeyCode::RightControl => Modifier::Ctrl,
            ModifierKeyCode::LeftAlt | ModifierKeyCode::RightAlt => Modifier::Alt,
            ModifierKeyCode::LeftShift | ModifierKeyCode::RightShift => Modifier::Shift,
            _ => Modifier::Super,
        }),
        _ => return None,
    };

    Some(CapturedKey {
        modifiers: held,
        key,
    })
}
