//! Global key events on Linux via evdev
//!
//! Reads keyboard events directly from /dev/input/event* devices, which
//! works under both X11 and Wayland.
//!
//! # Requirements
//! - User must be in the `input` group: `sudo usermod -aG input $USER`
//! - Log out and back in after adding to group

use std::path::PathBuf;
use std::time::Duration;

use evdev::{Device, InputEventKind, Key};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{KeyAction, KeyBackend, KeyEventSource, KeyTokenResolver, RawKeyEvent};
use crate::hotkey::keys::{KeyToken, Modifier, NamedKey};
use crate::hotkey::HotkeyError;

/// Find all keyboard devices on the system
fn find_keyboards() -> Vec<(PathBuf, Device)> {
    evdev::enumerate()
        .filter(|(_, device)| {
            // A keyboard should support common keys
            device.supported_keys().map_or(false, |keys| {
                keys.contains(Key::KEY_ENTER)
                    && keys.contains(Key::KEY_SPACE)
                    && keys.contains(Key::KEY_A)
                    && keys.contains(Key::KEY_Z)
            })
        })
        .collect()
}

/// Explain an empty keyboard list
fn permission_error() -> HotkeyError {
    let visible = evdev::enumerate().count();
    if visible == 0 {
        HotkeyError::PermissionDenied(
            "no readable input devices; add yourself to the 'input' group \
             (sudo usermod -aG input $USER) and log in again"
                .to_string(),
        )
    } else {
        HotkeyError::PermissionDenied(format!(
            "found {} input devices but no readable keyboard",
            visible
        ))
    }
}

/// evdev-based global key hook
pub struct EvdevBackend;

impl KeyBackend for EvdevBackend {
    fn name(&self) -> &'static str {
        "evdev"
    }

    fn open(&self) -> Result<Box<dyn KeyEventSource>, HotkeyError> {
        let keyboards = find_keyboards();
        if keyboards.is_empty() {
            return Err(permission_error());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|e| HotkeyError::Backend(format!("failed to build event runtime: {}", e)))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut monitored = 0;

        {
            // Event streams register with the reactor of the current runtime
            let _guard = runtime.enter();

            for (path, device) in keyboards {
                let name = device.name().unwrap_or("Unknown").to_string();
                match device.into_event_stream() {
                    Ok(stream) => {
                        info!(?path, %name, "monitoring keyboard device");
                        runtime.spawn(forward_events(path, stream, event_tx.clone()));
                        monitored += 1;
                    }
                    Err(e) => warn!(?path, %name, error = %e, "failed to open event stream"),
                }
            }
        }

        if monitored == 0 {
            return Err(permission_error());
        }

        Ok(Box::new(EvdevSource { runtime, event_rx }))
    }
}

async fn forward_events(
    path: PathBuf,
    mut stream: evdev::EventStream,
    event_tx: mpsc::UnboundedSender<RawKeyEvent>,
) {
    loop {
        match stream.next_event().await {
            Ok(event) => {
                if let InputEventKind::Key(key) = event.kind() {
                    let action = match event.value() {
                        0 => KeyAction::Release,
                        1 => KeyAction::Press,
                        _ => KeyAction::Repeat,
                    };
                    let raw = RawKeyEvent {
                        code: u32::from(key.code()),
                        action,
                    };
                    if event_tx.send(raw).is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!(?path, error = %e, "device read error (disconnected?)");
                break;
            }
        }
    }
    debug!(?path, "stopped monitoring device");
}

struct EvdevSource {
    runtime: Runtime,
    event_rx: mpsc::UnboundedReceiver<RawKeyEvent>,
}

impl KeyEventSource for EvdevSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawKeyEvent>, HotkeyError> {
        let event_rx = &mut self.event_rx;
        self.runtime.block_on(async move {
            match tokio::time::timeout(timeout, event_rx.recv()).await {
                Ok(Some(event)) => Ok(Some(event)),
                Ok(None) => Err(HotkeyError::Backend(
                    "all keyboard devices disconnected".to_string(),
                )),
                Err(_) => Ok(None),
            }
        })
    }
}

/// Maps evdev key codes to tokens
pub struct EvdevKeyResolver;

impl KeyTokenResolver for EvdevKeyResolver {
    fn resolve(&self, code: u32) -> Option<KeyToken> {
        let key = Key::new(u16::try_from(code).ok()?);
        let token = match key {
            Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => KeyToken::Modifier(Modifier::Ctrl),
            Key::KEY_LEFTALT | Key::KEY_RIGHTALT => KeyToken::Modifier(Modifier::Alt),
            Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => KeyToken::Modifier(Modifier::Shift),
            Key::KEY_LEFTMETA | Key::KEY_RIGHTMETA => KeyToken::Modifier(Modifier::Super),

            Key::KEY_A => KeyToken::Char('a'),
            Key::KEY_B => KeyToken::Char('b'),
            Key::KEY_C => KeyToken::Char('c'),
            Key::KEY_D => KeyToken::Char('d'),
            Key::KEY_E => KeyToken::Char('e'),
            Key::KEY_F => KeyToken::Char('f'),
            Key::KEY_G => KeyToken::Char('g'),
            Key::KEY_H => KeyToken::Char('h'),
            Key::KEY_I => KeyToken::Char('i'),
            Key::KEY_J => KeyToken::Char('j'),
            Key::KEY_K => KeyToken::Char('k'),
            Key::KEY_L => KeyToken::Char('l'),
            Key::KEY_M => KeyToken::Char('m'),
            Key::KEY_N => KeyToken::Char('n'),
            Key::KEY_O => KeyToken::Char('o'),
            Key::KEY_P => KeyToken::Char('p'),
            Key::KEY_Q => KeyToken::Char('q'),
            Key::KEY_R => KeyToken::Char('r'),
            Key::KEY_S => KeyToken::Char('s'),
            Key::KEY_T => KeyToken::Char('t'),
            Key::KEY_U => KeyToken::Char('u'),
            Key::KEY_V => KeyToken::Char('v'),
            Key::KEY_W => KeyToken::Char('w'),
            Key::KEY_X => KeyToken::Char('x'),
            Key::KEY_Y => KeyToken::Char('y'),
            Key::KEY_Z => KeyToken::Char('z'),

            Key::KEY_0 => KeyToken::Char('0'),
            Key::KEY_1 => KeyToken::Char('1'),
            Key::KEY_2 => KeyToken::Char('2'),
            Key::KEY_3 => KeyToken::Char('3'),
            Key::KEY_4 => KeyToken::Char('4'),
            Key::KEY_5 => KeyToken::Char('5'),
            Key::KEY_6 => KeyToken::Char('6'),
            Key::KEY_7 => KeyToken::Char('7'),
            Key::KEY_8 => KeyToken::Char('8'),
            Key::KEY_9 => KeyToken::Char('9'),

            Key::KEY_MINUS => KeyToken::Char('-'),
            Key::KEY_EQUAL => KeyToken::Char('='),
            Key::KEY_LEFTBRACE => KeyToken::Char('['),
            Key::KEY_RIGHTBRACE => KeyToken::Char(']'),
            Key::KEY_BACKSLASH => KeyToken::Char('\\'),
            Key::KEY_SEMICOLON => KeyToken::Char(';'),
            Key::KEY_APOSTROPHE => KeyToken::Char('\''),
            Key::KEY_COMMA => KeyToken::Char(','),
            Key::KEY_DOT => KeyToken::Char('.'),
            Key::KEY_SLASH => KeyToken::Char('/'),
            Key::KEY_GRAVE => KeyToken::Char('`'),

            Key::KEY_F1 => KeyToken::Function(1),
            Key::KEY_F2 => KeyToken::Function(2),
            Key::KEY_F3 => KeyToken::Function(3),
            Key::KEY_F4 => KeyToken::Function(4),
            Key::KEY_F5 => KeyToken::Function(5),
            Key::KEY_F6 => KeyToken::Function(6),
            Key::KEY_F7 => KeyToken::Function(7),
            Key::KEY_F8 => KeyToken::Function(8),
            Key::KEY_F9 => KeyToken::Function(9),
            Key::KEY_F10 => KeyToken::Function(10),
            Key::KEY_F11 => KeyToken::Function(11),
            Key::KEY_F12 => KeyToken::Function(12),
            Key::KEY_F13 => KeyToken::Function(13),
            Key::KEY_F14 => KeyToken::Function(14),
            Key::KEY_F15 => KeyToken::Function(15),
            Key::KEY_F16 => KeyToken::Function(16),
            Key::KEY_F17 => KeyToken::Function(17),
            Key::KEY_F18 => KeyToken::Function(18),
            Key::KEY_F19 => KeyToken::Function(19),
            Key::KEY_F20 => KeyToken::Function(20),
            Key::KEY_F21 => KeyToken::Function(21),
            Key::KEY_F22 => KeyToken::Function(22),
            Key::KEY_F23 => KeyToken::Function(23),
            Key::KEY_F24 => KeyToken::Function(24),

            Key::KEY_ENTER | Key::KEY_KPENTER => KeyToken::Named(NamedKey::Enter),
            Key::KEY_ESC => KeyToken::Named(NamedKey::Escape),
            Key::KEY_TAB => KeyToken::Named(NamedKey::Tab),
            Key::KEY_SPACE => KeyToken::Named(NamedKey::Space),
            Key::KEY_BACKSPACE => KeyToken::Named(NamedKey::Backspace),
            Key::KEY_DELETE => KeyToken::Named(NamedKey::Delete),
            Key::KEY_INSERT => KeyToken::Named(NamedKey::Insert),
            Key::KEY_HOME => KeyToken::Named(NamedKey::Home),
            Key::KEY_END => KeyToken::Named(NamedKey::End),
            Key::KEY_PAGEUP => KeyToken::Named(NamedKey::PageUp),
            Key::KEY_PAGEDOWN => KeyToken::Named(NamedKey::PageDown),
            Key::KEY_UP => KeyToken::Named(NamedKey::Up),
            Key::KEY_DOWN => KeyToken::Named(NamedKey::Down),
            Key::KEY_LEFT => KeyToken::Named(NamedKey::Left),
            Key::KEY_RIGHT => KeyToken::Named(NamedKey::Right),
            Key::KEY_SYSRQ | Key::KEY_PRINT => KeyToken::Named(NamedKey::PrintScreen),
            Key::KEY_PAUSE => KeyToken::Named(NamedKey::Pause),
            Key::KEY_SCROLLLOCK => KeyToken::Named(NamedKey::ScrollLock),
            Key::KEY_CAPSLOCK => KeyToken::Named(NamedKey::CapsLock),
            _ => return None,
        };
        Some(token)
    }
}
