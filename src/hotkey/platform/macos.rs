//! Global key events on macOS using CGEventTap
//!
//! The tap is created on the listener thread and attached to that thread's
//! CFRunLoop, which is pumped in short slices from `next_event`.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use tracing::{error, info, warn};

use super::{KeyAction, KeyBackend, KeyEventSource, KeyTokenResolver, RawKeyEvent};
use crate::hotkey::keys::{KeyToken, Modifier, NamedKey};
use crate::hotkey::HotkeyError;

/// Modifier key flag masks from macOS CGEventFlags
mod flags {
    use core_graphics::event::CGEventFlags;

    pub const CONTROL: CGEventFlags = CGEventFlags::CGEventFlagControl;
    pub const OPTION: CGEventFlags = CGEventFlags::CGEventFlagAlternate;
    pub const SHIFT: CGEventFlags = CGEventFlags::CGEventFlagShift;
    pub const COMMAND: CGEventFlags = CGEventFlags::CGEventFlagCommand;

    // Per-side bits (IOKit NX_DEVICE*KEYMASK)
    pub const LEFT_CONTROL: u64 = 0x0000_0001;
    pub const LEFT_SHIFT: u64 = 0x0000_0002;
    pub const RIGHT_SHIFT: u64 = 0x0000_0004;
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
    pub const LEFT_OPTION: u64 = 0x0000_0020;
    pub const RIGHT_OPTION: u64 = 0x0000_0040;
    pub const RIGHT_CONTROL: u64 = 0x0000_2000;
}

const CAPS_LOCK: u32 = 0x39;

/// Messages from the tap callback to the listener thread
enum TapMessage {
    Key(RawKeyEvent),
    Disabled,
}

/// CGEventTap-based global key hook (needs Accessibility / Input Monitoring)
pub struct EventTapBackend;

impl KeyBackend for EventTapBackend {
    fn name(&self) -> &'static str {
        "cg-event-tap"
    }

    fn open(&self) -> Result<Box<dyn KeyEventSource>, HotkeyError> {
        let (callback_tx, callback_rx) = mpsc::channel::<TapMessage>();

        // CGEventTap callback - must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| -> Option<CGEvent> {
            match event_type {
                CGEventType::KeyDown | CGEventType::KeyUp => {
                    let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u32;
                    let action = if matches!(event_type, CGEventType::KeyUp) {
                        KeyAction::Release
                    } else if event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0 {
                        KeyAction::Repeat
                    } else {
                        KeyAction::Press
                    };
                    let _ = callback_tx.send(TapMessage::Key(RawKeyEvent { code, action }));
                }
                CGEventType::FlagsChanged => {
                    let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u32;
                    for &action in flags_changed(code, event.get_flags().bits()) {
                        let _ = callback_tx.send(TapMessage::Key(RawKeyEvent { code, action }));
                    }
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    let _ = callback_tx.send(TapMessage::Disabled);
                }
                _ => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::KeyDown, CGEventType::KeyUp, CGEventType::FlagsChanged],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::PermissionDenied(
                "macOS refused the event tap; grant Accessibility and Input Monitoring access".to_string(),
            )
        })?;

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::Backend("failed to create run loop source".to_string()))?;

        unsafe {
            CFRunLoop::get_current().add_source(&run_loop_source, kCFRunLoopCommonModes);
        }
        tap.enable();

        info!("event tap created and enabled");

        Ok(Box::new(EventTapSource {
            tap,
            _run_loop_source: run_loop_source,
            callback_rx,
            pending: VecDeque::new(),
        }))
    }
}

struct EventTapSource {
    tap: CGEventTap<'static>,
    _run_loop_source: CFRunLoopSource,
    callback_rx: mpsc::Receiver<TapMessage>,
    pending: VecDeque<RawKeyEvent>,
}

impl EventTapSource {
    fn drain(&mut self) {
        while let Ok(message) = self.callback_rx.try_recv() {
            match message {
                TapMessage::Key(event) => self.pending.push_back(event),
                TapMessage::Disabled => {
                    warn!("event tap disabled by the system, re-enabling");
                    self.tap.enable();
                }
            }
        }
    }
}

impl KeyEventSource for EventTapSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawKeyEvent>, HotkeyError> {
        self.drain();
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, timeout, true);
        }

        self.drain();
        Ok(self.pending.pop_front())
    }
}

/// Family flag, both per-side bits, and this key's own per-side bit
fn modifier_masks(code: u32) -> Option<(CGEventFlags, u64, u64)> {
    use flags::*;
    let masks = match code {
        0x3B => (CONTROL, LEFT_CONTROL | RIGHT_CONTROL, LEFT_CONTROL),
        0x3E => (CONTROL, LEFT_CONTROL | RIGHT_CONTROL, RIGHT_CONTROL),
        0x3A => (OPTION, LEFT_OPTION | RIGHT_OPTION, LEFT_OPTION),
        0x3D => (OPTION, LEFT_OPTION | RIGHT_OPTION, RIGHT_OPTION),
        0x38 => (SHIFT, LEFT_SHIFT | RIGHT_SHIFT, LEFT_SHIFT),
        0x3C => (SHIFT, LEFT_SHIFT | RIGHT_SHIFT, RIGHT_SHIFT),
        0x37 => (COMMAND, LEFT_COMMAND | RIGHT_COMMAND, LEFT_COMMAND),
        0x36 => (COMMAND, LEFT_COMMAND | RIGHT_COMMAND, RIGHT_COMMAND),
        _ => return None,
    };
    Some(masks)
}

/// Key events for one FlagsChanged event
fn flags_changed(code: u32, bits: u64) -> &'static [KeyAction] {
    // Caps Lock only reports its toggle; treat that as a tap
    if code == CAPS_LOCK {
        return &[KeyAction::Press, KeyAction::Release];
    }
    match modifier_action(code, bits) {
        Some(KeyAction::Press) => &[KeyAction::Press],
        Some(_) => &[KeyAction::Release],
        None => &[],
    }
}

/// Whether the modifier key `code` is now down, from the event's flags
///
/// Uses the per-side bits so releasing one of two held Shift keys is seen;
/// falls back to the family flag for sources that leave them unset.
fn modifier_action(code: u32, bits: u64) -> Option<KeyAction> {
    let (family, sides, own) = modifier_masks(code)?;
    let held = if bits & sides != 0 {
        bits & own != 0
    } else {
        bits & family.bits() != 0
    };
    Some(if held { KeyAction::Press } else { KeyAction::Release })
}

/// US ANSI virtual key codes
pub struct MacKeyResolver;

impl KeyTokenResolver for MacKeyResolver {
    fn resolve(&self, code: u32) -> Option<KeyToken> {
        let token = match code {
            0x3B | 0x3E => KeyToken::Modifier(Modifier::Ctrl),
            0x3A | 0x3D => KeyToken::Modifier(Modifier::Alt),
            0x38 | 0x3C => KeyToken::Modifier(Modifier::Shift),
            0x37 | 0x36 => KeyToken::Modifier(Modifier::Super),

            0x00 => KeyToken::Char('a'),
            0x0B => KeyToken::Char('b'),
            0x08 => KeyToken::Char('c'),
            0x02 => KeyToken::Char('d'),
            0x0E => KeyToken::Char('e'),
            0x03 => KeyToken::Char('f'),
            0x05 => KeyToken::Char('g'),
            0x04 => KeyToken::Char('h'),
            0x22 => KeyToken::Char('i'),
            0x26 => KeyToken::Char('j'),
            0x28 => KeyToken::Char('k'),
            0x25 => KeyToken::Char('l'),
            0x2E => KeyToken::Char('m'),
            0x2D => KeyToken::Char('n'),
            0x1F => KeyToken::Char('o'),
            0x23 => KeyToken::Char('p'),
            0x0C => KeyToken::Char('q'),
            0x0F => KeyToken::Char('r'),
            0x01 => KeyToken::Char('s'),
            0x11 => KeyToken::Char('t'),
            0x20 => KeyToken::Char('u'),
            0x09 => KeyToken::Char('v'),
            0x0D => KeyToken::Char('w'),
            0x07 => KeyToken::Char('x'),
            0x10 => KeyToken::Char('y'),
            0x06 => KeyToken::Char('z'),

            0x1D => KeyToken::Char('0'),
            0x12 => KeyToken::Char('1'),
            0x13 => KeyToken::Char('2'),
            0x14 => KeyToken::Char('3'),
            0x15 => KeyToken::Char('4'),
            0x17 => KeyToken::Char('5'),
            0x16 => KeyToken::Char('6'),
            0x1A => KeyToken::Char('7'),
            0x1C => KeyToken::Char('8'),
            0x19 => KeyToken::Char('9'),

            0x1B => KeyToken::Char('-'),
            0x18 => KeyToken::Char('='),
            0x21 => KeyToken::Char('['),
            0x1E => KeyToken::Char(']'),
            0x2A => KeyToken::Char('\\'),
            0x29 => KeyToken::Char(';'),
            0x27 => KeyToken::Char('\''),
            0x2B => KeyToken::Char(','),
            0x2F => KeyToken::Char('.'),
            0x2C => KeyToken::Char('/'),
            0x32 => KeyToken::Char('`'),

            0x7A => KeyToken::Function(1),
            0x78 => KeyToken::Function(2),
            0x63 => KeyToken::Function(3),
            0x76 => KeyToken::Function(4),
            0x60 => KeyToken::Function(5),
            0x61 => KeyToken::Function(6),
            0x62 => KeyToken::Function(7),
            0x64 => KeyToken::Function(8),
            0x65 => KeyToken::Function(9),
            0x6D => KeyToken::Function(10),
            0x67 => KeyToken::Function(11),
            0x6F => KeyToken::Function(12),
            0x69 => KeyToken::Function(13),
            0x6B => KeyToken::Function(14),
            0x71 => KeyToken::Function(15),
            0x6A => KeyToken::Function(16),
            0x40 => KeyToken::Function(17),
            0x4F => KeyToken::Function(18),
            0x50 => KeyToken::Function(19),
            0x5A => KeyToken::Function(20),

            0x24 => KeyToken::Named(NamedKey::Enter),
            0x35 => KeyToken::Named(NamedKey::Escape),
            0x30 => KeyToken::Named(NamedKey::Tab),
            0x31 => KeyToken::Named(NamedKey::Space),
            0x33 => KeyToken::Named(NamedKey::Backspace),
            0x75 => KeyToken::Named(NamedKey::Delete),
            0x72 => KeyToken::Named(NamedKey::Insert),
            0x73 => KeyToken::Named(NamedKey::Home),
            0x77 => KeyToken::Named(NamedKey::End),
            0x74 => KeyToken::Named(NamedKey::PageUp),
            0x79 => KeyToken::Named(NamedKey::PageDown),
            0x7E => KeyToken::Named(NamedKey::Up),
            0x7D => KeyToken::Named(NamedKey::Down),
            0x7B => KeyToken::Named(NamedKey::Left),
            0x7C => KeyToken::Named(NamedKey::Right),
            0x39 => KeyToken::Named(NamedKey::CapsLock),
            _ => return None,
        };
        Some(token)
    }
}
