//! In-memory key backend and resolver for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

use super::chord::Chord;
use super::keys::{KeyToken, Modifier, NamedKey};
use super::platform::{KeyAction, KeyBackend, KeyEventSource, KeyTokenResolver, RawKeyEvent};
use super::recorder::{CapturedKey, KeyCapture};
use super::HotkeyError;

/// Backend whose "hooks" are channels fed by `inject_all`
#[derive(Default)]
pub struct FakeBackend {
    deny: AtomicBool,
    opened: AtomicUsize,
    taps: Mutex<Vec<Sender<RawKeyEvent>>>,
}

impl FakeBackend {
    pub fn deny_permission(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of hooks that are still installed
    pub fn live_taps(&self) -> usize {
        let mut taps = self.taps.lock().unwrap();
        taps.retain(|tap| tap.send(RawKeyEvent { code: u32::MAX, action: KeyAction::Release }).is_ok());
        taps.len()
    }

    /// Unplug every hook; their sources report a backend error
    pub fn disconnect_all(&self) {
        self.taps.lock().unwrap().clear();
    }

    /// Deliver events to every installed hook, in order
    pub fn inject_all(&self, events: &[RawKeyEvent]) {
        let mut taps = self.taps.lock().unwrap();
        taps.retain(|tap| events.iter().all(|event| tap.send(*event).is_ok()));
    }
}

impl KeyBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn open(&self) -> Result<Box<dyn KeyEventSource>, HotkeyError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(HotkeyError::PermissionDenied("denied by test".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = channel();
        self.taps.lock().unwrap().push(tx);
        Ok(Box::new(FakeSource { rx }))
    }
}

struct FakeSource {
    rx: Receiver<RawKeyEvent>,
}

impl KeyEventSource for FakeSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<RawKeyEvent>, HotkeyError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(HotkeyError::Backend("fake backend dropped".to_string()))
            }
        }
    }
}

/// Codes are derived from tokens with [`code_of`]
pub struct FakeResolver;

pub fn code_of(token: KeyToken) -> u32 {
    match token {
        KeyToken::Modifier(m) => 1 + Modifier::ALL.iter().position(|x| *x == m).unwrap_or(0) as u32,
        KeyToken::Char(c) => 0x100 + c as u32,
        KeyToken::Function(n) => 0x1000 + u32::from(n),
        KeyToken::Named(key) => {
            0x2000 + NamedKey::ALL.iter().position(|x| *x == key).unwrap_or(0) as u32
        }
    }
}

impl KeyTokenResolver for FakeResolver {
    fn resolve(&self, code: u32) -> Option<KeyToken> {
        match code {
            1..=4 => Some(KeyToken::Modifier(Modifier::ALL[(code - 1) as usize])),
            0x100..=0xFFF => char::from_u32(code - 0x100).map(KeyToken::Char),
            0x1000..=0x1FFF => u8::try_from(code - 0x1000).ok().map(KeyToken::Function),
            0x2000..=0x2FFF => NamedKey::ALL.get((code - 0x2000) as usize).copied().map(KeyToken::Named),
            _ => None,
        }
    }
}

pub fn event(token: KeyToken, action: KeyAction) -> RawKeyEvent {
    RawKeyEvent {
        code: code_of(token),
        action,
    }
}

/// Press modifiers, tap the trigger, release everything
pub fn chord_press(chord: &Chord) -> Vec<RawKeyEvent> {
    let mut events: Vec<RawKeyEvent> = chord
        .required_modifiers()
        .iter()
        .map(|m| event(KeyToken::Modifier(m), KeyAction::Press))
        .collect();
    events.push(event(chord.trigger(), KeyAction::Press));
    events.push(event(chord.trigger(), KeyAction::Release));
    events.extend(
        chord
            .required_modifiers()
            .iter()
            .map(|m| event(KeyToken::Modifier(m), KeyAction::Release)),
    );
    events
}

/// Replays scripted key-downs; an empty script behaves like an idle keyboard
#[derive(Default)]
pub struct ScriptedCapture {
    keys: VecDeque<CapturedKey>,
}

impl ScriptedCapture {
    pub fn new(keys: impl IntoIterator<Item = CapturedKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl KeyCapture for ScriptedCapture {
    fn next_key(&mut self, timeout: Duration) -> Result<Option<CapturedKey>, HotkeyError> {
        match self.keys.pop_front() {
            Some(key) => Ok(Some(key)),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

pub fn captured(modifiers: &[Modifier], key: KeyToken) -> CapturedKey {
    CapturedKey {
        modifiers: modifiers.iter().copied().collect(),
        key,
    }
}
