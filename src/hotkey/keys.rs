//! Key identities and modifier state tracking
//!
//! Provides the platform-independent `KeyToken`, the `Modifier`
//! enumeration, a compact `ModifierSet` and the per-listener `PressState`.

use std::fmt;

/// One of the four modifier families. Left and right keys map to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    /// Command on macOS, Windows/Meta key elsewhere
    Super,
}

impl Modifier {
    /// All modifiers in canonical order
    pub const ALL: [Modifier; 4] = [Modifier::Ctrl, Modifier::Alt, Modifier::Shift, Modifier::Super];

    /// Resolve a lower-cased alias (`control`, `option`, `cmd`, ...)
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "option" | "opt" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "cmd" | "command" | "super" | "win" | "meta" => Some(Modifier::Super),
            _ => None,
        }
    }

    /// Canonical token used when formatting chords
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Ctrl => "ctrl",
            Modifier::Alt => "alt",
            Modifier::Shift => "shift",
            Modifier::Super => "super",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Modifier::Ctrl => 0b0001,
            Modifier::Alt => 0b0010,
            Modifier::Shift => 0b0100,
            Modifier::Super => 0b1000,
        }
    }
}

/// A set of modifiers, stored as a bitmask so it can be shared atomically
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModifierSet(u8);

impl ModifierSet {
    pub const EMPTY: ModifierSet = ModifierSet(0);

    pub fn insert(&mut self, modifier: Modifier) {
        self.0 |= modifier.bit();
    }

    pub fn remove(&mut self, modifier: Modifier) {
        self.0 &= !modifier.bit();
    }

    pub fn contains(&self, modifier: Modifier) -> bool {
        self.0 & modifier.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Modifiers in canonical order
    pub fn iter(&self) -> impl Iterator<Item = Modifier> + '_ {
        Modifier::ALL.into_iter().filter(move |m| self.contains(*m))
    }

    /// Raw bitmask, for atomic snapshots
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Rebuild from a bitmask produced by [`ModifierSet::bits`]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1111)
    }
}

impl FromIterator<Modifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        let mut set = ModifierSet::EMPTY;
        for modifier in iter {
            set.insert(modifier);
        }
        set
    }
}

/// Non-character keys with a stable name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Escape,
    Tab,
    Space,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    PrintScreen,
    Pause,
    ScrollLock,
    CapsLock,
}

impl NamedKey {
    pub const ALL: [NamedKey; 19] = [
        NamedKey::Enter,
        NamedKey::Escape,
        NamedKey::Tab,
        NamedKey::Space,
        NamedKey::Backspace,
        NamedKey::Delete,
        NamedKey::Insert,
        NamedKey::Home,
        NamedKey::End,
        NamedKey::PageUp,
        NamedKey::PageDown,
        NamedKey::Up,
        NamedKey::Down,
        NamedKey::Left,
        NamedKey::Right,
        NamedKey::PrintScreen,
        NamedKey::Pause,
        NamedKey::ScrollLock,
        NamedKey::CapsLock,
    ];

    /// Resolve a normalized (lower-case, whitespace-free) alias
    pub fn from_alias(alias: &str) -> Option<Self> {
        let key = match alias {
            "enter" | "return" => NamedKey::Enter,
            "esc" | "escape" => NamedKey::Escape,
            "tab" => NamedKey::Tab,
            "space" | "spacebar" => NamedKey::Space,
            "backspace" => NamedKey::Backspace,
            "delete" | "del" => NamedKey::Delete,
            "insert" | "ins" => NamedKey::Insert,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" | "pgup" => NamedKey::PageUp,
            "pagedown" | "pgdn" | "pgdown" => NamedKey::PageDown,
            "up" | "arrowup" => NamedKey::Up,
            "down" | "arrowdown" => NamedKey::Down,
            "left" | "arrowleft" => NamedKey::Left,
            "right" | "arrowright" => NamedKey::Right,
            "printscreen" | "print" | "prtsc" | "prtscn" | "prntscrn" | "snapshot" => {
                NamedKey::PrintScreen
            }
            "pause" | "break" => NamedKey::Pause,
            "scrolllock" => NamedKey::ScrollLock,
            "capslock" => NamedKey::CapsLock,
            _ => return None,
        };
        Some(key)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NamedKey::Enter => "enter",
            NamedKey::Escape => "esc",
            NamedKey::Tab => "tab",
            NamedKey::Space => "space",
            NamedKey::Backspace => "backspace",
            NamedKey::Delete => "delete",
            NamedKey::Insert => "insert",
            NamedKey::Home => "home",
            NamedKey::End => "end",
            NamedKey::PageUp => "pageup",
            NamedKey::PageDown => "pagedown",
            NamedKey::Up => "up",
            NamedKey::Down => "down",
            NamedKey::Left => "left",
            NamedKey::Right => "right",
            NamedKey::PrintScreen => "printscreen",
            NamedKey::Pause => "pause",
            NamedKey::ScrollLock => "scrolllock",
            NamedKey::CapsLock => "capslock",
        }
    }

    /// Name shown to the user
    pub fn label(self) -> &'static str {
        match self {
            NamedKey::Enter => "Enter",
            NamedKey::Escape => "Esc",
            NamedKey::Tab => "Tab",
            NamedKey::Space => "Space",
            NamedKey::Backspace => "Backspace",
            NamedKey::Delete => "Delete",
            NamedKey::Insert => "Insert",
            NamedKey::Home => "Home",
            NamedKey::End => "End",
            NamedKey::PageUp => "Page Up",
            NamedKey::PageDown => "Page Down",
            NamedKey::Up => "Up",
            NamedKey::Down => "Down",
            NamedKey::Left => "Left",
            NamedKey::Right => "Right",
            NamedKey::PrintScreen => "Print Screen",
            NamedKey::Pause => "Pause",
            NamedKey::ScrollLock => "Scroll Lock",
            NamedKey::CapsLock => "Caps Lock",
        }
    }
}

/// Canonical identity for a physical key, under the US reference layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyToken {
    /// Printable key, stored as its unshifted lower-case character
    Char(char),
    /// F1..=F24
    Function(u8),
    Named(NamedKey),
    Modifier(Modifier),
}

impl KeyToken {
    pub fn is_modifier(&self) -> bool {
        matches!(self, KeyToken::Modifier(_))
    }

    /// Keys that may be bound without any modifier held
    pub fn is_safe_bare(&self) -> bool {
        matches!(
            self,
            KeyToken::Function(_) | KeyToken::Named(NamedKey::PrintScreen)
        )
    }

    /// Build a character token, folding case and shifted US punctuation
    pub fn from_char(c: char) -> Option<Self> {
        if c.is_whitespace() || c.is_control() {
            return None;
        }
        let c = unshift_us(c.to_ascii_lowercase());
        Some(KeyToken::Char(c))
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::Char(c) => write!(f, "{}", c),
            KeyToken::Function(n) => write!(f, "f{}", n),
            KeyToken::Named(key) => f.write_str(key.as_str()),
            KeyToken::Modifier(m) => f.write_str(m.as_str()),
        }
    }
}

/// Map a shifted US-layout symbol to the key that produces it
pub fn unshift_us(c: char) -> char {
    match c {
        '!' => '1',
        '@' => '2',
        '#' => '3',
        '$' => '4',
        '%' => '5',
        '^' => '6',
        '&' => '7',
        '*' => '8',
        '(' => '9',
        ')' => '0',
        '_' => '-',
        '+' => '=',
        '{' => '[',
        '}' => ']',
        '|' => '\\',
        ':' => ';',
        '"' => '\'',
        '<' => ',',
        '>' => '.',
        '?' => '/',
        '~' => '`',
        other => other,
    }
}

/// Upper bound on distinct modifier keys tracked at once (left/right of each)
const MAX_HELD_KEYS: usize = 8;

/// Modifiers currently held, as seen by one listener
///
/// Tracked per physical key so releasing one of two held Ctrl keys leaves
/// Ctrl held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressState {
    keys: [Option<(Modifier, u32)>; MAX_HELD_KEYS],
}

impl PressState {
    /// Record `code` (a key that resolves to `modifier`) as held
    pub fn press(&mut self, modifier: Modifier, code: u32) {
        if self.keys.contains(&Some((modifier, code))) {
            return;
        }
        match self.keys.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some((modifier, code)),
            None => tracing::warn!(code, "too many modifier keys held, ignoring one"),
        }
    }

    pub fn release(&mut self, modifier: Modifier, code: u32) {
        for slot in self.keys.iter_mut() {
            if *slot == Some((modifier, code)) {
                *slot = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.keys = [None; MAX_HELD_KEYS];
    }

    /// Copy of the held set
    pub fn snapshot(&self) -> ModifierSet {
        self.keys.iter().flatten().map(|(modifier, _)| *modifier).collect()
    }
}
