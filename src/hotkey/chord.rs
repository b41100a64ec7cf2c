//! Hotkey chord parsing and formatting
//!
//! Turns user text such as `"Ctrl + Shift + S"` into a canonical [`Chord`]
//! and back into the lower-case `+`-joined form stored in the config file.

use std::fmt;
use std::str::FromStr;

use super::keys::{KeyToken, Modifier, ModifierSet, NamedKey};

/// Highest function key accepted by the parser
const MAX_FUNCTION_KEY: u8 = 24;

/// Errors produced while parsing hotkey text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("a hotkey needs exactly one non-modifier key")]
    MultipleOrMissingTrigger,

    #[error("unknown key: {0:?}")]
    UnknownKey(String),

    #[error("{0:?} needs at least one modifier (only function keys and PrintScreen may be bound alone)")]
    MissingModifier(String),
}

/// A set of modifiers plus exactly one trigger key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    required_modifiers: ModifierSet,
    trigger: KeyToken,
}

impl Chord {
    /// Build a chord, enforcing the trigger and bare-key rules
    pub fn new(required_modifiers: ModifierSet, trigger: KeyToken) -> Result<Self, ParseError> {
        if trigger.is_modifier() {
            return Err(ParseError::MultipleOrMissingTrigger);
        }
        if let KeyToken::Function(n) = trigger {
            if !(1..=MAX_FUNCTION_KEY).contains(&n) {
                return Err(ParseError::UnknownKey(trigger.to_string()));
            }
        }
        if required_modifiers.is_empty() && !trigger.is_safe_bare() {
            return Err(ParseError::MissingModifier(trigger.to_string()));
        }
        Ok(Self {
            required_modifiers,
            trigger,
        })
    }

    pub fn required_modifiers(&self) -> ModifierSet {
        self.required_modifiers
    }

    pub fn trigger(&self) -> KeyToken {
        self.trigger
    }

    /// Re-check the invariants `new` enforces
    pub fn validate(&self) -> Result<(), ParseError> {
        Chord::new(self.required_modifiers, self.trigger).map(|_| ())
    }

    /// Human-facing label, e.g. `Cmd+Shift+S` on macOS
    pub fn label(&self) -> String {
        let mut parts: Vec<String> = self
            .required_modifiers
            .iter()
            .map(|m| {
                match m {
                    Modifier::Ctrl => "Ctrl",
                    Modifier::Alt if cfg!(target_os = "macos") => "Option",
                    Modifier::Alt => "Alt",
                    Modifier::Shift => "Shift",
                    Modifier::Super if cfg!(target_os = "macos") => "Cmd",
                    Modifier::Super => "Super",
                }
                .to_string()
            })
            .collect();
        parts.push(match self.trigger {
            KeyToken::Char(c) => c.to_uppercase().to_string(),
            KeyToken::Function(n) => format!("F{}", n),
            KeyToken::Named(key) => key.label().to_string(),
            KeyToken::Modifier(m) => m.as_str().to_string(),
        });
        parts.join("+")
    }

    #[cfg(test)]
    pub(crate) fn from_parts_unchecked(required_modifiers: ModifierSet, trigger: KeyToken) -> Self {
        Self {
            required_modifiers,
            trigger,
        }
    }
}

/// Parse hotkey text into a canonical chord
pub fn parse(text: &str) -> Result<Chord, ParseError> {
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    let mut modifiers = ModifierSet::EMPTY;
    let mut triggers = Vec::new();

    for token in normalized.split('+') {
        match Modifier::from_alias(token) {
            Some(modifier) => modifiers.insert(modifier),
            None => triggers.push(token),
        }
    }

    let [token] = triggers.as_slice() else {
        return Err(ParseError::MultipleOrMissingTrigger);
    };
    let trigger = resolve_trigger(token)?;

    Chord::new(modifiers, trigger)
}

/// Canonical text form, the inverse of [`parse`]
pub fn format(chord: &Chord) -> String {
    chord.to_string()
}

fn resolve_trigger(token: &str) -> Result<KeyToken, ParseError> {
    if token.is_empty() {
        return Err(ParseError::MultipleOrMissingTrigger);
    }

    if let Some(digits) = token.strip_prefix('f') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return match digits.parse::<u8>() {
                Ok(n) if (1..=MAX_FUNCTION_KEY).contains(&n) => Ok(KeyToken::Function(n)),
                _ => Err(ParseError::UnknownKey(token.to_string())),
            };
        }
    }

    if let Some(named) = NamedKey::from_alias(token) {
        return Ok(KeyToken::Named(named));
    }

    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => {
            KeyToken::from_char(c).ok_or_else(|| ParseError::UnknownKey(token.to_string()))
        }
        _ => Err(ParseError::UnknownKey(token.to_string())),
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in self.required_modifiers.iter() {
            write!(f, "{}+", modifier.as_str())?;
        }
        write!(f, "{}", self.trigger)
    }
}

impl FromStr for Chord {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mods(list: &[Modifier]) -> ModifierSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_parse_basic() {
        let chord = parse("ctrl+shift+s").unwrap();
        assert_eq!(chord.required_modifiers(), mods(&[Modifier::Ctrl, Modifier::Shift]));
        assert_eq!(chord.trigger(), KeyToken::Char('s'));
    }

    #[test]
    fn test_modifier_order_does_not_matter() {
        assert_eq!(parse("shift+ctrl+s").unwrap(), parse("ctrl+shift+s").unwrap());
        assert_eq!(parse("Shift + Control + S").unwrap(), parse("ctrl+shift+s").unwrap());
    }

    #[test]
    fn test_aliases_collapse() {
        assert_eq!(parse("cmd+shift+4").unwrap(), parse("super+shift+4").unwrap());
        assert_eq!(parse("win+s").unwrap(), parse("command+s").unwrap());
        assert_eq!(parse("option+p").unwrap(), parse("alt+p").unwrap());
    }

    #[test]
    fn test_missing_or_multiple_trigger() {
        assert_eq!(parse("ctrl++s"), Err(ParseError::MultipleOrMissingTrigger));
        assert_eq!(parse("shift"), Err(ParseError::MultipleOrMissingTrigger));
        assert_eq!(parse("ctrl+shift"), Err(ParseError::MultipleOrMissingTrigger));
        assert_eq!(parse("ctrl+a+b"), Err(ParseError::MultipleOrMissingTrigger));
        assert_eq!(parse(""), Err(ParseError::MultipleOrMissingTrigger));
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(parse("f12").unwrap().trigger(), KeyToken::Function(12));
        assert_eq!(parse("ctrl+F1").unwrap().trigger(), KeyToken::Function(1));
        assert_eq!(parse("ctrl+f99"), Err(ParseError::UnknownKey("f99".to_string())));
        assert_eq!(parse("ctrl+f0"), Err(ParseError::UnknownKey("f0".to_string())));
        // A lone "f" is the letter key
        assert_eq!(parse("ctrl+f").unwrap().trigger(), KeyToken::Char('f'));
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(
            parse("print screen").unwrap().trigger(),
            KeyToken::Named(NamedKey::PrintScreen)
        );
        assert_eq!(
            parse("ctrl+page up").unwrap().trigger(),
            KeyToken::Named(NamedKey::PageUp)
        );
        assert_eq!(
            parse("alt+Escape").unwrap().trigger(),
            KeyToken::Named(NamedKey::Escape)
        );
        assert_eq!(
            parse("ctrl+return").unwrap().trigger(),
            KeyToken::Named(NamedKey::Enter)
        );
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(
            parse("ctrl+banana"),
            Err(ParseError::UnknownKey("banana".to_string()))
        );
    }

    #[test]
    fn test_bare_keys_need_safe_trigger() {
        assert_eq!(parse("s"), Err(ParseError::MissingModifier("s".to_string())));
        assert_eq!(parse("enter"), Err(ParseError::MissingModifier("enter".to_string())));
        assert!(parse("f12").is_ok());
        assert!(parse("printscreen").is_ok());
    }

    #[test]
    fn test_format_is_canonical() {
        assert_eq!(format(&parse("S+Shift+Ctrl").unwrap()), "ctrl+shift+s");
        assert_eq!(format(&parse("cmd + shift + 4").unwrap()), "shift+super+4");
        assert_eq!(format(&parse("print screen").unwrap()), "printscreen");
        assert_eq!(format(&parse("alt+esc").unwrap()), "alt+esc");
    }

    #[test]
    fn test_format_parse_is_idempotent() {
        for text in [
            "ctrl+shift+s",
            "Shift + Ctrl + S",
            "cmd+option+f5",
            "control+page down",
            "alt+!",
            "super+`",
            "f24",
            "print screen",
        ] {
            let once = format(&parse(text).unwrap());
            let twice = format(&parse(&once).unwrap());
            assert_eq!(once, twice, "canonical form drifted for {text:?}");
        }
    }

    #[test]
    fn test_validate_rejects_modifier_trigger() {
        let chord = Chord::from_parts_unchecked(ModifierSet::EMPTY, KeyToken::Modifier(Modifier::Ctrl));
        assert!(chord.validate().is_err());
    }

    #[test]
    fn test_label() {
        let chord = parse("ctrl+shift+s").unwrap();
        assert_eq!(chord.label(), "Ctrl+Shift+S");
        assert_eq!(parse("ctrl+pageup").unwrap().label(), "Ctrl+Page Up");
        assert_eq!(parse("printscreen").unwrap().label(), "Print Screen");
    }

    #[test]
    fn test_new_rejects_out_of_range_function_keys() {
        let ctrl = mods(&[Modifier::Ctrl]);
        assert_eq!(
            Chord::new(ctrl, KeyToken::Function(30)),
            Err(ParseError::UnknownKey("f30".to_string()))
        );
        assert_eq!(
            Chord::new(ModifierSet::EMPTY, KeyToken::Function(0)),
            Err(ParseError::UnknownKey("f0".to_string()))
        );
        assert!(Chord::new(ctrl, KeyToken::Function(24)).is_ok());

        let unchecked = Chord::from_parts_unchecked(ctrl, KeyToken::Function(35));
        assert!(unchecked.validate().is_err());
    }
}
