//! Key-combo parsing and normalization.
//!
//! Turns a user-supplied string such as `" Ctrl + Shift + X "` into the
//! canonical lower-case form `ctrl+shift+x` understood by the hotkey service.
//! Normalization is idempotent: parsing a canonical string yields itself.

use std::fmt;

use hotmacro_core::error::{HotmacroError, Result};

/// Chord separator.
const SEPARATOR: char = '+';

/// Canonical modifier names, in the order they appear in a canonical chord.
const MODIFIERS: &[&str] = &["ctrl", "shift", "alt", "super"];

/// Named keys accepted besides `f1`..`f24` and single characters.
const NAMED_KEYS: &[&str] = &[
    "esc",
    "enter",
    "space",
    "tab",
    "backspace",
    "delete",
    "insert",
    "home",
    "end",
    "pageup",
    "pagedown",
    "up",
    "down",
    "left",
    "right",
    "capslock",
    "printscreen",
    "scrolllock",
    "pause",
    "numlock",
];

/// A validated, canonical key or chord.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    canonical: String,
    single_char: bool,
}

impl KeyCombo {
    /// Parse and normalize a raw combo string.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "empty combo"));
        }

        let tokens: Vec<String> = trimmed
            .split(SEPARATOR)
            .map(|t| canonical_token(&t.trim().to_lowercase()))
            .collect();

        let (key, modifiers) = match tokens.split_last() {
            Some(parts) => parts,
            None => return Err(invalid(raw, "empty combo")),
        };

        let mut seen: Vec<&str> = Vec::with_capacity(modifiers.len());
        for modifier in modifiers {
            if modifier.is_empty() {
                return Err(invalid(raw, "empty key in chord"));
            }
            if !MODIFIERS.contains(&modifier.as_str()) {
                return Err(invalid(raw, &format!("'{}' is not a modifier", modifier)));
            }
            if seen.contains(&modifier.as_str()) {
                return Err(invalid(raw, &format!("modifier '{}' repeated", modifier)));
            }
            seen.push(modifier);
        }

        if key.is_empty() {
            return Err(invalid(raw, "empty key in chord"));
        }
        if MODIFIERS.contains(&key.as_str()) {
            return Err(invalid(raw, "combo has no key besides modifiers"));
        }
        if !is_key(key) {
            return Err(invalid(raw, &format!("unknown key '{}'", key)));
        }

        let mut parts: Vec<&str> = MODIFIERS
            .iter()
            .copied()
            .filter(|m| seen.contains(m))
            .collect();
        parts.push(key.as_str());
        let canonical = parts.join("+");
        let single_char = canonical.chars().count() == 1 && !canonical.contains(SEPARATOR);
        Ok(Self {
            canonical,
            single_char,
        })
    }

    /// The canonical string, e.g. `ctrl+shift+x`.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// True when the combo is a single printable character such as `a`.
    ///
    /// Pressing such a key while a text field has focus types the character,
    /// so a manual send pass erases it with one backspace before each message.
    pub fn is_single_char(&self) -> bool {
        self.single_char
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Normalize a raw combo string to its canonical form.
pub fn normalize(raw: &str) -> Result<String> {
    KeyCombo::parse(raw).map(|c| c.canonical)
}

fn invalid(raw: &str, reason: &str) -> HotmacroError {
    HotmacroError::InvalidCombo {
        combo: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn canonical_token(token: &str) -> String {
    let folded = match token {
        "control" => "ctrl",
        "option" => "alt",
        "command" | "cmd" | "win" | "meta" => "super",
        "escape" => "esc",
        "return" => "enter",
        "del" => "delete",
        "spacebar" => "space",
        other => other,
    };
    folded.to_string()
}

fn is_key(token: &str) -> bool {
    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return !c.is_whitespace() && !c.is_control() && c != SEPARATOR;
    }
    if NAMED_KEYS.contains(&token) {
        return true;
    }
    token
        .strip_prefix('f')
        .and_then(|n| n.parse::<u8>().ok())
        .is_some_and(|n| (1..=24).contains(&n) && !token.starts_with("f0"))
}
