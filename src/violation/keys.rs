//! Blocked-key table.
//!
//! Keys are compared in a canonical textual form: modifiers in the fixed order
//! `Ctrl`, `Alt`, `Shift`, `Meta`, joined with `+`, followed by the key name
//! (`F12`, `Escape`, `I`). A key event matches when either its bare name or
//! its full chord is in the table.

use std::collections::BTreeSet;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, ModifierKeyCode};

use crate::{ProctorError, Result};

pub const DEFAULT_BLOCKED_KEYS: [&str; 10] = [
    "F11",
    "F12",
    "Escape",
    "PrintScreen",
    "Insert",
    "Delete",
    "Meta",
    "Ctrl+Shift+I",
    "Ctrl+Shift+J",
    "Ctrl+U",
];

const MODIFIER_ORDER: [&str; 4] = ["Ctrl", "Alt", "Shift", "Meta"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedKeys {
    entries: BTreeSet<String>,
}

impl Default for BlockedKeys {
    fn default() -> Self {
        Self::from_chords(DEFAULT_BLOCKED_KEYS)
    }
}

impl BlockedKeys {
    pub fn from_chords<I, S>(chords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = chords
            .into_iter()
            .filter_map(|chord| normalize_chord(chord.as_ref()))
            .collect();
        Self { entries }
    }

    /// Like [`from_chords`](Self::from_chords) but rejects chords that do not
    /// normalize, such as `"+"` or `"Hyper+X"`.
    pub fn try_from_chords<I, S>(chords: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = chords
            .into_iter()
            .map(|chord| {
                let chord = chord.as_ref();
                normalize_chord(chord).ok_or_else(|| {
                    ProctorError::Config(format!("blocked key `{chord}` is not a valid chord"))
                })
            })
            .collect::<Result<BTreeSet<String>>>()?;
        Ok(Self { entries })
    }

    pub fn contains(&self, chord: &str) -> bool {
        normalize_chord(chord)
            .map(|c| self.entries.contains(&c))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Returns the table entry hit by this key-down, if any. Releases never match.
    pub fn match_event(&self, key: &KeyEvent) -> Option<String> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let bare = key_name(key.code);
        if self.entries.contains(&bare) {
            return Some(bare);
        }
        let chord = chord_string(key);
        self.entries.contains(&chord).then_some(chord)
    }
}

/// Canonical name of a key without modifiers.
pub fn key_name(code: KeyCode) -> String {
    match code {
        KeyCode::F(n) => format!("F{n}"),
        KeyCode::Esc => "Escape".to_string(),
        KeyCode::PrintScreen => "PrintScreen".to_string(),
        KeyCode::Insert => "Insert".to_string(),
        KeyCode::Delete => "Delete".to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Tab | KeyCode::BackTab => "Tab".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(ch) => ch.to_uppercase().collect(),
        KeyCode::Modifier(modifier) => modifier_name(modifier).to_string(),
        other => format!("{other:?}"),
    }
}

fn modifier_name(modifier: ModifierKeyCode) -> &'static str {
    match modifier {
        ModifierKeyCode::LeftControl | ModifierKeyCode::RightControl => "Ctrl",
        ModifierKeyCode::LeftAlt | ModifierKeyCode::RightAlt => "Alt",
        ModifierKeyCode::LeftShift | ModifierKeyCode::RightShift => "Shift",
        ModifierKeyCode::LeftMeta
        | ModifierKeyCode::RightMeta
        | ModifierKeyCode::LeftSuper
        | ModifierKeyCode::RightSuper => "Meta",
        _ => "Modifier",
    }
}

/// Full chord for a key event, e.g. `Ctrl+Shift+I`.
pub fn chord_string(key: &KeyEvent) -> String {
    let mut parts: Vec<String> = Vec::new();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        parts.push("Ctrl".into());
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        parts.push("Alt".into());
    }
    if key.modifiers.contains(KeyModifiers::SHIFT) {
        parts.push("Shift".into());
    }
    if key.modifiers.intersects(KeyModifiers::META | KeyModifiers::SUPER) {
        parts.push("Meta".into());
    }
    let name = key_name(key.code);
    if !parts.iter().any(|p| *p == name) {
        parts.push(name);
    }
    parts.join("+")
}

/// Bring a user-written chord such as `ctrl+shift+i` or `esc` into canonical form.
pub fn normalize_chord(raw: &str) -> Option<String> {
    let tokens: Vec<&str> = raw
        .split('+')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    let (last, mods) = tokens.split_last()?;

    let mut modifiers: Vec<&'static str> = Vec::new();
    for token in mods {
        let name = canonical_modifier(token)?;
        if !modifiers.contains(&name) {
            modifiers.push(name);
        }
    }

    let key = match canonical_modifier(last) {
        Some(modifier) if modifiers.is_empty() => modifier.to_string(),
        Some(modifier) => {
            if !modifiers.contains(&modifier) {
                modifiers.push(modifier);
            }
            modifiers.pop().map(str::to_string)?
        }
        None => canonical_key(last),
    };

    modifiers.sort_by_key(|m| MODIFIER_ORDER.iter().position(|o| o == m));
    let mut parts: Vec<String> = modifiers.into_iter().map(str::to_string).collect();
    parts.push(key);
    Some(parts.join("+"))
}

fn canonical_modifier(token: &str) -> Option<&'static str> {
    match token.to_ascii_lowercase().as_str() {
        "ctrl" | "control" => Some("Ctrl"),
        "alt" | "option" => Some("Alt"),
        "shift" => Some("Shift"),
        "meta" | "cmd" | "command" | "super" | "os" | "win" => Some("Meta"),
        _ => None,
    }
}

fn canonical_key(token: &str) -> String {
    let lower = token.to_ascii_lowercase();
    match lower.as_str() {
        "esc" | "escape" => "Escape".to_string(),
        "printscreen" | "prtsc" | "print" => "PrintScreen".to_string(),
        "ins" | "insert" => "Insert".to_string(),
        "del" | "delete" => "Delete".to_string(),
        "enter" | "return" => "Enter".to_string(),
        "tab" => "Tab".to_string(),
        "backspace" => "Backspace".to_string(),
        "space" | " " => "Space".to_string(),
        f if f.len() > 1 && f.starts_with('f') && f[1..].chars().all(|c| c.is_ascii_digit()) => {
            format!("F{}", &f[1..])
        }
        _ if token.chars().count() == 1 => token.to_uppercase(),
        _ => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn bare_keys_match() {
        let keys = BlockedKeys::default();
        assert_eq!(
            keys.match_event(&press(KeyCode::F(12), KeyModifiers::NONE)),
            Some("F12".to_string())
        );
        assert_eq!(
            keys.match_event(&press(KeyCode::Esc, KeyModifiers::NONE)),
            Some("Escape".to_string())
        );
        assert!(
            keys.match_event(&press(
                KeyCode::Modifier(ModifierKeyCode::LeftSuper),
                KeyModifiers::SUPER
            ))
            .is_some()
        );
    }

    #[test]
    fn bare_key_matches_even_with_modifiers() {
        let keys = BlockedKeys::default();
        assert_eq!(
            keys.match_event(&press(KeyCode::Delete, KeyModifiers::CONTROL)),
            Some("Delete".to_string())
        );
    }

    #[test]
    fn devtools_combos_match_in_either_case() {
        let keys = BlockedKeys::default();
        let upper = press(
            KeyCode::Char('I'),
            KeyModifiers::CONTROL | KeyModifiers::SHIFT,
        );
        let lower = press(
            KeyCode::Char('j'),
            KeyModifiers::CONTROL | KeyModifiers::SHIFT,
        );
        assert_eq!(keys.match_event(&upper), Some("Ctrl+Shift+I".to_string()));
        assert_eq!(keys.match_event(&lower), Some("Ctrl+Shift+J".to_string()));
        assert_eq!(
            keys.match_event(&press(KeyCode::Char('u'), KeyModifiers::CONTROL)),
            Some("Ctrl+U".to_string())
        );
    }

    #[test]
    fn ordinary_typing_passes() {
        let keys = BlockedKeys::default();
        assert!(
            keys.match_event(&press(KeyCode::Char('i'), KeyModifiers::NONE))
                .is_none()
        );
        assert!(
            keys.match_event(&press(KeyCode::Char('i'), KeyModifiers::CONTROL))
                .is_none()
        );
        assert!(
            keys.match_event(&press(KeyCode::Enter, KeyModifiers::NONE))
                .is_none()
        );
    }

    #[test]
    fn releases_never_match() {
        let keys = BlockedKeys::default();
        let mut event = press(KeyCode::F(11), KeyModifiers::NONE);
        event.kind = KeyEventKind::Release;
        assert!(keys.match_event(&event).is_none());
    }

    #[test]
    fn normalization_orders_modifiers() {
        assert_eq!(
            normalize_chord("shift + ctrl + i").as_deref(),
            Some("Ctrl+Shift+I")
        );
        assert_eq!(normalize_chord("esc").as_deref(), Some("Escape"));
        assert_eq!(normalize_chord("cmd").as_deref(), Some("Meta"));
        assert_eq!(normalize_chord("f5").as_deref(), Some("F5"));
        assert_eq!(normalize_chord("").as_deref(), None);
        assert_eq!(normalize_chord("hyper+x"), None);
    }

    #[test]
    fn chord_string_composes_modifiers() {
        let event = press(KeyCode::Char('c'), KeyModifiers::CONTROL | KeyModifiers::ALT);
        assert_eq!(chord_string(&event), "Ctrl+Alt+C");
        let meta = press(
            KeyCode::Modifier(ModifierKeyCode::LeftMeta),
            KeyModifiers::META,
        );
        assert_eq!(chord_string(&meta), "Meta");
    }

    #[test]
    fn custom_table_replaces_defaults() {
        let keys = BlockedKeys::from_chords(["ctrl+c", "ctrl+v"]);
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("Ctrl+C"));
        assert!(!keys.contains("F12"));
    }

    #[test]
    fn strict_table_rejects_malformed_chords() {
        let keys = BlockedKeys::try_from_chords(["shift+ctrl+i", "F12"]).unwrap();
        assert!(keys.contains("Ctrl+Shift+I"));
        assert_eq!(keys.len(), 2);

        for bad in ["+", "", "Hyper+X"] {
            match BlockedKeys::try_from_chords(["F12", bad]) {
                Err(ProctorError::Config(message)) => assert!(message.contains(bad), "{message}"),
                other => panic!("expected config error for {bad:?}, got {other:?}"),
            }
        }
    }
}
