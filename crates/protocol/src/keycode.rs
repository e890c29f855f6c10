//! Command name → key code lookup (Android `KEYCODE_*` values).

use std::fmt;

/// Resolved key code handed to the command executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCode {
    Code(u16),
    /// Unknown command name, passed through unchanged.
    Raw(String),
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCode::Code(code) => write!(f, "{code}"),
            KeyCode::Raw(raw) => f.write_str(raw),
        }
    }
}

const KEY_CODES: &[(&str, u16)] = &[
    ("home", 3),
    ("back", 4),
    ("up", 19),
    ("down", 20),
    ("left", 21),
    ("right", 22),
    ("enter", 23),
    ("ok", 23),
    ("volume_up", 24),
    ("volume_down", 25),
    ("power", 26),
    ("menu", 82),
    ("play_pause", 85),
    ("stop", 86),
    ("next", 87),
    ("previous", 88),
    ("rewind", 89),
    ("fast_forward", 90),
    ("play", 126),
    ("pause", 127),
    ("mute", 164),
    ("channel_up", 166),
    ("channel_down", 167),
    ("settings", 176),
    ("input", 178),
    ("sleep", 223),
    ("wakeup", 224),
];

/// Look up `command` (case-insensitive).  Numeric strings become codes
/// directly; anything else unknown passes through as [`KeyCode::Raw`].
pub fn resolve_key_code(command: &str) -> KeyCode {
    let normalized = command.trim().to_ascii_lowercase();
    if let Some((_, code)) = KEY_CODES.iter().find(|(name, _)| *name == normalized) {
        return KeyCode::Code(*code);
    }
    match normalized.parse::<u16>() {
        Ok(code) => KeyCode::Code(code),
        Err(_) => KeyCode::Raw(command.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_is_223() {
        assert_eq!(resolve_key_code("sleep"), KeyCode::Code(223));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(resolve_key_code("POWER"), KeyCode::Code(26));
        assert_eq!(resolve_key_code("Volume_Up"), KeyCode::Code(24));
    }

    #[test]
    fn numeric_passes_as_code() {
        assert_eq!(resolve_key_code("66"), KeyCode::Code(66));
    }

    #[test]
    fn unknown_passes_through_unchanged() {
        assert_eq!(
            resolve_key_code("Launch-Netflix"),
            KeyCode::Raw("Launch-Netflix".into())
        );
    }

    #[test]
    fn display() {
        assert_eq!(KeyCode::Code(223).to_string(), "223");
        assert_eq!(KeyCode::Raw("x".into()).to_string(), "x");
    }
}
