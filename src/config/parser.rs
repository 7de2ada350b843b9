//! Hotkey file parser
//!
//! One binding per line, `modifier[+modifier...]-key: input-source-id`.
//! Blank lines and `#` comments are ignored. Malformed lines are skipped and
//! reported; they never abort the parse.

use crate::hotkey::{Hotkey, Modifier, Modifiers};

/// A successfully parsed binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// 1-based line number
    pub line: usize,
    pub hotkey: Hotkey,
    pub target: String,
}

/// A line that was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub line: usize,
    pub error: LineError,
}

/// Why a line could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    #[error("expected `hotkey: input-source-id`")]
    MissingColon,

    #[error("expected at least one modifier before `-`")]
    MissingModifier,

    #[error("missing key after modifiers")]
    MissingKey,

    #[error("invalid key `{0}`")]
    InvalidKey(String),

    #[error("missing input source id")]
    MissingTarget,

    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
}

/// Result of parsing a whole file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parsed {
    pub bindings: Vec<Binding>,
    pub skipped: Vec<Skipped>,
}

/// Parse every line of `text`
pub fn parse(text: &str) -> Parsed {
    let mut parsed = Parsed::default();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        match parse_line(raw) {
            Ok(None) => {}
            Ok(Some((hotkey, target))) => parsed.bindings.push(Binding { line, hotkey, target }),
            Err(error) => parsed.skipped.push(Skipped { line, error }),
        }
    }

    parsed
}

/// Parse one line; `Ok(None)` for blank lines and comments
pub fn parse_line(raw: &str) -> Result<Option<(Hotkey, String)>, LineError> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (hotkey_part, target) = line.split_once(':').ok_or(LineError::MissingColon)?;
    let target = target.trim();
    if target.is_empty() {
        return Err(LineError::MissingTarget);
    }

    Ok(Some((parse_hotkey(hotkey_part.trim())?, target.to_string())))
}

/// Parse `modifier[+modifier...]-key`
///
/// The first `-` ends the modifier list, so `cmd--` binds the minus key.
/// A bare key with no modifier is rejected.
pub fn parse_hotkey(text: &str) -> Result<Hotkey, LineError> {
    let (modifier_part, key) = text.split_once('-').ok_or(LineError::MissingModifier)?;
    let key = key.trim();
    if key.is_empty() {
        return Err(LineError::MissingKey);
    }
    if key.contains('+') {
        return Err(LineError::InvalidKey(key.to_string()));
    }

    let mut modifiers = Modifiers::empty();
    for token in modifier_part.split('+').map(str::trim).filter(|t| !t.is_empty()) {
        let modifier = Modifier::from_token(token).ok_or_else(|| LineError::UnknownModifier(token.to_string()))?;
        modifiers.insert(modifier);
    }
    if modifiers.is_empty() {
        return Err(LineError::MissingModifier);
    }

    Ok(Hotkey::new(modifiers, key))
}
