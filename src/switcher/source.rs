//! Input source directory abstraction

use serde::{Deserialize, Serialize};

const KEYLAYOUT_PREFIX: &str = "com.apple.keylayout.";
const INPUTMETHOD_PREFIX: &str = "com.apple.inputmethod.";

/// A keyboard layout or input method registered with the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSource {
    pub id: String,
    pub name: String,
    pub selectable: bool,
}

impl InputSource {
    /// Selectable keyboard layouts and input methods with a well-formed id
    pub fn is_switchable(&self) -> bool {
        if !self.selectable {
            return false;
        }
        [KEYLAYOUT_PREFIX, INPUTMETHOD_PREFIX]
            .iter()
            .any(|prefix| self.id.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()))
    }
}

/// Errors from the input source directory
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("unknown input source: {0}")]
    UnknownSource(String),

    #[error("input source {id} rejected by the system (status {status})")]
    Rejected { id: String, status: i32 },

    #[error("input source list unavailable")]
    ListUnavailable,

    #[error("input source switching is not supported on this platform")]
    Unsupported,
}

/// The OS text-input source registry
pub trait InputSourceDirectory: Send + Sync + 'static {
    /// Every enabled input source
    fn list(&self) -> Result<Vec<InputSource>, SwitchError>;

    /// Id of the active keyboard input source
    fn current_id(&self) -> Option<String>;

    /// Make `id` the active input source
    fn select(&self, id: &str) -> Result<(), SwitchError>;
}

/// Only the switchable entries of `sources`, in their original order
pub fn switchable(sources: Vec<InputSource>) -> Vec<InputSource> {
    sources.into_iter().filter(InputSource::is_switchable).collect()
}

/// Directory used where the OS offers no input source API
pub struct UnsupportedDirectory;

impl InputSourceDirectory for UnsupportedDirectory {
    fn list(&self) -> Result<Vec<InputSource>, SwitchError> {
        Err(SwitchError::Unsupported)
    }

    fn current_id(&self) -> Option<String> {
        None
    }

    fn select(&self, _id: &str) -> Result<(), SwitchError> {
        Err(SwitchError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str, selectable: bool) -> InputSource {
        InputSource {
            id: id.to_string(),
            name: id.to_string(),
            selectable,
        }
    }

    #[test]
    fn test_switchable_filter() {
        let sources = vec![
            source("com.apple.keylayout.US", true),
            source("com.apple.inputmethod.Kotoeri.RomajiTyping.Japanese", true),
            source("com.apple.keylayout.German", false),
            source("com.apple.keylayout.", true),
            source("com.apple.CharacterPaletteIM", true),
            source("com.apple.PressAndHold", true),
        ];

        let ids: Vec<_> = switchable(sources).into_iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                "com.apple.keylayout.US",
                "com.apple.inputmethod.Kotoeri.RomajiTyping.Japanese"
            ]
        );
    }
}
