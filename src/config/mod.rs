//! Configuration loading and management

mod parser;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::engine::HotkeyTable;

pub use parser::parse;

/// Configuration errors
///
/// A file with no usable lines is not an error; it yields an empty table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("HOME is not set")]
    NoHome,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// User home directory
    pub home: PathBuf,

    /// Hotkey binding file
    pub hotkeys_path: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Log file used when running as a service
    pub log_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    ///
    /// `hotkeys_path` overrides the default `~/.config/puck/puckrc`.
    pub fn load(hotkeys_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(Self::with_home(Path::new(&home), hotkeys_path))
    }

    fn with_home(home: &Path, hotkeys_path: Option<PathBuf>) -> Self {
        let data_dir = home.join(".local").join("share").join("puck");
        let hotkeys_path =
            hotkeys_path.unwrap_or_else(|| home.join(".config").join("puck").join("puckrc"));

        Self {
            home: home.to_owned(),
            hotkeys_path,
            socket_path: data_dir.join("daemon.sock"),
            log_path: data_dir.join("puck.log"),
            data_dir,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }

    /// Read and parse the hotkey file into a table
    ///
    /// Malformed lines are logged and skipped.
    pub fn load_table(&self) -> Result<HotkeyTable, ConfigError> {
        let text = self.read_hotkeys()?;
        Ok(build_table(&text, &self.hotkeys_path))
    }

    /// Raw contents of the hotkey file
    pub fn read_hotkeys(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.hotkeys_path).map_err(|source| ConfigError::Read {
            path: self.hotkeys_path.clone(),
            source,
        })
    }
}

/// Build a hotkey table from file contents, warning about skipped lines
pub fn build_table(text: &str, origin: &Path) -> HotkeyTable {
    let parsed = parse(text);
    for skipped in &parsed.skipped {
        warn!(
            file = %origin.display(),
            line = skipped.line,
            error = %skipped.error,
            "skipping malformed hotkey line"
        );
    }
    HotkeyTable::from_entries(parsed.bindings.into_iter().map(|b| {
        debug!(line = b.line, hotkey = %b.hotkey, target = %b.target, "binding");
        (b.hotkey, b.target)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = Config::with_home(Path::new("/Users/me"), None);
        assert_eq!(config.hotkeys_path, PathBuf::from("/Users/me/.config/puck/puckrc"));
        assert_eq!(config.socket_path, PathBuf::from("/Users/me/.local/share/puck/daemon.sock"));
        assert_eq!(config.log_path, PathBuf::from("/Users/me/.local/share/puck/puck.log"));
    }

    #[test]
    fn test_hotkeys_override() {
        let config = Config::with_home(Path::new("/Users/me"), Some(PathBuf::from("/tmp/rc")));
        assert_eq!(config.hotkeys_path, PathBuf::from("/tmp/rc"));
    }

    #[test]
    fn test_build_table_groups_cycles() {
        let table = build_table(
            "cmd+shift-space: A\nbogus\ncmd+shift-space: B\ncmd-1: C\n",
            Path::new("puckrc"),
        );
        assert_eq!(table.len(), 2);
        let (first, group) = table.iter().next().unwrap();
        assert_eq!(first.to_string(), "shift+cmd-space");
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_load_table_missing_file() {
        let config = Config::with_home(Path::new("/nonexistent-home"), None);
        assert!(matches!(config.load_table(), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_table_from_disk() {
        let path = std::env::temp_dir().join(format!("puck-test-{}.rc", std::process::id()));
        std::fs::write(&path, "ctrl-space: A\nctrl-space: B\n").unwrap();

        let config = Config::with_home(Path::new("/unused"), Some(path.clone()));
        let table = config.load_table().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.iter().next().unwrap().1.is_cycle());
    }
}
