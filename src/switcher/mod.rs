//! Input source switching
//!
//! The directory of OS input sources and the dispatcher that applies
//! resolved hotkeys to it.

mod dispatcher;
#[cfg(target_os = "macos")]
mod macos;
mod source;

pub use dispatcher::{SwitchDispatcher, SwitchRequest};
pub use source::{switchable, InputSourceDirectory};

/// The input source directory for the current platform
#[cfg(target_os = "macos")]
pub fn system_directory() -> macos::TisDirectory {
    macos::TisDirectory::new()
}

/// The input source directory for the current platform
#[cfg(not(target_os = "macos"))]
pub fn system_directory() -> source::UnsupportedDirectory {
    source::UnsupportedDirectory
}
