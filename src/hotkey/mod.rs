//! Hotkey module for global keyboard event interception
//!
//! Uses a macOS CGEventTap to see every key-down on the system and turns
//! each one into a canonical [`Hotkey`].

mod keys;
mod listener;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(test)]
pub use keys::flags;
pub use keys::{canonicalize, Hotkey, Modifier, Modifiers};
pub use listener::{system_tap, EventMonitor, KeyHandler, MonitorError, RawKeyEvent};
