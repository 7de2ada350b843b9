//! Hotkey resolution engine
//!
//! Table of configured hotkeys, round-robin cycle positions and the
//! debounce/match decision made for every key-down.

mod cycle;
mod intake;
mod matcher;
mod table;

pub use intake::{EngineHandle, KeyIntake};
pub use matcher::MatchEngine;
pub use table::HotkeyTable;
