//! Process lifecycle: shutdown signals and the launchd service

mod shutdown;
pub mod service;

pub use shutdown::ShutdownSignal;
