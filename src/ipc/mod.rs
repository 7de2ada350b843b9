//! IPC module for daemon-CLI communication

mod client;
mod protocol;
mod server;

pub use client::Client;
pub use protocol::{DaemonStatus, Notification, Request, Response};
pub use server::{EngineControl, Server};
