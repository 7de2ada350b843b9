//! launchd service management

mod launchd;
mod plist;

pub use launchd::ServiceManager;
