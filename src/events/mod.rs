//! Daemon events
//!
//! Structured notifications for tap lifecycle, cycle progress and switch
//! results. Broadcast to IPC subscribers and folded into the status snapshot.

use serde::{Deserialize, Serialize};

/// Events emitted while the daemon runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// Key interception installed
    TapInstalled,

    /// Key interception removed
    TapStopped,

    /// The system disabled the tap and it was turned back on
    TapReenabled {
        reason: String,
    },

    /// Accessibility permission is missing, no keys are intercepted
    PermissionDenied,

    /// A multi-target hotkey moved to its next target
    CycleAdvanced {
        hotkey: String,
        index: usize,
        len: usize,
        target: String,
    },

    /// Input source switched
    SwitchSucceeded {
        hotkey: String,
        target: String,
    },

    /// Input source switch failed; cycle and debounce state are kept
    SwitchFailed {
        hotkey: String,
        target: String,
        reason: String,
    },

    /// A new hotkey table replaced the old one
    ConfigReloaded {
        hotkeys: usize,
    },
}

impl std::fmt::Display for DaemonEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonEvent::TapInstalled => write!(f, "TAP_INSTALLED"),
            DaemonEvent::TapStopped => write!(f, "TAP_STOPPED"),
            DaemonEvent::TapReenabled { reason } => write!(f, "TAP_REENABLED ({})", reason),
            DaemonEvent::PermissionDenied => write!(f, "PERMISSION_DENIED"),
            DaemonEvent::CycleAdvanced { hotkey, index, len, target } => {
                write!(f, "CYCLE_ADVANCED {} -> {} [{}/{}]", hotkey, target, index + 1, len)
            }
            DaemonEvent::SwitchSucceeded { hotkey, target } => {
                write!(f, "SWITCH_SUCCEEDED {} -> {}", hotkey, target)
            }
            DaemonEvent::SwitchFailed { hotkey, target, reason } => {
                write!(f, "SWITCH_FAILED {} -> {}: {}", hotkey, target, reason)
            }
            DaemonEvent::ConfigReloaded { hotkeys } => {
                write!(f, "CONFIG_RELOADED ({} hotkeys)", hotkeys)
            }
        }
    }
}
