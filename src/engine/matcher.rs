//! Debounce and match engine
//!
//! One synchronous decision per key event: suppress chatter, pass through
//! unconfigured hotkeys, or resolve the next action of a configured one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::hotkey::Hotkey;

use super::cycle::CycleResolver;
use super::table::{Action, HotkeyTable};

/// Repeated triggers of one hotkey inside this window collapse into one
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

/// An action chosen for dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub hotkey: Hotkey,
    pub action: Action,
    /// Position of the action within its group
    pub index: usize,
    /// Size of the group the action came from
    pub group_len: usize,
}

/// Outcome of matching one key event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Not a configured hotkey, let the keystroke through
    PassThrough,
    /// Duplicate inside the debounce window; swallowed, nothing dispatched
    Suppressed,
    /// Swallow the keystroke and switch to the resolved action
    Dispatch(Resolved),
}

impl Decision {
    /// Whether the keystroke should be swallowed
    pub fn handled(&self) -> bool {
        !matches!(self, Decision::PassThrough)
    }
}

/// Owns the hotkey table plus the debounce and cycle state
pub struct MatchEngine {
    table: HotkeyTable,
    cycles: CycleResolver,
    last_fired: HashMap<Hotkey, Instant>,
    window: Duration,
}

impl MatchEngine {
    pub fn new(table: HotkeyTable) -> Self {
        Self::with_window(table, DEBOUNCE_WINDOW)
    }

    pub fn with_window(table: HotkeyTable, window: Duration) -> Self {
        Self {
            table,
            cycles: CycleResolver::new(),
            last_fired: HashMap::new(),
            window,
        }
    }

    /// Decide what to do with `hotkey` pressed at `now`
    pub fn handle(&mut self, hotkey: &Hotkey, now: Instant) -> Decision {
        if let Some(last) = self.last_fired.get(hotkey) {
            if now.saturating_duration_since(*last) < self.window {
                debug!(%hotkey, "duplicate trigger suppressed");
                return Decision::Suppressed;
            }
        }

        let Some(group) = self.table.get(hotkey) else {
            trace!(%hotkey, "not a configured hotkey");
            return Decision::PassThrough;
        };

        let (index, action) = self.cycles.resolve(hotkey, group);
        let resolved = Resolved {
            hotkey: hotkey.clone(),
            action: action.clone(),
            index,
            group_len: group.len(),
        };

        self.last_fired.insert(hotkey.clone(), now);

        if resolved.group_len > 1 {
            debug!(
                %hotkey,
                index,
                len = resolved.group_len,
                target = resolved.action.target(),
                "cycle advanced"
            );
        }

        Decision::Dispatch(resolved)
    }

    /// Replace the table and forget all cycle and debounce state
    pub fn reload(&mut self, table: HotkeyTable) {
        self.table = table;
        self.clear();
    }

    /// Reset cycle positions and debounce timestamps
    pub fn clear(&mut self) {
        self.cycles.reset();
        self.last_fired.clear();
    }

    pub fn table(&self) -> &HotkeyTable {
        &self.table
    }
}
