//! Round-robin position per hotkey

use std::collections::HashMap;

use crate::hotkey::Hotkey;

use super::table::{Action, CycleGroup};

/// Tracks where each cycle group currently stands
///
/// Advance-then-read: the first trigger of a fresh group lands on index 1,
/// index 0 comes back only after a full wrap.
#[derive(Debug, Default)]
pub struct CycleResolver {
    positions: HashMap<Hotkey, usize>,
}

impl CycleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the action for this trigger of `hotkey`, returning it with its index
    pub fn resolve<'a>(&mut self, hotkey: &Hotkey, group: &'a CycleGroup) -> (usize, &'a Action) {
        let len = group.len();
        if len <= 1 {
            return (0, &group.actions()[0]);
        }

        let next = match self.positions.get_mut(hotkey) {
            Some(position) => {
                *position = (*position + 1) % len;
                *position
            }
            None => {
                self.positions.insert(hotkey.clone(), 1);
                1
            }
        };

        (next, &group.actions()[next])
    }

    /// Current index for `hotkey`, if it has been triggered since the last reset
    #[cfg(test)]
    fn position(&self, hotkey: &Hotkey) -> Option<usize> {
        self.positions.get(hotkey).copied()
    }

    /// Reset every group to index 0
    pub fn reset(&mut self) {
        self.positions.clear();
    }
}
