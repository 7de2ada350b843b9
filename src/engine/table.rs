//! Hotkey table
//!
//! Maps each configured hotkey to its cycle group. Built once from the
//! parsed configuration and never mutated afterwards.

use std::collections::HashMap;

use crate::hotkey::Hotkey;

/// One switch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    target: String,
    in_cycle: bool,
}

impl Action {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            in_cycle: false,
        }
    }

    /// Input source id to select
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether the action belongs to a group with more than one target
    pub fn in_cycle(&self) -> bool {
        self.in_cycle
    }
}

/// Ordered, non-empty list of actions bound to one hotkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleGroup {
    actions: Vec<Action>,
}

impl CycleGroup {
    fn single(target: String) -> Self {
        Self {
            actions: vec![Action::new(target)],
        }
    }

    fn push(&mut self, target: String) {
        self.actions.push(Action::new(target));
        for action in &mut self.actions {
            action.in_cycle = true;
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_cycle(&self) -> bool {
        self.actions.len() > 1
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

/// Hotkey -> cycle group mapping
#[derive(Debug, Clone, Default)]
pub struct HotkeyTable {
    groups: HashMap<Hotkey, CycleGroup>,
    /// First-seen order, for listing
    order: Vec<Hotkey>,
}

impl HotkeyTable {
    /// Build the table from `(hotkey, target)` pairs in file order
    ///
    /// A hotkey seen again anywhere in the sequence appends its target to
    /// the existing group, turning it into a cycle.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Hotkey, String)>,
    {
        let mut table = Self::default();
        for (hotkey, target) in entries {
            table.insert(hotkey, target);
        }
        table
    }

    fn insert(&mut self, hotkey: Hotkey, target: String) {
        match self.groups.get_mut(&hotkey) {
            Some(group) => group.push(target),
            None => {
                self.order.push(hotkey.clone());
                self.groups.insert(hotkey, CycleGroup::single(target));
            }
        }
    }

    pub fn get(&self, hotkey: &Hotkey) -> Option<&CycleGroup> {
        self.groups.get(hotkey)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Entries in the order their hotkey first appeared
    pub fn iter(&self) -> impl Iterator<Item = (&Hotkey, &CycleGroup)> {
        self.order
            .iter()
            .filter_map(|hotkey| self.groups.get(hotkey).map(|group| (hotkey, group)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{Modifier, Modifiers};

    fn hk(mods: &[Modifier], key: &str) -> Hotkey {
        Hotkey::new(mods.iter().copied().collect::<Modifiers>(), key)
    }

    #[test]
    fn test_single_entries() {
        let table = HotkeyTable::from_entries([
            (hk(&[Modifier::Cmd], "1"), "com.apple.keylayout.US".to_string()),
            (hk(&[Modifier::Cmd], "2"), "com.apple.keylayout.German".to_string()),
        ]);

        assert_eq!(table.len(), 2);
        let group = table.get(&hk(&[Modifier::Cmd], "1")).unwrap();
        assert_eq!(group.len(), 1);
        assert!(!group.is_cycle());
        assert!(!group.actions()[0].in_cycle());
    }

    #[test]
    fn test_repeat_forms_cycle_in_file_order() {
        let key = hk(&[Modifier::Cmd, Modifier::Shift], "space");
        let table = HotkeyTable::from_entries([
            (key.clone(), "A".to_string()),
            (key.clone(), "B".to_string()),
        ]);

        let group = table.get(&key).unwrap();
        let targets: Vec<_> = group.actions().iter().map(Action::target).collect();
        assert_eq!(targets, vec!["A", "B"]);
        assert!(group.actions().iter().all(Action::in_cycle));
    }

    #[test]
    fn test_non_adjacent_repeat_extends_same_group() {
        let cycle = hk(&[Modifier::Ctrl], "space");
        let other = hk(&[Modifier::Cmd], "1");
        let table = HotkeyTable::from_entries([
            (cycle.clone(), "A".to_string()),
            (other.clone(), "X".to_string()),
            (cycle.clone(), "B".to_string()),
        ]);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&cycle).unwrap().len(), 2);
        assert_eq!(table.get(&other).unwrap().len(), 1);

        let order: Vec<_> = table.iter().map(|(h, _)| h.to_string()).collect();
        assert_eq!(order, vec!["ctrl-space", "cmd-1"]);
    }

    #[test]
    fn test_modifier_order_shares_group() {
        let table = HotkeyTable::from_entries([
            (hk(&[Modifier::Cmd, Modifier::Shift], "a"), "A".to_string()),
            (hk(&[Modifier::Shift, Modifier::Cmd], "a"), "B".to_string()),
        ]);
        assert_eq!(table.len(), 1);
        assert!(table.get(&hk(&[Modifier::Shift, Modifier::Cmd], "a")).unwrap().is_cycle());
    }
}
