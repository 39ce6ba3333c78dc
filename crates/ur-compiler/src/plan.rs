//! Declarative table update plans
//!
//! The browser's dynamic rule table is replaced through one
//! `updateDynamicRules({removeRuleIds, addRules})` call. Removals are
//! applied before additions, so an ID may appear in both lists.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::dnr::DnrRule;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrUpdate {
    pub remove_rule_ids: Vec<i32>,
    pub add_rules: Vec<DnrRule>,
}

impl DnrUpdate {
    /// Drop every installed ID and install `compiled` from scratch.
    pub fn replace_all(installed_ids: &[i32], compiled: Vec<DnrRule>) -> Self {
        let remove: BTreeSet<i32> = installed_ids.iter().copied().collect();
        Self {
            remove_rule_ids: remove.into_iter().collect(),
            add_rules: compiled,
        }
    }

    /// Minimal update turning `installed` into `compiled`.
    ///
    /// Unchanged descriptors are left alone; changed ones are removed and
    /// re-added under the same ID.
    pub fn diff(installed: &[DnrRule], compiled: &[DnrRule]) -> Self {
        let current: HashMap<i32, &DnrRule> = installed.iter().map(|rule| (rule.id, rule)).collect();
        let next: HashMap<i32, &DnrRule> = compiled.iter().map(|rule| (rule.id, rule)).collect();

        let mut remove: BTreeSet<i32> = BTreeSet::new();
        for (id, rule) in &current {
            match next.get(id) {
                Some(new_rule) if *new_rule == *rule => {}
                _ => {
                    remove.insert(*id);
                }
            }
        }

        let add_rules = compiled
            .iter()
            .filter(|rule| current.get(&rule.id).map_or(true, |old| *old != *rule))
            .cloned()
            .collect();

        Self {
            remove_rule_ids: remove.into_iter().collect(),
            add_rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remove_rule_ids.is_empty() && self.add_rules.is_empty()
    }
}
