//! Change Analyzer
//!
//! Finds rules that became effectively active between two observations of
//! the rule set, so already-open tabs can be redirected without a reload.

use std::collections::HashMap;

use crate::state::is_effectively_active;
use crate::types::Rule;

/// A rule list together with the instant it was observed.
#[derive(Debug, Clone, Copy)]
pub struct RuleSnapshot<'a> {
    pub rules: &'a [Rule],
    pub taken_at: i64,
}

impl<'a> RuleSnapshot<'a> {
    pub fn new(rules: &'a [Rule], taken_at: i64) -> Self {
        Self { rules, taken_at }
    }
}

/// Rules effectively active in `new` that were not effectively active (or
/// did not exist) in `old`.
///
/// Covers newly created rules, resumed rules and pauses that lapsed between
/// the two observations. Count or label edits never show up here.
pub fn activated_rules(old: RuleSnapshot<'_>, new: RuleSnapshot<'_>) -> Vec<Rule> {
    let before: HashMap<i64, &Rule> = old.rules.iter().map(|rule| (rule.id, rule)).collect();

    new.rules
        .iter()
        .filter(|rule| is_effectively_active(rule, new.taken_at))
        .filter(|rule| match before.get(&rule.id) {
            Some(previous) => !is_effectively_active(previous, old.taken_at),
            None => true,
        })
        .cloned()
        .collect()
}

/// [`activated_rules`] with both lists observed at the same instant.
pub fn activated_rules_at(old: &[Rule], new: &[Rule], now: i64) -> Vec<Rule> {
    activated_rules(RuleSnapshot::new(old, now), RuleSnapshot::new(new, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_list_reports_nothing() {
        let mut paused = Rule::new(2, "c.com", "d.com");
        paused.paused_until = Some(50);
        let rules = vec![Rule::new(1, "a.com", "b.com"), paused];
        assert!(activated_rules_at(&rules, &rules, 10).is_empty());
    }

    #[test]
    fn test_new_rule_reported() {
        let old = vec![Rule::new(1, "a.com", "b.com")];
        let mut new = old.clone();
        new.push(Rule::new(2, "c.com", "d.com"));
        let activated = activated_rules_at(&old, &new, 0);
        assert_eq!(activated.len(), 1);
        assert_eq!(activated[0].id, 2);
    }

    #[test]
    fn test_new_inactive_rule_not_reported() {
        let mut rule = Rule::new(2, "c.com", "d.com");
        rule.active = false;
        assert!(activated_rules_at(&[], &[rule], 0).is_empty());
    }

    #[test]
    fn test_resumed_rule_reported() {
        let mut paused = Rule::new(1, "a.com", "b.com");
        paused.paused_until = Some(10_000);
        let resumed = Rule::new(1, "a.com", "b.com");
        let activated = activated_rules_at(&[paused], &[resumed], 5_000);
        assert_eq!(activated.len(), 1);
    }

    #[test]
    fn test_enabled_rule_reported() {
        let mut disabled = Rule::new(1, "a.com", "b.com");
        disabled.active = false;
        let enabled = Rule::new(1, "a.com", "b.com");
        assert_eq!(activated_rules_at(&[disabled], &[enabled], 0).len(), 1);
    }

    #[test]
    fn test_lapsed_pause_reported() {
        let mut rule = Rule::new(1, "a.com", "b.com");
        rule.paused_until = Some(1_000);
        let rules = vec![rule];
        let activated = activated_rules(RuleSnapshot::new(&rules, 500), RuleSnapshot::new(&rules, 1_500));
        assert_eq!(activated.len(), 1);
    }

    #[test]
    fn test_count_change_not_reported() {
        let old = vec![Rule::new(1, "a.com", "b.com")];
        let mut new = old.clone();
        new[0].count = 9;
        new[0].last_count_message = Some("9 redirects".to_string());
        assert!(activated_rules_at(&old, &new, 0).is_empty());
    }

    #[test]
    fn test_paused_rule_not_reported() {
        let old = vec![Rule::new(1, "a.com", "b.com")];
        let mut new = old.clone();
        new[0].paused_until = Some(100);
        assert!(activated_rules_at(&old, &new, 0).is_empty());
    }
}
