//! Rule-state machine
//!
//! A rule is in exactly one of three phases at any instant:
//!
//! | Phase    | `active` | `paused_until`       |
//! |----------|----------|----------------------|
//! | Active   | true     | absent or `<= now`   |
//! | Paused   | true     | `> now`              |
//! | Disabled | false    | any                  |
//!
//! Pauses expire purely by time comparison, so matching never needs to wake
//! up when a pause ends. A compiled declarative table does go stale then;
//! [`next_transition`] tells its owner when.

use crate::types::Rule;

/// Length of a pause started by a toggle.
pub const PAUSE_DURATION_MS: i64 = 5 * 60 * 1000;

/// Phase of a rule at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RulePhase {
    Active,
    Paused,
    Disabled,
}

/// The activity fields a toggle produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleState {
    pub active: bool,
    pub paused_until: Option<i64>,
}

impl RuleState {
    /// Write this state into a rule.
    pub fn apply_to(self, rule: &mut Rule) {
        rule.active = self.active;
        rule.paused_until = self.paused_until;
    }
}

/// Classify a rule at `now`.
pub fn phase(rule: &Rule, now: i64) -> RulePhase {
    if !rule.active {
        RulePhase::Disabled
    } else if rule.paused_until.is_some_and(|until| until > now) {
        RulePhase::Paused
    } else {
        RulePhase::Active
    }
}

/// Enabled and not inside a pause window.
#[inline]
pub fn is_effectively_active(rule: &Rule, now: i64) -> bool {
    phase(rule, now) == RulePhase::Active
}

/// Effectively active and not inside a manual override window.
#[inline]
pub fn should_rule_apply(rule: &Rule, now: i64) -> bool {
    is_effectively_active(rule, now) && !rule.override_until.is_some_and(|until| until > now)
}

/// Milliseconds left in the current pause, or 0 when not paused.
pub fn remaining_pause_ms(rule: &Rule, now: i64) -> i64 {
    match (phase(rule, now), rule.paused_until) {
        (RulePhase::Paused, Some(until)) => until - now,
        _ => 0,
    }
}

/// State after one toggle at `now`.
///
/// Paused and Disabled rules resume; Active rules pause for
/// [`PAUSE_DURATION_MS`].
pub fn next_state(rule: &Rule, now: i64) -> RuleState {
    match phase(rule, now) {
        RulePhase::Paused | RulePhase::Disabled => RuleState {
            active: true,
            paused_until: None,
        },
        RulePhase::Active => RuleState {
            active: true,
            paused_until: Some(now + PAUSE_DURATION_MS),
        },
    }
}

/// Earliest instant after `now` at which some enabled rule's pause or
/// override window closes, changing whether it applies.
pub fn next_transition(rules: &[Rule], now: i64) -> Option<i64> {
    rules
        .iter()
        .filter(|rule| rule.active)
        .flat_map(|rule| [rule.paused_until, rule.override_until])
        .flatten()
        .filter(|&until| until > now)
        .min()
}

/// Start a manual override window of `duration_ms` at `now`.
pub fn grant_override(rule: &mut Rule, now: i64, duration_ms: i64) {
    rule.override_until = Some(now + duration_ms);
}
