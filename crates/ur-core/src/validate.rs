//! Admission checks for new and edited rules
//!
//! Checks run in a fixed order so the first failure is the one reported:
//! URL shape, identical source/target, duplicate source, redirect loop.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RuleError;
use crate::loops::detect_loop;
use crate::types::{is_shuffle_target, Rule};
use crate::url::normalize;

/// Optional http(s) scheme, dotted host with an alphabetic TLD, optional
/// port, optional path/query/fragment.
static URL_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^
        (?:https?://)?
        (?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+
        [a-z]{2,63}
        (?::\d{1,5})?
        (?:[/?\#]\S*)?
        $
    ",
    )
    .expect("URL_LIKE regex is valid")
});

/// Whether a string looks like a URL or bare domain.
pub fn is_url_like(value: &str) -> bool {
    URL_LIKE.is_match(value.trim())
}

fn check_shape(source: &str, target: &str) -> Result<(), RuleError> {
    if !is_url_like(source) {
        return Err(RuleError::InvalidUrl {
            field: "source",
            value: source.to_string(),
        });
    }
    if !is_shuffle_target(target) && !is_url_like(target) {
        return Err(RuleError::InvalidUrl {
            field: "target",
            value: target.to_string(),
        });
    }
    if normalize(source.trim()) == normalize(target.trim()) {
        return Err(RuleError::SameSourceAndTarget);
    }
    Ok(())
}

fn check_against<'a>(
    source: &str,
    target: &str,
    others: impl Iterator<Item = &'a Rule> + Clone,
) -> Result<(), RuleError> {
    let normalized = normalize(source.trim());
    if others.clone().any(|rule| rule.normalized_source() == normalized) {
        return Err(RuleError::DuplicateSource(normalized));
    }

    let others: Vec<Rule> = others.cloned().collect();
    if detect_loop(source, target, &others) {
        return Err(RuleError::LoopDetected {
            from: normalized,
            to: normalize(target.trim()),
        });
    }
    Ok(())
}

/// Validate a rule about to be appended to `existing`.
pub fn validate_new_rule(source: &str, target: &str, existing: &[Rule]) -> Result<(), RuleError> {
    check_shape(source, target)?;
    check_against(source, target, existing.iter())
}

/// Validate an edited rule against every other rule in `existing`.
///
/// The stored copy with the same id is ignored, so a rule never conflicts
/// with its own previous version.
pub fn validate_rule_update(rule: &Rule, existing: &[Rule]) -> Result<(), RuleError> {
    check_shape(&rule.source, &rule.target)?;
    check_against(
        &rule.source,
        &rule.target,
        existing.iter().filter(|other| other.id != rule.id),
    )
}
