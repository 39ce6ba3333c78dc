//! Rule Matcher
//!
//! Runs on every main-frame navigation. A rule matches when the normalized
//! URL starts with the normalized source, so every sub-page of a source is
//! redirected too. Only the first applicable rule in list order is used.

use crate::antidote::ShufflePicker;
use crate::state::should_rule_apply;
use crate::types::Rule;
use crate::url::{normalize, with_default_scheme};

/// A rule that fired for a URL, with its resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectMatch<'a> {
    pub rule: &'a Rule,
    pub target: String,
}

/// Resolve a rule's effective target URL.
///
/// Shuffle rules ask the picker; fixed targets default to `https://`.
pub fn resolve_target(rule: &Rule, picker: &mut dyn ShufflePicker) -> String {
    if rule.is_shuffle() {
        with_default_scheme(&picker.pick(&rule.source))
    } else {
        with_default_scheme(rule.target.trim())
    }
}

/// Whether `url` already is (or contains) the target, i.e. it is the result
/// of an earlier redirect by this rule.
#[inline]
pub fn already_at_target(normalized_url: &str, target: &str) -> bool {
    let target = normalize(target);
    !target.is_empty() && normalized_url.contains(target.as_str())
}

/// Match a single rule against a URL and return the resolved target.
///
/// Does not look at the rule's activity state; see [`find_redirect`].
pub fn match_target(url: &str, rule: &Rule, picker: &mut dyn ShufflePicker) -> Option<String> {
    let normalized_url = normalize(url);
    let source = rule.normalized_source();
    if source.is_empty() || !normalized_url.starts_with(source.as_str()) {
        return None;
    }

    let target = resolve_target(rule, picker);
    if already_at_target(&normalized_url, &target) {
        log::debug!("rule {} skipped: {} already contains {}", rule.id, url, target);
        return None;
    }

    Some(target)
}

/// First rule that applies at `now` and matches `url`.
pub fn find_redirect<'a>(
    url: &str,
    rules: &'a [Rule],
    now: i64,
    picker: &mut dyn ShufflePicker,
) -> Option<RedirectMatch<'a>> {
    rules
        .iter()
        .filter(|rule| should_rule_apply(rule, now))
        .find_map(|rule| match_target(url, rule, &mut *picker).map(|target| RedirectMatch { rule, target }))
}
