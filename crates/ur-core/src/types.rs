//! Core type definitions for URL Redirector
//!
//! `Rule` is serialized with the camelCase field names the extension's
//! JavaScript uses, so the same JSON flows between the options page, the
//! storage layer and these crates.

use serde::{Deserialize, Serialize};

use crate::url::normalize;

/// Target sentinel meaning "pick a productive site at match/compile time".
pub const SHUFFLE_TARGET: &str = ":shuffle:";

// =============================================================================
// Rule
// =============================================================================

/// A source → target redirect directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Stable identity, assigned at creation (milliseconds since epoch)
    pub id: i64,
    /// URL or bare domain to intercept
    pub source: String,
    /// URL or bare domain to send the user to, or [`SHUFFLE_TARGET`]
    pub target: String,
    /// Number of times this rule has fired
    #[serde(default)]
    pub count: u64,
    /// Whether the rule is enabled at all
    #[serde(default = "default_active")]
    pub active: bool,
    /// Suppressed until this timestamp (ms epoch) even while active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_until: Option<i64>,
    /// One-time manual bypass window end (ms epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_until: Option<i64>,
    /// Cached display string for the popup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_count_message: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Rule {
    /// Create an active rule with a zero count.
    pub fn new(id: i64, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into().trim().to_string(),
            target: target.into().trim().to_string(),
            count: 0,
            active: true,
            paused_until: None,
            override_until: None,
            last_count_message: None,
        }
    }

    /// Whether the target is the shuffle sentinel.
    #[inline]
    pub fn is_shuffle(&self) -> bool {
        is_shuffle_target(&self.target)
    }

    /// Normalized form of the source, used for every comparison.
    #[inline]
    pub fn normalized_source(&self) -> String {
        normalize(&self.source)
    }
}

/// Whether a target string is the shuffle sentinel.
#[inline]
pub fn is_shuffle_target(target: &str) -> bool {
    target.trim() == SHUFFLE_TARGET
}

// =============================================================================
// Host Descriptors
// =============================================================================

/// A top-level or subframe navigation reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub url: String,
    /// 0 for the main frame
    pub frame_id: i32,
    pub tab_id: i32,
}

impl NavigationEvent {
    #[inline]
    pub fn is_main_frame(&self) -> bool {
        self.frame_id == 0
    }
}

/// A browsing context that is currently open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTab {
    pub tab_id: i32,
    pub url: String,
}

/// Redirect intent for the host's tab updater to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRedirect {
    pub tab_id: i32,
    pub target_url: String,
    pub rule_id: i64,
    /// Count after this redirect was recorded
    pub rule_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_json_field_names() {
        let mut rule = Rule::new(1, "a.com", "b.com");
        rule.paused_until = Some(5);
        let json = serde_json::to_value(&rule).expect("serialize");
        assert_eq!(json["pausedUntil"], 5);
        assert!(json.get("overrideUntil").is_none());
        assert_eq!(json["active"], true);
    }

    #[test]
    fn test_rule_json_defaults() {
        let rule: Rule =
            serde_json::from_str(r#"{"id":7,"source":"a.com","target":":shuffle:"}"#).expect("parse");
        assert_eq!(rule.count, 0);
        assert!(rule.active);
        assert!(rule.is_shuffle());
        assert_eq!(rule.paused_until, None);
    }

    #[test]
    fn test_new_trims_input() {
        let rule = Rule::new(1, "  https://www.A.com ", " b.com\n");
        assert_eq!(rule.source, "https://www.A.com");
        assert_eq!(rule.target, "b.com");
        assert_eq!(rule.normalized_source(), "a.com");
    }
}
