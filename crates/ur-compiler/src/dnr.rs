//! Declarative rule descriptors
//!
//! These serialize to the JSON shape `declarativeNetRequest.updateDynamicRules`
//! accepts, so the host can pass them through untouched.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrRule {
    pub id: i32,
    pub priority: u32,
    pub action: DnrAction,
    pub condition: DnrCondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    pub redirect: DnrRedirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrRedirect {
    /// RE2 substitution; `\1` refers to the filter's first capture group
    pub regex_substitution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnrCondition {
    pub regex_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// Request types a condition applies to. Only top-level documents are
/// redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

impl DnrRule {
    /// Redirect rule for main-frame requests matching `regex_filter`.
    pub fn redirect(id: i32, priority: u32, regex_filter: String, regex_substitution: String) -> Self {
        Self {
            id,
            priority,
            action: DnrAction {
                kind: ActionType::Redirect,
                redirect: DnrRedirect { regex_substitution },
            },
            condition: DnrCondition {
                regex_filter,
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let rule = DnrRule::redirect(7, 1, "^https?://a\\.com".to_string(), "https://b.com".to_string());
        let json = serde_json::to_value(&rule).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "id": 7,
                "priority": 1,
                "action": {
                    "type": "redirect",
                    "redirect": { "regexSubstitution": "https://b.com" }
                },
                "condition": {
                    "regexFilter": "^https?://a\\.com",
                    "resourceTypes": ["main_frame"]
                }
            })
        );
    }
}
