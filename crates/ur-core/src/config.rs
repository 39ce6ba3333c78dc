//! Runtime configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};

/// Default per-chunk ceiling, below the 8192-byte sync storage item quota.
pub const DEFAULT_CHUNK_SIZE: usize = 7000;

/// Default length of a manual override window.
pub const DEFAULT_OVERRIDE_DURATION_MS: i64 = 60 * 1000;

/// Who performs redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// Navigation events are matched and redirected by the dispatcher
    #[default]
    Navigation,
    /// The browser's declarative engine redirects; the dispatcher only
    /// keeps counts from the redirect chain and installs compiled rules
    Declarative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedirectorConfig {
    /// Prefix for the storage keys holding the rule set
    pub storage_key: String,
    /// Maximum bytes per stored chunk
    pub chunk_size: usize,
    pub mode: RedirectMode,
    pub override_duration_ms: i64,
}

impl Default for RedirectorConfig {
    fn default() -> Self {
        Self {
            storage_key: "rules".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            mode: RedirectMode::default(),
            override_duration_ms: DEFAULT_OVERRIDE_DURATION_MS,
        }
    }
}

impl RedirectorConfig {
    /// Parse from JSON, filling in defaults for missing fields.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = RedirectorConfig::from_json("{}").expect("parse");
        assert_eq!(config, RedirectorConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = RedirectorConfig::from_json(r#"{"mode":"declarative","chunkSize":4000}"#).expect("parse");
        assert_eq!(config.mode, RedirectMode::Declarative);
        assert_eq!(config.chunk_size, 4000);
        assert_eq!(config.storage_key, "rules");
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(RedirectorConfig::from_json(r#"{"mode":"teleport"}"#).is_err());
    }
}
