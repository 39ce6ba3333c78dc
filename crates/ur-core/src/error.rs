//! Error types for rule admission.

use thiserror::Error;

/// Why a rule was refused before reaching storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Source or target is not URL-like
    #[error("{field} is not a valid URL or domain: {value:?}")]
    InvalidUrl { field: &'static str, value: String },

    /// Source and target normalize to the same address
    #[error("source and target are the same address")]
    SameSourceAndTarget,

    /// Another rule already intercepts this source
    #[error("a rule for {0} already exists")]
    DuplicateSource(String),

    /// The rule would redirect back into itself, directly or through others
    #[error("redirecting {from} to {to} would create a redirect loop")]
    LoopDetected { from: String, to: String },
}
