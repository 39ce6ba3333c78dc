//! Error types for storage and encoding.

use thiserror::Error;
use ur_core::RuleError;

/// Stored rule data could not be decoded.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A compact record is missing a required position or has a wrong type
    #[error("malformed rule record {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    /// Metadata names a chunk that is not in storage
    #[error("missing chunk {0}")]
    MissingChunk(String),

    /// A chunk key holds something other than a string
    #[error("chunk {0} is not a string")]
    NotAString(String),
}

/// A storage operation failed.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The host's storage collaborator reported a failure
    #[error("storage backend error: {0}")]
    Backend(String),

    /// An item exceeds the per-item size ceiling
    #[error("item {key} is {bytes} bytes, over the {limit} byte limit")]
    QuotaExceeded { key: String, bytes: usize, limit: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The rule was refused before anything was written
    #[error(transparent)]
    Rule(#[from] RuleError),
}

impl StorageError {
    /// Validation and loop rejections, as opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rule(_))
    }
}
