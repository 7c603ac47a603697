//! Store Error Types
//!
//! Error taxonomy for the DAG storage layer. Backends map their engine
//! errors into these variants; the HTTP layer maps them onto status codes.

use thiserror::Error;

/// Errors returned by [`crate::dag::NodeStore`] implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Caller handed the store something unusable (empty node, bad hash).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No node with the given hash exists in the store.
    #[error("node not found: {hash}")]
    NotFound { hash: String },

    /// Backend I/O or engine failure.
    #[error("storage error: {0}")]
    Storage(#[from] libsql::Error),

    /// Stored content no longer decodes as JSON.
    #[error("corrupt node content for {hash}: {message}")]
    Corruption { hash: String, message: String },

    /// Canonical-JSON serialization failed. This is a programming error;
    /// JSON-expressible content always encodes.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a not-found error for a hash
    pub fn not_found(hash: impl Into<String>) -> Self {
        Self::NotFound { hash: hash.into() }
    }

    /// Create a corruption error for a hash
    pub fn corruption(hash: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corruption {
            hash: hash.into(),
            message: message.into(),
        }
    }
}
