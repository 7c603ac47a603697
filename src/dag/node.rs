//! Node Model and Content Addressing
//!
//! A [`Node`] is the sole persistent entity in the DAG. Its identity is
//! the SHA-256 digest of its canonical-JSON `(content, parent)` pair, so
//! two nodes with the same content and parent are the same node - this is
//! the deduplication mechanism, and branches fall out of it for free.
//!
//! # Canonical encoding
//!
//! The hash pre-image is `{"content": <content>, "parent": <parent-or-"">}`
//! serialized with `serde_json`. Object keys come out sorted because
//! `serde_json::Map` is BTreeMap-backed (the `preserve_order` feature must
//! stay off), there is no insignificant whitespace, and array order is
//! preserved. Non-finite floats are unrepresentable. Every process that
//! pushes or merges nodes relies on this encoding matching exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::dag::StoreError;

/// A single content-addressed node in the conversation DAG.
///
/// `content` is deliberately opaque: recorders put arbitrary JSON in it
/// (role/content/model/metrics maps) and the store never interprets it
/// beyond hashing and round-tripping the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Content-addressed identifier: 64 lowercase hex chars of SHA-256.
    pub hash: String,

    /// Hash of the previous node in the chain; `None` for roots.
    /// Serialized as `null` so the wire shape is stable.
    pub parent_hash: Option<String>,

    /// Opaque JSON payload.
    pub content: Value,
}

/// Hash pre-image. `parent` is the empty string for roots so the shape
/// never varies.
#[derive(Serialize)]
struct HashInput<'a> {
    content: &'a Value,
    parent: &'a str,
}

impl Node {
    /// Create a node from content and an optional parent, computing its hash.
    ///
    /// Pure: two calls with equal arguments produce equal nodes, in any
    /// process on any machine.
    ///
    /// # Errors
    ///
    /// [`StoreError::Encoding`] if the content cannot be canonically
    /// encoded (non-finite float). JSON decoded from the wire never fails.
    pub fn new(content: Value, parent: Option<&Node>) -> Result<Self, StoreError> {
        let parent_hash = parent.map(|p| p.hash.clone());
        let hash = compute_hash(&content, parent_hash.as_deref())?;

        Ok(Self {
            hash,
            parent_hash,
            content,
        })
    }

    /// True if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent_hash.is_none()
    }
}

/// Compute the content-addressed hash for a `(content, parent)` pair.
fn compute_hash(content: &Value, parent_hash: Option<&str>) -> Result<String, StoreError> {
    let input = HashInput {
        content,
        parent: parent_hash.unwrap_or(""),
    };

    let bytes = serde_json::to_vec(&input)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}
