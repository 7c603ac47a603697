//! NodeStore Trait - Storage Abstraction
//!
//! This trait abstracts DAG persistence so the proxy, recorder, and CLI
//! tools work against either backend ([`MemoryStore`] or [`SqliteStore`])
//! without caring which one they hold.
//!
//! # Semantics implementations must uphold
//!
//! - `put` is idempotent by hash: storing the same logical node N times
//!   leaves exactly one record, and exactly one concurrent caller
//!   observes `is_new = true`.
//! - Inserts tolerate dangling parents; traversal only follows links
//!   whose targets exist.
//! - The store is append-only: nothing mutates or deletes a node.
//! - Reads reflect completed writes within the same handle.
//!
//! [`MemoryStore`]: crate::dag::MemoryStore
//! [`SqliteStore`]: crate::dag::SqliteStore

use async_trait::async_trait;

use crate::dag::{Node, StoreError};

/// Backend abstraction for persisting and traversing the Merkle DAG.
///
/// Implementations must be `Send + Sync`; the proxy shares one store
/// across all in-flight requests.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Store a node. Returns `true` if the node was newly inserted,
    /// `false` if a node with the same hash already existed (not an error).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a node with an empty hash; `Storage` on
    /// backend failure.
    async fn put(&self, node: &Node) -> Result<bool, StoreError>;

    /// Retrieve a node by hash. `NotFound` if absent.
    async fn get(&self, hash: &str) -> Result<Node, StoreError>;

    /// Check whether a node exists.
    async fn has(&self, hash: &str) -> Result<bool, StoreError>;

    /// All nodes whose `parent_hash` equals the given hash, or all roots
    /// when `parent_hash` is `None`. Result order is stable across
    /// identical calls against an unchanged store.
    async fn get_by_parent(&self, parent_hash: Option<&str>) -> Result<Vec<Node>, StoreError>;

    /// All nodes in the store.
    async fn list(&self) -> Result<Vec<Node>, StoreError>;

    /// All root nodes (no parent).
    async fn roots(&self) -> Result<Vec<Node>, StoreError>;

    /// All leaf nodes (no stored node references them as parent).
    async fn leaves(&self) -> Result<Vec<Node>, StoreError>;

    /// Path from `hash` back to its root, inclusive: requested node
    /// first, root last. Stops early if a parent link dangles.
    ///
    /// # Errors
    ///
    /// `NotFound` if `hash` itself is absent.
    async fn ancestry(&self, hash: &str) -> Result<Vec<Node>, StoreError>;

    /// Ancestry in chronological order: root first, `hash` last.
    /// The name is historic; this is not a subtree walk.
    async fn descendants(&self, hash: &str) -> Result<Vec<Node>, StoreError>;

    /// Depth of a node: `0` for roots, `ancestry.len() - 1` otherwise.
    async fn depth(&self, hash: &str) -> Result<usize, StoreError>;

    /// Release resources. Store behavior after close is undefined.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Walk parent links from `start` to the root, requested node first.
///
/// Shared by both backends: only the initial lookup distinguishes
/// "absent start hash" (an error) from "dangling parent" (chain ends).
pub(crate) async fn walk_ancestry<S: NodeStore + ?Sized>(
    store: &S,
    start: &str,
) -> Result<Vec<Node>, StoreError> {
    let mut current = store.get(start).await?;
    let mut chain = Vec::new();

    loop {
        let parent_hash = current.parent_hash.clone();
        chain.push(current);

        let parent_hash = match parent_hash {
            Some(h) => h,
            None => break,
        };
        match store.get(&parent_hash).await {
            Ok(parent) => current = parent,
            // Dangling parent reference: chain ends here.
            Err(StoreError::NotFound { .. }) => break,
            Err(e) => return Err(e),
        }
    }

    Ok(chain)
}
