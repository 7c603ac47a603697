//! Storage Layer
//!
//! This module holds the Merkle DAG node model and its persistence:
//!
//! - [`Node`] - content-addressed record (SHA-256 over canonical JSON)
//! - [`NodeStore`] - backend abstraction for persistence and traversal
//! - [`MemoryStore`] - lock-guarded map, no persistence
//! - [`SqliteStore`] - libsql single-table backend, portable across machines
//!
//! Deduplication is a property of the addressing scheme, not the store:
//! identical `(content, parent)` pairs hash identically, and `put` is
//! idempotent by hash.

mod error;
mod memory_store;
mod node;
mod sqlite_store;
mod store;

pub use error::StoreError;
pub use memory_store::MemoryStore;
pub use node::Node;
pub use sqlite_store::SqliteStore;
pub use store::NodeStore;
