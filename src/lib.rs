//! Braid: an instrumenting LLM inference proxy over a Merkle DAG
//!
//! Braid sits between a chat client and an Ollama-compatible model server.
//! Requests pass through unchanged; every request-response pair is recorded
//! into a local content-addressed DAG, so conversation histories, branches,
//! and retries become navigable objects.
//!
//! # Architecture
//!
//! - **Content addressing**: a node's identity is the SHA-256 of its
//!   canonical-JSON `(content, parent)` pair. Identical conversation
//!   prefixes deduplicate; divergent replies branch automatically.
//! - **Storage abstraction**: the [`dag::NodeStore`] trait with an
//!   in-memory backend and a libsql (SQLite) backend.
//! - **Transparent relay**: the streaming path forwards upstream bytes
//!   verbatim while accumulating the reply for recording.
//!
//! # Modules
//!
//! - [`dag`] - node model, hashing, and the storage layer
//! - [`llm`] - Ollama-compatible chat wire types
//! - [`recorder`] - maps a request/response pair onto a node chain
//! - [`proxy`] - HTTP server (relay + DAG inspection endpoints)
//! - [`logging`] - tracing setup shared by the binaries

pub mod dag;
pub mod llm;
pub mod logging;
pub mod proxy;
pub mod recorder;

// Re-exports
pub use dag::{MemoryStore, Node, NodeStore, SqliteStore, StoreError};
pub use proxy::{Config, Proxy};
