//! SQLite Store
//!
//! Persistent [`NodeStore`] backed by libsql. The whole DAG lives in a
//! single table keyed by content hash:
//!
//! ```sql
//! CREATE TABLE nodes (
//!     hash        TEXT PRIMARY KEY,
//!     parent_hash TEXT,
//!     content     TEXT NOT NULL
//! )
//! ```
//!
//! `content` holds canonical-JSON text, so a database file is portable
//! across machines: any process with the same encoder reproduces the same
//! hashes. `put` is `INSERT OR IGNORE`, which gives atomic
//! insert-if-not-exists under concurrency - the engine, not the store,
//! arbitrates races.

use std::path::Path;

use async_trait::async_trait;
use libsql::Builder;
use serde_json::Value;

use crate::dag::store::walk_ancestry;
use crate::dag::{Node, NodeStore, StoreError};

/// In-process ephemeral database, same backend.
pub const MEMORY_PATH: &str = ":memory:";

/// libsql-backed node store.
pub struct SqliteStore {
    conn: libsql::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path`. `":memory:"` selects an
    /// ephemeral in-process database.
    ///
    /// Initialization is idempotent: schema and index creation use
    /// `IF NOT EXISTS`, so reopening an existing file is safe.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        if path != MEMORY_PATH {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StoreError::InvalidArgument(format!(
                            "cannot create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        let store = Self { conn };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Execute a PRAGMA statement. PRAGMAs return rows, so they go
    /// through `query` rather than `execute`.
    async fn execute_pragma(&self, pragma: &str) -> Result<(), StoreError> {
        let mut stmt = self.conn.prepare(pragma).await?;
        let _ = stmt.query(()).await?;
        Ok(())
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        // WAL mode for concurrent readers; wait on locks instead of
        // failing immediately.
        self.execute_pragma("PRAGMA journal_mode = WAL").await?;
        self.execute_pragma("PRAGMA busy_timeout = 5000").await?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS nodes (
                    hash        TEXT PRIMARY KEY,
                    parent_hash TEXT,
                    content     TEXT NOT NULL
                )",
                (),
            )
            .await?;

        // Children and roots are looked up by parent.
        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_hash)",
                (),
            )
            .await?;

        Ok(())
    }

    /// Convert a result row (`hash, parent_hash, content`) into a Node.
    fn row_to_node(row: &libsql::Row) -> Result<Node, StoreError> {
        let hash: String = row.get(0)?;
        let parent_hash: Option<String> = row.get(1)?;
        let content_text: String = row.get(2)?;

        let content: Value = serde_json::from_str(&content_text)
            .map_err(|e| StoreError::corruption(hash.clone(), e.to_string()))?;

        Ok(Node {
            hash,
            parent_hash,
            content,
        })
    }

    async fn collect_nodes(&self, mut rows: libsql::Rows) -> Result<Vec<Node>, StoreError> {
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl NodeStore for SqliteStore {
    async fn put(&self, node: &Node) -> Result<bool, StoreError> {
        if node.hash.is_empty() {
            return Err(StoreError::InvalidArgument(
                "node has an empty hash".to_string(),
            ));
        }

        let content_text = serde_json::to_string(&node.content)?;
        let parent: libsql::Value = match &node.parent_hash {
            Some(h) => libsql::Value::Text(h.clone()),
            None => libsql::Value::Null,
        };

        let affected = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO nodes (hash, parent_hash, content) VALUES (?1, ?2, ?3)",
                libsql::params![node.hash.clone(), parent, content_text],
            )
            .await?;

        Ok(affected > 0)
    }

    async fn get(&self, hash: &str) -> Result<Node, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT hash, parent_hash, content FROM nodes WHERE hash = ?1",
                libsql::params![hash],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Self::row_to_node(&row),
            None => Err(StoreError::not_found(hash)),
        }
    }

    async fn has(&self, hash: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM nodes WHERE hash = ?1",
                libsql::params![hash],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn get_by_parent(&self, parent_hash: Option<&str>) -> Result<Vec<Node>, StoreError> {
        let rows = match parent_hash {
            Some(parent) => {
                self.conn
                    .query(
                        "SELECT hash, parent_hash, content FROM nodes
                         WHERE parent_hash = ?1 ORDER BY hash",
                        libsql::params![parent],
                    )
                    .await?
            }
            None => {
                self.conn
                    .query(
                        "SELECT hash, parent_hash, content FROM nodes
                         WHERE parent_hash IS NULL ORDER BY hash",
                        (),
                    )
                    .await?
            }
        };
        self.collect_nodes(rows).await
    }

    async fn list(&self) -> Result<Vec<Node>, StoreError> {
        let rows = self
            .conn
            .query(
                "SELECT hash, parent_hash, content FROM nodes ORDER BY hash",
                (),
            )
            .await?;
        self.collect_nodes(rows).await
    }

    async fn roots(&self) -> Result<Vec<Node>, StoreError> {
        self.get_by_parent(None).await
    }

    async fn leaves(&self) -> Result<Vec<Node>, StoreError> {
        let rows = self
            .conn
            .query(
                "SELECT hash, parent_hash, content FROM nodes
                 WHERE hash NOT IN (
                     SELECT parent_hash FROM nodes WHERE parent_hash IS NOT NULL
                 )
                 ORDER BY hash",
                (),
            )
            .await?;
        self.collect_nodes(rows).await
    }

    async fn ancestry(&self, hash: &str) -> Result<Vec<Node>, StoreError> {
        walk_ancestry(self, hash).await
    }

    async fn descendants(&self, hash: &str) -> Result<Vec<Node>, StoreError> {
        let mut chain = self.ancestry(hash).await?;
        chain.reverse();
        Ok(chain)
    }

    async fn depth(&self, hash: &str) -> Result<usize, StoreError> {
        Ok(self.ancestry(hash).await?.len() - 1)
    }

    async fn close(&self) -> Result<(), StoreError> {
        // The connection closes when the store drops; WAL contents are
        // checkpointed by the engine. Nothing to flush explicitly.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_store() -> SqliteStore {
        SqliteStore::new(MEMORY_PATH).await.unwrap()
    }

    #[tokio::test]
    async fn creates_a_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
        store.close().await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn put_and_get_round_trip() {
        let store = memory_store().await;
        let node = Node::new(json!("test content"), None).unwrap();

        assert!(store.put(&node).await.unwrap());

        let retrieved = store.get(&node.hash).await.unwrap();
        assert_eq!(retrieved.hash, node.hash);
        assert_eq!(retrieved.content, node.content);
        assert!(retrieved.parent_hash.is_none());
    }

    #[tokio::test]
    async fn put_and_get_with_parent() {
        let store = memory_store().await;
        let parent = Node::new(json!("parent"), None).unwrap();
        let child = Node::new(json!("child"), Some(&parent)).unwrap();

        store.put(&parent).await.unwrap();
        store.put(&child).await.unwrap();

        let retrieved = store.get(&child.hash).await.unwrap();
        assert_eq!(retrieved.parent_hash.as_deref(), Some(parent.hash.as_str()));
    }

    #[tokio::test]
    async fn get_missing_hash_is_not_found() {
        let store = memory_store().await;
        let err = store.get("nonexistent").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = memory_store().await;
        let node = Node::new(json!("test"), None).unwrap();

        assert!(store.put(&node).await.unwrap());
        assert!(!store.put(&node).await.unwrap());

        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_rejects_empty_hash() {
        let store = memory_store().await;
        let node = Node {
            hash: String::new(),
            parent_hash: None,
            content: json!("bad"),
        };
        let err = store.put(&node).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn has_reports_existence() {
        let store = memory_store().await;
        let node = Node::new(json!("test"), None).unwrap();
        store.put(&node).await.unwrap();

        assert!(store.has(&node.hash).await.unwrap());
        assert!(!store.has("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn get_by_parent_returns_children_and_roots() {
        let store = memory_store().await;
        let parent = Node::new(json!("parent"), None).unwrap();
        let c1 = Node::new(json!("child1"), Some(&parent)).unwrap();
        let c2 = Node::new(json!("child2"), Some(&parent)).unwrap();
        let other_root = Node::new(json!("other root"), None).unwrap();

        for n in [&parent, &c1, &c2, &other_root] {
            store.put(n).await.unwrap();
        }

        let children = store.get_by_parent(Some(&parent.hash)).await.unwrap();
        assert_eq!(children.len(), 2);

        let roots = store.get_by_parent(None).await.unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[tokio::test]
    async fn list_returns_everything() {
        let store = memory_store().await;
        assert!(store.list().await.unwrap().is_empty());

        let n1 = Node::new(json!("node1"), None).unwrap();
        let n2 = Node::new(json!("node2"), Some(&n1)).unwrap();
        let n3 = Node::new(json!("node3"), Some(&n2)).unwrap();
        for n in [&n1, &n2, &n3] {
            store.put(n).await.unwrap();
        }

        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn leaves_are_unreferenced_nodes() {
        let store = memory_store().await;
        let root = Node::new(json!("root"), None).unwrap();
        let child = Node::new(json!("child"), Some(&root)).unwrap();
        let leaf = Node::new(json!("leaf"), Some(&child)).unwrap();
        for n in [&root, &child, &leaf] {
            store.put(n).await.unwrap();
        }

        let leaves = store.leaves().await.unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].hash, leaf.hash);
    }

    #[tokio::test]
    async fn ancestry_and_descendants_traverse_the_chain() {
        let store = memory_store().await;
        let root = Node::new(json!("root"), None).unwrap();
        let child = Node::new(json!("child"), Some(&root)).unwrap();
        let grandchild = Node::new(json!("grandchild"), Some(&child)).unwrap();
        for n in [&root, &child, &grandchild] {
            store.put(n).await.unwrap();
        }

        let ancestry = store.ancestry(&grandchild.hash).await.unwrap();
        assert_eq!(ancestry.len(), 3);
        assert_eq!(ancestry[0].content, json!("grandchild"));
        assert_eq!(ancestry[2].content, json!("root"));

        let descendants = store.descendants(&grandchild.hash).await.unwrap();
        assert_eq!(descendants[0].content, json!("root"));
        assert_eq!(descendants[2].content, json!("grandchild"));

        assert_eq!(store.depth(&root.hash).await.unwrap(), 0);
        assert_eq!(store.depth(&grandchild.hash).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn map_content_survives_the_round_trip() {
        let store = memory_store().await;
        let content = json!({
            "role": "user",
            "content": "Hello, world!",
            "model": "llama2",
        });
        let node = Node::new(content.clone(), None).unwrap();
        store.put(&node).await.unwrap();

        let retrieved = store.get(&node.hash).await.unwrap();
        assert_eq!(retrieved.content, content);
    }

    #[tokio::test]
    async fn branches_deduplicate_their_shared_prefix() {
        let store = memory_store().await;
        let parent = Node::new(json!("parent"), None).unwrap();
        let b1 = Node::new(json!("branch1"), Some(&parent)).unwrap();
        let b2 = Node::new(json!("branch2"), Some(&parent)).unwrap();
        for n in [&parent, &b1, &b2] {
            store.put(n).await.unwrap();
        }

        assert_eq!(
            store.get_by_parent(Some(&parent.hash)).await.unwrap().len(),
            2
        );
        assert_eq!(store.leaves().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn data_survives_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");
        let path = path.to_str().unwrap();

        let node = Node::new(json!({"role": "user", "content": "hello"}), None).unwrap();
        {
            let store = SqliteStore::new(path).await.unwrap();
            store.put(&node).await.unwrap();
            store.close().await.unwrap();
        }

        let reopened = SqliteStore::new(path).await.unwrap();
        let retrieved = reopened.get(&node.hash).await.unwrap();
        assert_eq!(retrieved.content, node.content);
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }
}
