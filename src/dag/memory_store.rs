//! In-Memory Store
//!
//! Map-backed [`NodeStore`] used when the proxy runs without a database
//! path, and by tests. A single mutex guards the map; structural queries
//! (roots, children, leaves) are derived by scan. Results are sorted by
//! hash so repeated calls return identical orderings.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::dag::store::walk_ancestry;
use crate::dag::{Node, NodeStore, StoreError};

/// Non-persistent node store.
///
/// # Thread Safety
///
/// Safe to share across async tasks: mutations serialize on the inner
/// mutex, which is never held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: Mutex<HashMap<String, Node>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Node>> {
        // A poisoned lock means a panic while holding it; the map itself
        // is still structurally valid (inserts are single statements).
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn sorted_by_hash(mut nodes: Vec<Node>) -> Vec<Node> {
    nodes.sort_by(|a, b| a.hash.cmp(&b.hash));
    nodes
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn put(&self, node: &Node) -> Result<bool, StoreError> {
        if node.hash.is_empty() {
            return Err(StoreError::InvalidArgument(
                "node has an empty hash".to_string(),
            ));
        }

        let mut nodes = self.lock();
        if nodes.contains_key(&node.hash) {
            return Ok(false);
        }
        nodes.insert(node.hash.clone(), node.clone());
        Ok(true)
    }

    async fn get(&self, hash: &str) -> Result<Node, StoreError> {
        self.lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::not_found(hash))
    }

    async fn has(&self, hash: &str) -> Result<bool, StoreError> {
        Ok(self.lock().contains_key(hash))
    }

    async fn get_by_parent(&self, parent_hash: Option<&str>) -> Result<Vec<Node>, StoreError> {
        let nodes = self.lock();
        let matching = nodes
            .values()
            .filter(|n| n.parent_hash.as_deref() == parent_hash)
            .cloned()
            .collect();
        Ok(sorted_by_hash(matching))
    }

    async fn list(&self) -> Result<Vec<Node>, StoreError> {
        Ok(sorted_by_hash(self.lock().values().cloned().collect()))
    }

    async fn roots(&self) -> Result<Vec<Node>, StoreError> {
        self.get_by_parent(None).await
    }

    async fn leaves(&self) -> Result<Vec<Node>, StoreError> {
        let nodes = self.lock();
        let referenced: HashSet<&str> = nodes
            .values()
            .filter_map(|n| n.parent_hash.as_deref())
            .collect();
        let leaves = nodes
            .values()
            .filter(|n| !referenced.contains(n.hash.as_str()))
            .cloned()
            .collect();
        Ok(sorted_by_hash(leaves))
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        let node = Node::new(json!("test content"), None).unwrap();

        assert!(store.put(&node).await.unwrap());

        let retrieved = store.get(&node.hash).await.unwrap();
        assert_eq!(retrieved, node);
    }

    #[tokio::test]
    async fn get_missing_hash_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get("nonexistent").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = MemoryStore::new();
        let node = Node::new(json!("test"), None).unwrap();

        assert!(store.put(&node).await.unwrap());
        assert!(!store.put(&node).await.unwrap());

        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_rejects_empty_hash() {
        let store = MemoryStore::new();
        let node = Node {
            hash: String::new(),
            parent_hash: None,
            content: json!("bad"),
        };
        let err = store.put(&node).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn identical_content_deduplicates() {
        let store = MemoryStore::new();
        let a = Node::new(json!("identical"), None).unwrap();
        let b = Node::new(json!("identical"), None).unwrap();
        assert_eq!(a.hash, b.hash);

        store.put(&a).await.unwrap();
        store.put(&b).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_puts_of_same_node_insert_once() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let node = Node::new(json!("racy"), None).unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let node = node.clone();
            handles.push(tokio::spawn(async move { store.put(&node).await.unwrap() }));
        }

        let mut fresh_inserts = 0;
        for handle in handles {
            if handle.await.unwrap() {
                fresh_inserts += 1;
            }
        }

        assert_eq!(fresh_inserts, 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn branching_shares_a_parent() {
        let store = MemoryStore::new();
        let prompt =
            Node::new(json!({"role": "user", "content": "What is 2+2?"}), None).unwrap();
        let r1 = Node::new(
            json!({"role": "assistant", "content": "2+2 equals 4."}),
            Some(&prompt),
        )
        .unwrap();
        let r2 = Node::new(
            json!({"role": "assistant", "content": "The answer is 4!"}),
            Some(&prompt),
        )
        .unwrap();

        store.put(&prompt).await.unwrap();
        store.put(&r1).await.unwrap();
        store.put(&r2).await.unwrap();

        assert_ne!(r1.hash, r2.hash);
        assert_eq!(r1.parent_hash, r2.parent_hash);
        assert_eq!(store.list().await.unwrap().len(), 3);
        assert_eq!(store.roots().await.unwrap().len(), 1);
        assert_eq!(store.leaves().await.unwrap().len(), 2);
        assert_eq!(
            store.get_by_parent(Some(&prompt.hash)).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn roots_equals_get_by_parent_none() {
        let store = MemoryStore::new();
        let r1 = Node::new(json!("root1"), None).unwrap();
        let r2 = Node::new(json!("root2"), None).unwrap();
        let child = Node::new(json!("child"), Some(&r1)).unwrap();

        store.put(&r1).await.unwrap();
        store.put(&r2).await.unwrap();
        store.put(&child).await.unwrap();

        let roots = store.roots().await.unwrap();
        let by_parent = store.get_by_parent(None).await.unwrap();
        assert_eq!(roots, by_parent);
        assert_eq!(roots.len(), 2);
    }

    #[tokio::test]
    async fn ancestry_runs_node_to_root() {
        let store = MemoryStore::new();
        let root = Node::new(json!("root"), None).unwrap();
        let child = Node::new(json!("child"), Some(&root)).unwrap();
        let grandchild = Node::new(json!("grandchild"), Some(&child)).unwrap();

        store.put(&root).await.unwrap();
        store.put(&child).await.unwrap();
        store.put(&grandchild).await.unwrap();

        let ancestry = store.ancestry(&grandchild.hash).await.unwrap();
        assert_eq!(ancestry.len(), 3);
        assert_eq!(ancestry[0].hash, grandchild.hash);
        assert_eq!(ancestry[2].hash, root.hash);

        let descendants = store.descendants(&grandchild.hash).await.unwrap();
        assert_eq!(descendants[0].hash, root.hash);
        assert_eq!(descendants[2].hash, grandchild.hash);
    }

    #[tokio::test]
    async fn ancestry_stops_at_dangling_parent() {
        let store = MemoryStore::new();
        let ghost = Node::new(json!("never stored"), None).unwrap();
        let orphan = Node::new(json!("orphan"), Some(&ghost)).unwrap();

        store.put(&orphan).await.unwrap();

        let ancestry = store.ancestry(&orphan.hash).await.unwrap();
        assert_eq!(ancestry.len(), 1);
        assert_eq!(ancestry[0].hash, orphan.hash);
    }

    #[tokio::test]
    async fn depth_counts_edges_to_root() {
        let store = MemoryStore::new();
        let root = Node::new(json!("root"), None).unwrap();
        let child = Node::new(json!("child"), Some(&root)).unwrap();
        let grandchild = Node::new(json!("grandchild"), Some(&child)).unwrap();

        store.put(&root).await.unwrap();
        store.put(&child).await.unwrap();
        store.put(&grandchild).await.unwrap();

        assert_eq!(store.depth(&root.hash).await.unwrap(), 0);
        assert_eq!(store.depth(&grandchild.hash).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_order_is_stable() {
        let store = MemoryStore::new();
        for i in 0..8 {
            let node = Node::new(json!(format!("node {i}")), None).unwrap();
            store.put(&node).await.unwrap();
        }

        let first = store.list().await.unwrap();
        let second = store.list().await.unwrap();
        assert_eq!(first, second);
    }
}
