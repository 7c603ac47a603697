//! DAG Inspection and Ingest Endpoints
//!
//! Read-only views over the store plus the bulk-insert endpoint remote
//! pushes target. These are thin presentations of store state; all graph
//! logic lives in the storage layer.

use axum::extract::{Path, State};
use axum::response::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::dag::{Node, NodeStore, StoreError};
use crate::proxy::{ApiError, AppState};

/// Conversation history leading up to one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Messages in chronological order (root first, requested node last)
    pub messages: Vec<HistoryMessage>,
    /// Hash of the node the history was requested for
    pub head_hash: String,
    /// Number of messages in the history
    pub depth: usize,
}

/// One message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_hash: Option<String>,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub model: String,
    /// Content keys other than type/role/content/model (e.g. metrics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

pub(crate) async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let nodes = state.store.list().await?;
    let roots = state.store.roots().await?;
    let leaves = state.store.leaves().await?;

    Ok(Json(serde_json::json!({
        "total_nodes": nodes.len(),
        "root_count": roots.len(),
        "leaf_count": leaves.len(),
    })))
}

pub(crate) async fn get_node(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let node = state.store.get(&hash).await?;
    Ok(Json(node))
}

pub(crate) async fn get_history(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = build_history(state.store.as_ref(), &hash).await?;
    Ok(Json(history))
}

pub(crate) async fn list_histories(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let leaves = state.store.leaves().await?;

    let mut histories = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        match build_history(state.store.as_ref(), &leaf.hash).await {
            Ok(history) => histories.push(history),
            Err(e) => {
                warn!(hash = %leaf.hash, error = %e, "failed to build history for leaf");
            }
        }
    }

    Ok(Json(serde_json::json!({
        "count": histories.len(),
        "histories": histories,
    })))
}

/// Result of a bulk node ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub new: usize,
    pub duplicate: usize,
    pub errors: usize,
}

/// Bulk insert, the push target. Each entry is handled independently:
/// entries that fail to decode or store count as errors, the rest land
/// as new or duplicate.
pub(crate) async fn ingest_nodes(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let entries: Vec<Value> = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("invalid request body"))?;

    let mut result = IngestResponse {
        new: 0,
        duplicate: 0,
        errors: 0,
    };

    for entry in entries {
        let node: Node = match serde_json::from_value(entry) {
            Ok(node) => node,
            Err(e) => {
                warn!(error = %e, "rejecting malformed node in ingest batch");
                result.errors += 1;
                continue;
            }
        };

        match state.store.put(&node).await {
            Ok(true) => result.new += 1,
            Ok(false) => result.duplicate += 1,
            Err(e) => {
                warn!(hash = %node.hash, error = %e, "failed to store ingested node");
                result.errors += 1;
            }
        }
    }

    Ok(Json(result))
}

/// Walk the ancestry of `hash` and render it oldest-first.
async fn build_history(
    store: &dyn NodeStore,
    hash: &str,
) -> Result<HistoryResponse, StoreError> {
    // Ancestry is newest-first; the history reads root-first.
    let ancestry = store.ancestry(hash).await?;

    let messages: Vec<HistoryMessage> = ancestry
        .into_iter()
        .rev()
        .map(history_message)
        .collect();

    Ok(HistoryResponse {
        head_hash: hash.to_string(),
        depth: messages.len(),
        messages,
    })
}

fn history_message(node: Node) -> HistoryMessage {
    let mut msg = HistoryMessage {
        hash: node.hash,
        parent_hash: node.parent_hash,
        role: String::new(),
        content: String::new(),
        model: String::new(),
        metadata: None,
    };

    if let Value::Object(content) = node.content {
        let mut metadata = Map::new();
        for (key, value) in content {
            match key.as_str() {
                "role" => {
                    if let Value::String(role) = value {
                        msg.role = role;
                    }
                }
                "content" => {
                    if let Value::String(content) = value {
                        msg.content = content;
                    }
                }
                "model" => {
                    if let Value::String(model) = value {
                        msg.model = model;
                    }
                }
                "type" => {}
                _ => {
                    metadata.insert(key, value);
                }
            }
        }
        if !metadata.is_empty() {
            msg.metadata = Some(metadata);
        }
    }

    msg
}
