//! Conversation Recorder
//!
//! Maps a request/response pair onto a linear chain of DAG nodes and
//! commits it to the store. Each request message becomes one node, chained
//! oldest-first; the assistant reply becomes the head node, carrying the
//! inference metrics.
//!
//! Because the store is hash-keyed and `put` is idempotent, re-recording a
//! conversation whose prefix was seen before creates no new rows - only
//! the novel suffix lands. When the model answers the same prompt history
//! differently, the two reply nodes share a parent and the DAG branches.

use tracing::debug;

use crate::dag::{Node, NodeStore, StoreError};
use crate::llm::{ChatRequest, ChatResponse};

/// Record one conversation turn and return the head (reply) hash.
///
/// Store failures abort the chain and propagate. A partially inserted
/// prefix is left in place: every prefix is itself a valid, addressable
/// subgraph, so there is nothing to roll back.
pub async fn record_turn(
    store: &dyn NodeStore,
    req: &ChatRequest,
    resp: &ChatResponse,
) -> Result<String, StoreError> {
    let mut parent: Option<Node> = None;

    // The request messages are the conversation history. If the same
    // history was recorded before these hashes already exist and every
    // put below is a no-op.
    for msg in &req.messages {
        let content = serde_json::json!({
            "type": "message",
            "role": msg.role,
            "content": msg.content,
            "model": req.model,
        });

        let node = Node::new(content, parent.as_ref())?;
        store.put(&node).await?;

        debug!(hash = %node.hash, role = %msg.role, "recorded message node");
        parent = Some(node);
    }

    let response_content = serde_json::json!({
        "type": "message",
        "role": resp.message.role,
        "content": resp.message.content,
        "model": resp.model,
        "metrics": {
            "total_duration_ns": resp.total_duration.unwrap_or(0),
            "prompt_eval_count": resp.prompt_eval_count.unwrap_or(0),
            "prompt_eval_duration_ns": resp.prompt_eval_duration.unwrap_or(0),
            "eval_count": resp.eval_count.unwrap_or(0),
            "eval_duration_ns": resp.eval_duration.unwrap_or(0),
        },
    });

    let head = Node::new(response_content, parent.as_ref())?;
    store.put(&head).await?;

    debug!(hash = %head.hash, "recorded response node");
    Ok(head.hash)
}
