//! Chat Relay
//!
//! `POST /api/chat` forwarded to the upstream model server. Two paths:
//!
//! - **Streaming** (the default): upstream NDJSON is scanned line by line
//!   on a detached task. Each parsed chunk is appended to an accumulator
//!   and the line is flushed to the client as-is; when the final chunk
//!   arrives the accumulated reply is recorded into the DAG. The task is
//!   deliberately not tied to the client connection - a client that
//!   disconnects after the last visible token must not cost us the
//!   recording - so the task keeps draining the upstream either way.
//! - **Non-streaming**: `stream` is forced to `false`, the whole upstream
//!   body is decoded, recorded, and returned.
//!
//! Recording failures are logged, never surfaced: on the streaming path
//! the response has already been flushed, and on the non-streaming path
//! the client cannot do anything about a storage hiccup.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::dag::NodeStore;
use crate::llm::{ChatRequest, ChatResponse, ErrorResponse, Message, StreamChunk};
use crate::proxy::AppState;
use crate::recorder::record_turn;

pub(crate) async fn handle_chat(State(state): State<AppState>, body: Bytes) -> Response {
    let req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "failed to parse request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid request body")),
            )
                .into_response();
        }
    };

    debug!(
        model = %req.model,
        message_count = req.messages.len(),
        stream = req.is_streaming(),
        "received chat request"
    );

    if req.is_streaming() {
        handle_streaming_chat(state, req).await
    } else {
        handle_non_streaming_chat(state, req).await
    }
}

/// Streaming path: relay chunks as they arrive, record when done.
async fn handle_streaming_chat(state: AppState, req: ChatRequest) -> Response {
    let url = format!("{}/api/chat", state.upstream_url);
    debug!(%url, "forwarding streaming request to upstream");

    // Re-serialize rather than forwarding raw bytes: the request was
    // already decoded, and the non-streaming path needs the same
    // serialization to inject stream=false.
    let upstream = match state.http.post(&url).json(&req).send().await {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, "upstream request failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new("upstream request failed")),
            )
                .into_response();
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        let body = upstream.text().await.unwrap_or_default();
        error!(status = status.as_u16(), %body, "upstream returned error");
        let status =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        return (status, Json(ErrorResponse::new("upstream error"))).into_response();
    }

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);
    let store = Arc::clone(&state.store);
    tokio::spawn(relay_and_record(upstream, tx, store, req));

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// Scan the upstream body, forward lines, accumulate, then record.
///
/// Runs detached from the request handler: the response body is fed
/// through the channel, and a dropped receiver (client gone) only stops
/// the forwarding, never the scan or the recording.
async fn relay_and_record(
    upstream: reqwest::Response,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
    store: Arc<dyn NodeStore>,
    req: ChatRequest,
) {
    let mut relay = StreamRelay {
        tx,
        full_content: String::new(),
        final_resp: None,
        client_connected: true,
    };

    let mut stream = upstream.bytes_stream();
    let mut buf = BytesMut::new();
    let mut read_error = false;

    while let Some(next) = stream.next().await {
        let chunk = match next {
            Ok(chunk) => chunk,
            Err(e) => {
                error!(error = %e, "error reading upstream stream");
                read_error = true;
                break;
            }
        };

        buf.extend_from_slice(&chunk);
        while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line = buf.split_to(pos + 1);
            relay.handle_line(&line[..line.len() - 1]).await;
        }
    }

    // Trailing line without a newline at EOF.
    if !read_error && !buf.is_empty() {
        let line = buf.split_to(buf.len());
        relay.handle_line(&line).await;
    }

    // No final chunk means the stream broke before done=true; there is
    // no complete turn to record.
    if let Some(resp) = relay.final_resp.take() {
        debug!(
            content_preview = %preview(&resp.message.content, 200),
            "streaming complete"
        );
        match record_turn(store.as_ref(), &req, &resp).await {
            Ok(head) => info!(head_hash = %preview(&head, 16), "conversation stored"),
            Err(e) => error!(error = %e, "failed to store conversation"),
        }
    }
}

struct StreamRelay {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
    full_content: String,
    final_resp: Option<ChatResponse>,
    client_connected: bool,
}

impl StreamRelay {
    async fn handle_line(&mut self, line: &[u8]) {
        let line = match line.last() {
            Some(b'\r') => &line[..line.len() - 1],
            _ => line,
        };
        if line.is_empty() {
            return;
        }

        let chunk: StreamChunk = match serde_json::from_slice(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, line = %String::from_utf8_lossy(line), "failed to parse chunk");
                return;
            }
        };

        self.full_content.push_str(&chunk.message.content);

        debug!(
            done = chunk.done,
            content = %preview(&chunk.message.content, 50),
            "streaming chunk"
        );

        if self.client_connected {
            let mut out = BytesMut::with_capacity(line.len() + 1);
            out.extend_from_slice(line);
            out.put_u8(b'\n');
            if self.tx.send(Ok(out.freeze())).await.is_err() {
                debug!("client disconnected, continuing to drain upstream");
                self.client_connected = false;
            }
        }

        if chunk.done {
            self.final_resp = Some(ChatResponse {
                model: chunk.model,
                created_at: chunk.created_at,
                message: Message {
                    role: "assistant".to_string(),
                    content: self.full_content.clone(),
                    images: None,
                },
                done: true,
                total_duration: chunk.total_duration,
                load_duration: chunk.load_duration,
                prompt_eval_count: chunk.prompt_eval_count,
                prompt_eval_duration: chunk.prompt_eval_duration,
                eval_count: chunk.eval_count,
                eval_duration: chunk.eval_duration,
                context: None,
            });
        }
    }
}

/// Non-streaming path: one upstream round trip, record, reply.
async fn handle_non_streaming_chat(state: AppState, mut req: ChatRequest) -> Response {
    req.stream = Some(false);

    let url = format!("{}/api/chat", state.upstream_url);
    debug!(%url, "forwarding request to upstream");

    let resp = match forward_request(&state, &url, &req).await {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, "failed to forward request");
            return (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse::new("upstream request failed")),
            )
                .into_response();
        }
    };

    debug!(
        model = %resp.model,
        role = %resp.message.role,
        content_preview = %preview(&resp.message.content, 100),
        "received response from upstream"
    );

    // Don't fail the request just because storage hiccuped.
    match record_turn(state.store.as_ref(), &req, &resp).await {
        Ok(head) => info!(head_hash = %preview(&head, 16), "conversation stored"),
        Err(e) => error!(error = %e, "failed to store conversation"),
    }

    Json(resp).into_response()
}

async fn forward_request(
    state: &AppState,
    url: &str,
    req: &ChatRequest,
) -> anyhow::Result<ChatResponse> {
    let resp = state.http.post(url).json(req).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("upstream returned {}: {}", status.as_u16(), body);
    }

    Ok(resp.json::<ChatResponse>().await?)
}

/// Single-line preview for logs.
fn preview(s: &str, max_chars: usize) -> String {
    let flat = s.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
