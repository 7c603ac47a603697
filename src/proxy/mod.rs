//! HTTP Proxy Server
//!
//! The proxy owns the store and exposes two surfaces on one listener:
//!
//! - `POST /api/chat` - the transparent relay to the upstream model
//!   server ([`chat`]), which records every completed turn
//! - `/dag/*` + `/health` - read-only inspection of the DAG plus the bulk
//!   ingest endpoint remote pushes target ([`dag_routes`])
//!
//! The proxy is stateless beyond the store handle: conversation identity
//! is carried entirely by content hashes, so no sessions, cookies, or
//! special headers exist.

mod chat;
mod dag_routes;
mod http_error;

pub use dag_routes::{HistoryMessage, HistoryResponse, IngestResponse};
pub use http_error::ApiError;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::dag::{MemoryStore, NodeStore, SqliteStore};

/// Upstream calls can be slow; model inference regularly runs minutes,
/// especially with thinking-heavy prompts.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Proxy server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on (e.g. "0.0.0.0:8080")
    pub listen_addr: String,

    /// Upstream LLM provider URL (e.g. "http://localhost:11434")
    pub upstream_url: String,

    /// Path to the SQLite database file. `":memory:"` selects an
    /// ephemeral database; `None` selects the in-memory store.
    pub db_path: Option<String>,
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<dyn NodeStore>,
    pub http: reqwest::Client,
    pub upstream_url: String,
}

/// The proxy server: store + router + listener.
pub struct Proxy {
    config: Config,
    state: AppState,
}

impl Proxy {
    /// Build a proxy from config, opening (or creating) the store.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn NodeStore> = match config.db_path.as_deref() {
            Some(path) if !path.is_empty() => {
                info!(path, "using SQLite storage");
                Arc::new(SqliteStore::new(path).await?)
            }
            _ => {
                info!("using in-memory storage");
                Arc::new(MemoryStore::new())
            }
        };

        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;

        let state = AppState {
            store,
            http,
            upstream_url: config.upstream_url.trim_end_matches('/').to_string(),
        };

        Ok(Self { config, state })
    }

    /// Build the application router.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind the listener and serve until the process exits.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            listen = %self.config.listen_addr,
            upstream = %self.state.upstream_url,
            "starting proxy server"
        );

        let listener = tokio::net::TcpListener::bind(&self.config.listen_addr).await?;
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Release the store.
    pub async fn close(&self) -> anyhow::Result<()> {
        self.state.store.close().await?;
        Ok(())
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::handle_chat))
        .route("/health", get(health))
        .route("/dag/stats", get(dag_routes::stats))
        .route("/dag/node/:hash", get(dag_routes::get_node))
        .route("/dag/history", get(dag_routes::list_histories))
        .route("/dag/history/:hash", get(dag_routes::get_history))
        .route("/dag/nodes", post(dag_routes::ingest_nodes))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({"status": "ok"}))
}
