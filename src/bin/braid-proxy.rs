//! Proxy entry point.
//!
//! Sits between a chat client and an Ollama-compatible server, recording
//! every conversation turn into the DAG while relaying traffic untouched.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use braid::{logging, Config, Proxy};

#[derive(Parser)]
#[command(
    name = "braid-proxy",
    about = "Transparent LLM proxy that records conversations in a Merkle DAG"
)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Upstream LLM provider URL (e.g. Ollama)
    #[arg(long, default_value = "http://localhost:11434")]
    upstream: String,

    /// Path to the SQLite database (default: in-memory)
    #[arg(long)]
    db: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    info!(
        listen = %cli.listen,
        upstream = %cli.upstream,
        debug = cli.debug,
        "braid LLM proxy starting"
    );

    let config = Config {
        listen_addr: cli.listen,
        upstream_url: cli.upstream,
        db_path: cli.db,
    };

    let proxy = Proxy::new(config).await?;
    proxy.run().await
}
