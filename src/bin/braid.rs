//! DAG maintenance tool: merge local databases, push to a remote proxy.
//!
//! Content-addressing makes both operations unions of hash-keyed sets:
//! nodes that already exist on the receiving side are skipped, so merge
//! and push are safe to re-run.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use braid::proxy::IngestResponse;
use braid::{logging, NodeStore, SqliteStore};

#[derive(Parser)]
#[command(name = "braid", about = "Maintenance tool for braid conversation DAGs")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Merge one or more source SQLite databases into a target.
    ///
    /// Nodes that already exist in the target are skipped (deduped by
    /// hash), so merging is a simple union.
    Merge {
        /// Path to the target SQLite database
        #[arg(long, short = 's')]
        sqlite: String,

        /// Source databases to merge in
        #[arg(required = true)]
        sources: Vec<String>,
    },

    /// Push local nodes to a remote braid server.
    ///
    /// Reads all nodes from the local database and POSTs them to the
    /// server's /dag/nodes endpoint in batches; the server deduplicates.
    Push {
        /// Path to the local SQLite database
        #[arg(long, short = 's')]
        sqlite: String,

        /// Nodes per HTTP request
        #[arg(long, default_value_t = 500)]
        batch_size: usize,

        /// Server URL (e.g. http://192.168.1.42:8080)
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(false);
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Merge { sqlite, sources } => merge(&sqlite, &sources).await,
        Cmd::Push {
            sqlite,
            batch_size,
            url,
        } => push(&sqlite, batch_size, &url).await,
    }
}

async fn merge(target_path: &str, sources: &[String]) -> Result<()> {
    let target = SqliteStore::new(target_path)
        .await
        .with_context(|| format!("could not open target database {target_path}"))?;

    let mut total_new = 0;
    let mut total_duped = 0;

    for src_path in sources {
        let source = SqliteStore::new(src_path)
            .await
            .with_context(|| format!("could not open source database {src_path}"))?;

        let nodes = source
            .list()
            .await
            .with_context(|| format!("could not list nodes from {src_path}"))?;

        let mut src_new = 0;
        let mut src_duped = 0;
        for node in &nodes {
            let is_new = target
                .put(node)
                .await
                .with_context(|| format!("could not put node {}", node.hash))?;
            if is_new {
                src_new += 1;
            } else {
                src_duped += 1;
            }
        }

        source.close().await?;
        total_new += src_new;
        total_duped += src_duped;

        println!("  {src_path}: {src_new} new, {src_duped} already existed");
    }

    println!(
        "Merged {} new nodes from {} sources ({} already existed) into {}",
        total_new,
        sources.len(),
        total_duped,
        target_path
    );

    target.close().await?;
    Ok(())
}

async fn push(db_path: &str, batch_size: usize, server_url: &str) -> Result<()> {
    let server_url = server_url.trim_end_matches('/');

    let store = SqliteStore::new(db_path)
        .await
        .with_context(|| format!("could not open local database {db_path}"))?;

    let nodes = store
        .list()
        .await
        .context("could not list local nodes")?;

    if nodes.is_empty() {
        println!("No local nodes to push.");
        return Ok(());
    }

    println!(
        "Pushing {} nodes from {} to {}",
        nodes.len(),
        db_path,
        server_url
    );

    let client = reqwest::Client::new();
    let mut total_new = 0;
    let mut total_dup = 0;
    let mut total_err = 0;

    for (i, batch) in nodes.chunks(batch_size).enumerate() {
        let resp = client
            .post(format!("{server_url}/dag/nodes"))
            .json(batch)
            .send()
            .await
            .with_context(|| format!("push failed on batch {i}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("server returned {}: {}", status.as_u16(), body);
        }

        let result: IngestResponse = resp
            .json()
            .await
            .context("could not decode push response")?;

        total_new += result.new;
        total_dup += result.duplicate;
        total_err += result.errors;
    }

    println!("Pushed {total_new} new nodes ({total_dup} already existed, {total_err} errors)");

    store.close().await?;
    Ok(())
}
