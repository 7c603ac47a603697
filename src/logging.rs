//! Logging Setup
//!
//! Shared tracing initialization for the binaries. `RUST_LOG` wins when
//! set; otherwise the default level is `info`, or `debug` when the
//! `--debug` flag is passed.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored (useful in
/// tests where multiple entry points race to initialize).
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
