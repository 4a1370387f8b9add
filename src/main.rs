//! cache-proxy: a caching HTTP/1.0 forwarding proxy
//!
//! Accepts client connections, forwards GET requests to the origin server,
//! streams responses back and keeps small responses in memory.
//!
//! Features:
//! - One task per client connection
//! - Request reconstruction with proxy-owned Host/User-Agent/Connection headers
//! - Bounded in-memory cache with LRU eviction
//! - Configuration via CLI arguments or TOML file

mod cache;
mod config;
mod error;
mod handler;
mod http;
mod io;
mod server;

use config::Config;
use server::Server;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cache-proxy: {e}");
            return ExitCode::from(1);
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_cache_size = config.max_cache_size,
        max_object_size = config.max_object_size,
        workers = ?config.workers,
        "Starting cache-proxy"
    );

    let port = config.port;
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Failed to start proxy");
            eprintln!("cache-proxy: failed to listen on port {port}: {e}");
            ExitCode::from(1)
        }
    }
}

/// Build the multi-threaded runtime and serve until the process is killed.
fn run(config: Config) -> std::io::Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async {
        let server = Server::bind(&config).await?;
        server.run().await;
        Ok(())
    })
}
