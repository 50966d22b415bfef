//! durakv Server Binary
//!
//! Starts the HTTP server for durakv.

use std::sync::Arc;

use clap::Parser;
use durakv::config::WalSyncStrategy;
use durakv::http::{self, AppState};
use durakv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// durakv Server
#[derive(Parser, Debug)]
#[command(name = "durakv-server")]
#[command(about = "Durable key-value store over HTTP")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./durakv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    listen: String,

    /// fsync the log every N records (0 = every record)
    #[arg(short = 's', long, default_value = "0")]
    sync_every: usize,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,durakv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("durakv Server v{}", durakv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = match args.sync_every {
        0 => WalSyncStrategy::EveryWrite,
        count => WalSyncStrategy::EveryNEntries { count },
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .wal_sync_strategy(sync_strategy)
        .build();

    // Replay happens inside open; any error aborts startup
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        keys = engine.len(),
        last_sequence = engine.last_sequence(),
        "Engine initialized successfully"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    let served = http::serve(AppState::new(Arc::clone(&engine)), &config.listen_addr, shutdown).await;

    // Requests have stopped; drain the log before exiting
    let closed = engine.close();
    if let Some(e) = engine.logger().take_error() {
        tracing::error!("Transaction log failure: {}", e);
    }

    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = closed {
        tracing::error!("Failed to close transaction log: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
