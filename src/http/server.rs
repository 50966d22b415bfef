//! HTTP Server
//!
//! Binds the listener and serves until asked to stop.

use std::future::Future;

use tokio::net::TcpListener;

use super::{router, AppState};
use crate::error::Result;

/// Serve `state` on `listen_addr` until `shutdown` resolves or a handler
/// reports a fatal log error. In-flight requests are allowed to finish.
pub async fn serve<F>(state: AppState, listen_addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

    let watcher = state.clone();
    let stop = async move {
        tokio::select! {
            _ = shutdown => tracing::info!("shutdown requested"),
            _ = watcher.fatal_error() => tracing::error!("stopping server after fatal log error"),
        }
    };

    axum::serve(listener, router(state))
        .with_graceful_shutdown(stop)
        .await?;

    Ok(())
}
