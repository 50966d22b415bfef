//! Request routing and handlers

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use tokio::sync::Notify;

use crate::engine::Engine;
use crate::error::KvError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,

    /// Signalled when a handler sees a fatal log error
    fatal: Arc<Notify>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            fatal: Arc::new(Notify::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Resolves once a fatal log error was observed
    pub async fn fatal_error(&self) {
        self.fatal.notified().await
    }

    fn observe(&self, error: &KvError) {
        if error.is_fatal() {
            tracing::error!(error = %error, "fatal transaction log error; requesting shutdown");
            self.fatal.notify_one();
        }
    }
}

/// Build the router for the given state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/keys/{key}",
            get(get_key).put(put_key).delete(delete_key),
        )
        .route("/v1", any(not_allowed))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    tracing::info!(%method, %uri, status = response.status().as_u16(), "request");
    response
}

async fn get_key(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.engine.get(&key) {
        Ok(value) => {
            tracing::debug!(key = %key, "GET");
            (StatusCode::OK, value).into_response()
        }
        Err(e) => error_response(&state, e),
    }
}

async fn put_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    value: String,
) -> Response {
    match state.engine.put(&key, &value) {
        Ok(sequence) => {
            tracing::debug!(key = %key, sequence, "PUT");
            StatusCode::CREATED.into_response()
        }
        Err(e) => error_response(&state, e),
    }
}

async fn delete_key(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.engine.delete(&key) {
        Ok(sequence) => {
            tracing::debug!(key = %key, sequence, "DELETE");
            StatusCode::OK.into_response()
        }
        Err(e) => error_response(&state, e),
    }
}

async fn not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "Not Allowed").into_response()
}

fn error_response(state: &AppState, error: KvError) -> Response {
    state.observe(&error);

    let status = match error {
        KvError::KeyNotFound => StatusCode::NOT_FOUND,
        KvError::EmptyKey => StatusCode::BAD_REQUEST,
        KvError::LoggerClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, error.to_string()).into_response()
}
