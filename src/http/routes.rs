//! Routes and handlers
//!
//! Store calls block on journal I/O, so every handler runs them on tokio's
//! blocking pool.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::store::Store;

use super::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
}

/// Build the service router over a store
pub fn build_router(store: Arc<dyn Store>) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/health", get(health))
        .route(
            "/v1/:key",
            get(get_value).put(put_value).delete(delete_value),
        )
        .with_state(AppState { store })
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Run a store call on the blocking pool
async fn blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let outcome = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(outcome?)
}

async fn hello() -> &'static str {
    "kvlog\n"
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = state.store.status();
    Json(json!({
        "status": if status.as_ref().map_or(false, |s| s.closed) { "closed" } else { "ok" },
        "version": crate::VERSION,
        "backend": status.as_ref().map(|s| s.backend),
        "last_sequence": status.as_ref().map(|s| s.last_sequence),
        "keys": status.as_ref().map(|s| s.keys),
    }))
}

async fn put_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> std::result::Result<StatusCode, ApiError> {
    let value = String::from_utf8(body.to_vec())
        .map_err(|_| ApiError::InvalidInput("value must be valid UTF-8".into()))?;
    let size = value.len();

    let store = Arc::clone(&state.store);
    let stored_key = key.clone();
    blocking(move || store.put(&stored_key, &value)).await?;

    tracing::info!(key = %key, size, "value stored");
    Ok(StatusCode::CREATED)
}

async fn get_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> std::result::Result<String, ApiError> {
    let store = Arc::clone(&state.store);
    blocking(move || store.get(&key)).await
}

async fn delete_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let store = Arc::clone(&state.store);
    let deleted_key = key.clone();
    blocking(move || store.delete(&deleted_key)).await?;

    tracing::info!(key = %key, "value deleted");
    Ok(StatusCode::OK)
}
