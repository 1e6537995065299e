//! HTTP Module
//!
//! Thin HTTP front end over the [`Store`](crate::store::Store) trait.
//!
//! ## Routes
//! - `GET /`              - greeting
//! - `GET /health`        - JSON status (backend, last sequence, key count)
//! - `PUT /v1/{key}`      - body is the value, 201 on success
//! - `GET /v1/{key}`      - value as body, 404 if missing
//! - `DELETE /v1/{key}`   - 200 on success (absent keys included)

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{build_router, AppState};

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::store::Store;

/// Serve the store on `listener` until `shutdown` resolves
///
/// In-flight requests finish before this returns.
pub async fn serve<F>(listener: TcpListener, store: Arc<dyn Store>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, build_router(store))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
