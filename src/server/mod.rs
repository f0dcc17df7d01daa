//! Read-only HTTP status server.
//!
//! Reports the persisted state log and the manifest queue. Nothing here writes
//! to the store; all mutation stays with the runtime.
//!
//! # Endpoints
//!
//! - `GET /health`            Liveness probe
//! - `GET /state`             Latest state snapshot
//! - `GET /state/history`     Recent snapshots, newest first (`?limit=N`)
//! - `GET /manifests/pending` Queued manifests, oldest first

pub mod routes;

pub use routes::{app_router, AppState};

use tokio::net::TcpListener;
use tracing::info;

/// Bind `addr` and serve the status routes until the process exits.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Status server listening");
    axum::serve(listener, app_router(state)).await
}
