//! Axum route handlers for the status server.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::StoreError;
use crate::state::StateVector;
use crate::storage::Store;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 500;

type ApiError = (StatusCode, Json<Value>);

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/state/history", get(history_handler))
        .route("/manifests/pending", get(pending_manifests_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    count: usize,
    states: Vec<StateVector>,
}

#[derive(Debug, Serialize)]
struct PendingManifest {
    id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    chars: usize,
}

fn store_failure(e: StoreError) -> ApiError {
    error!(error = %e, "Status query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "solipsist",
    }))
}

/// GET /state — the latest persisted snapshot.
async fn state_handler(State(state): State<AppState>) -> Result<Json<StateVector>, ApiError> {
    match state.store.latest_state().map_err(store_failure)? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no state recorded yet"})),
        )),
    }
}

/// GET /state/history?limit=N — newest first, limit clamped to `1..=500`.
async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let states = state.store.state_history(limit).map_err(store_failure)?;
    Ok(Json(HistoryResponse {
        count: states.len(),
        states,
    }))
}

/// GET /manifests/pending — the publication queue, oldest first.
async fn pending_manifests_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pending: Vec<PendingManifest> = state
        .store
        .unpublished_manifests()
        .map_err(store_failure)?
        .into_iter()
        .map(|m| PendingManifest {
            chars: m.content.chars().count(),
            id: m.id,
            timestamp: m.timestamp,
        })
        .collect();
    Ok(Json(json!({ "count": pending.len(), "manifests": pending })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Duration;
    use tower::ServiceExt;

    use crate::storage::{Manifest, SqliteStore};
    use crate::utilities::now;

    fn app() -> (Arc<SqliteStore>, Router) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let router = app_router(AppState::new(store.clone()));
        (store, router)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (_, app) = app();
        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["service"], "solipsist");
    }

    #[tokio::test]
    async fn test_state_before_and_after_first_snapshot() {
        let (store, app) = app();
        let (status, _) = get_json(app.clone(), "/state").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        store
            .append_state(&StateVector::new(0.3, 0.1, 0.9, now()))
            .unwrap();
        let (status, json) = get_json(app, "/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["certainty"], 0.3);
        assert_eq!(json["coherence"], 0.9);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let (store, app) = app();
        let start = now();
        for i in 0..5 {
            let ts = start + Duration::seconds(i);
            store
                .append_state(&StateVector::new(0.1 * i as f64, 0.1, 0.9, ts))
                .unwrap();
        }

        let (status, json) = get_json(app.clone(), "/state/history?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["states"][0]["certainty"], 0.4);

        let (_, json) = get_json(app.clone(), "/state/history").await;
        assert_eq!(json["count"], 5);

        let (_, json) = get_json(app, "/state/history?limit=0").await;
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn test_pending_manifests_oldest_first() {
        let (store, app) = app();
        let old = Manifest::new("old".to_string(), now() - Duration::minutes(10));
        let new = Manifest::new("newer text".to_string(), now());
        store.append_manifest(&new).unwrap();
        store.append_manifest(&old).unwrap();

        let (status, json) = get_json(app, "/manifests/pending").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["manifests"][0]["id"], old.id.as_str());
        assert_eq!(json["manifests"][1]["chars"], 10);
    }
}
