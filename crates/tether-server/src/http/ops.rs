//! `GET /health` and `GET /metrics`.

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use super::AppState;

/// Liveness plus relay population.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let (connections, identities) = state.relay.as_ref().map_or((0, 0), |relay| {
        (
            relay.registry().connection_count(),
            relay.registry().identity_count(),
        )
    });
    Json(json!({
        "ok": true,
        "connections": connections,
        "identities": identities,
    }))
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(crate::metrics::render)
        .unwrap_or_default();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
