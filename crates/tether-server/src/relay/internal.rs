//! `POST /internal/deliver`: delivery into this process's relay from a
//! gateway running elsewhere.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tether_core::delivery::{DeliveryResult, Targets};
use tracing::warn;

use crate::http::{ApiError, AppState};

/// Header carrying the shared relay secret.
pub const RELAY_TOKEN_HEADER: &str = "x-relay-token";

/// Body of an internal delivery request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliverRequest {
    /// Who receives the frame.
    pub targets: Targets,
    /// Frame pushed verbatim.
    pub frame: Value,
}

/// Constant-time token comparison. Only the length leaks.
fn token_matches(presented: &[u8], expected: &str) -> bool {
    presented.ct_eq(expected.as_bytes()).into()
}

/// Handle an internal delivery request.
pub async fn deliver(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DeliverRequest>, JsonRejection>,
) -> Result<Json<DeliveryResult>, ApiError> {
    if let Some(expected) = state.internal_token.as_deref() {
        let presented = headers.get(RELAY_TOKEN_HEADER).map(|v| v.as_bytes());
        if !presented.is_some_and(|p| token_matches(p, expected)) {
            warn!("internal delivery rejected: bad relay token");
            return Err(ApiError::unauthorized("invalid relay token"));
        }
    }
    let relay = state
        .relay
        .as_ref()
        .ok_or_else(|| ApiError::internal("relay not running"))?;
    let Json(request) = body?;
    Ok(Json(relay.deliver_now(&request.targets, &request.frame)))
}
