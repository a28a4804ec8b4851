//! `POST /token` (alias `/api/livekit/token`): issue a media grant.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tether_core::grant::Capabilities;
use tether_core::ids::UserId;
use tracing::instrument;

use super::{ApiError, AppState};
use crate::token::TokenError;

/// Token request body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    /// Room to join.
    #[serde(default, alias = "roomName")]
    pub room: String,
    /// Participant identity. Ignored in favour of the verified identity
    /// when auth is enabled.
    #[serde(default)]
    pub identity: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to true.
    #[serde(default)]
    pub can_publish: Option<bool>,
    /// Defaults to true.
    #[serde(default)]
    pub can_subscribe: Option<bool>,
}

/// Token response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Signed token.
    pub token: String,
    /// Conferencing service URL.
    pub url: String,
    /// Expiry stamped into the token.
    pub expires_at: DateTime<Utc>,
}

/// Issue a grant.
#[instrument(skip_all, fields(method = "token"))]
pub async fn issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let verified = state.auth.verify(&headers)?;
    let Json(req) = body?;
    let broker = state.broker.as_ref().ok_or(TokenError::NotConfigured)?;

    let identity = match verified {
        Some(verified) => {
            if !req.identity.is_empty() && req.identity != verified.as_str() {
                return Err(ApiError::unauthorized("identity does not match token"));
            }
            verified
        }
        None => UserId::new(req.identity.trim()),
    };
    let capabilities = Capabilities {
        can_publish: req.can_publish.unwrap_or(true),
        can_subscribe: req.can_subscribe.unwrap_or(true),
    };

    let grant = broker.issue_named(&req.room, &identity, req.name.as_deref(), capabilities)?;
    Ok(Json(TokenResponse {
        token: grant.token,
        url: grant.url,
        expires_at: grant.expires_at,
    }))
}
