//! Media token broker: short-lived HS256 grants for the conferencing service.
//!
//! Tokens follow the LiveKit access-token layout: the API key is the issuer,
//! the identity is the subject, and room permissions live under `video`.
//! The broker only stamps the expiry; enforcing it is the conferencing
//! service's job.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tether_core::errors::ErrorCode;
use tether_core::grant::{Capabilities, MediaGrant};
use tether_core::ids::UserId;
use tether_settings::MediaSettings;
use tracing::{debug, warn};

use crate::metrics::{TOKEN_ERRORS_TOTAL, TOKENS_ISSUED_TOTAL};

/// Token-issuing failure.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// API key or secret missing.
    #[error("media service not configured")]
    NotConfigured,
    /// Empty room or identity.
    #[error("{0}")]
    Validation(String),
    /// Expiry falls outside the representable time range.
    #[error("media token expiry out of range")]
    Expiry,
    /// Signing failed.
    #[error("failed to sign media token: {reason}")]
    Signing {
        /// Encoder error.
        reason: String,
    },
}

impl TokenError {
    /// Error code for the response body.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::NotConfigured | Self::Expiry | Self::Signing { .. } => ErrorCode::InternalError,
        }
    }

    fn metric_reason(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Validation(_) => "validation",
            Self::Expiry => "expiry",
            Self::Signing { .. } => "signing",
        }
    }
}

/// Room permissions embedded in the token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    /// Room name.
    pub room: String,
    /// Holder may join `room`.
    pub room_join: bool,
    /// Holder may publish tracks.
    pub can_publish: bool,
    /// Holder may subscribe to tracks.
    pub can_subscribe: bool,
    /// Holder may send data messages.
    pub can_publish_data: bool,
}

/// Access-token claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaClaims {
    /// API key.
    pub iss: String,
    /// Participant identity.
    pub sub: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Not before (unix seconds).
    pub nbf: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Room permissions.
    pub video: VideoGrant,
}

/// Issues [`MediaGrant`]s signed with the conferencing API secret.
pub struct TokenBroker {
    api_key: String,
    encoding_key: EncodingKey,
    url: String,
    ttl: Duration,
}

impl std::fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBroker")
            .field("api_key", &self.api_key)
            .field("url", &self.url)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenBroker {
    /// Create a broker. Fails when the API key or secret is empty.
    ///
    /// The lifetime is capped at [`MediaSettings::MAX_TOKEN_TTL_SECS`] even
    /// when `settings` skipped validation.
    pub fn new(settings: &MediaSettings) -> Result<Self, TokenError> {
        if !settings.is_configured() {
            return Err(TokenError::NotConfigured);
        }
        Ok(Self {
            api_key: settings.api_key.clone(),
            encoding_key: EncodingKey::from_secret(settings.api_secret.as_bytes()),
            url: settings.url.clone(),
            ttl: Duration::from_secs(
                settings
                    .token_ttl_secs
                    .clamp(1, MediaSettings::MAX_TOKEN_TTL_SECS),
            ),
        })
    }

    /// Issue a grant for `identity` in `room`.
    pub fn issue(
        &self,
        room: &str,
        identity: &UserId,
        capabilities: Capabilities,
    ) -> Result<MediaGrant, TokenError> {
        self.issue_named(room, identity, None, capabilities)
    }

    /// Issue a grant carrying a participant display name.
    pub fn issue_named(
        &self,
        room: &str,
        identity: &UserId,
        name: Option<&str>,
        capabilities: Capabilities,
    ) -> Result<MediaGrant, TokenError> {
        let result = self.issue_at(room, identity, name, capabilities, Utc::now());
        match &result {
            Ok(grant) => {
                counter!(TOKENS_ISSUED_TOTAL).increment(1);
                debug!(room = %grant.room_name, identity = %identity, expires_at = %grant.expires_at, "media grant issued");
            }
            Err(e) => {
                counter!(TOKEN_ERRORS_TOTAL, "reason" => e.metric_reason()).increment(1);
                warn!(error = %e, room, identity = %identity, "media grant refused");
            }
        }
        result
    }

    fn issue_at(
        &self,
        room: &str,
        identity: &UserId,
        name: Option<&str>,
        capabilities: Capabilities,
        now: DateTime<Utc>,
    ) -> Result<MediaGrant, TokenError> {
        let room = room.trim();
        if room.is_empty() {
            return Err(TokenError::Validation("Invalid room name".into()));
        }
        if identity.is_blank() {
            return Err(TokenError::Validation("Missing identity".into()));
        }

        let ttl = chrono::Duration::from_std(self.ttl).map_err(|_| TokenError::Expiry)?;
        let expires_at = now.checked_add_signed(ttl).ok_or(TokenError::Expiry)?;
        let claims = MediaClaims {
            iss: self.api_key.clone(),
            sub: identity.as_str().to_string(),
            name: name.map(str::to_string).filter(|n| !n.trim().is_empty()),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            video: VideoGrant {
                room: room.to_string(),
                room_join: true,
                can_publish: capabilities.can_publish,
                can_subscribe: capabilities.can_subscribe,
                can_publish_data: capabilities.can_publish,
            },
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing {
                reason: e.to_string(),
            })?;

        Ok(MediaGrant {
            token,
            room_name: room.to_string(),
            identity: identity.clone(),
            capabilities,
            expires_at,
            url: self.url.clone(),
        })
    }

    /// Conferencing service URL returned with each grant.
    pub fn url(&self) -> &str {
        &self.url
    }
}
