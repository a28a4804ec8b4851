//! HTTP client for the gateway's `/notify` and `/token` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tether_core::frames::SignalFrame;
use tether_core::grant::{Capabilities, MediaGrant};
use tether_core::ids::UserId;
use tracing::{debug, warn};

use crate::call::{GrantSource, Signaler};
use crate::errors::ClientError;
use crate::presence::PresenceNotifier;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    room: &'a str,
    identity: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    can_publish: bool,
    can_subscribe: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    #[serde(default)]
    url: String,
    expires_at: DateTime<Utc>,
}

/// Talks to a notification gateway.
pub struct GatewayClient {
    base_url: String,
    bearer: Option<String>,
    display_name: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Client for the gateway at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Client with a custom request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Config {
                reason: "gateway url is empty".into(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config {
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url,
            bearer: None,
            display_name: None,
            client,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Display name sent with grant requests.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Post a raw notify event and return the gateway's response body.
    pub async fn notify(&self, body: &Value) -> Result<Value, ClientError> {
        let response = self.post("/notify", body).await?;
        Ok(response.json().await?)
    }

    /// Request a media grant for `identity` in `room`.
    pub async fn request_grant(
        &self,
        room: &str,
        identity: &UserId,
        name: Option<&str>,
    ) -> Result<MediaGrant, ClientError> {
        let capabilities = Capabilities::PUBLISHER;
        let request = TokenRequest {
            room,
            identity: identity.as_str(),
            name,
            can_publish: capabilities.can_publish,
            can_subscribe: capabilities.can_subscribe,
        };
        let response = self.post("/token", &request).await?;
        let body: TokenResponse = response.json().await?;
        debug!(room, identity = %identity, "grant received");
        Ok(MediaGrant {
            token: body.token,
            room_name: room.to_string(),
            identity: identity.clone(),
            capabilities,
            expires_at: body.expires_at,
            url: body.url,
        })
    }

    async fn post(&self, route: &str, body: &impl Serialize) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{route}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(url = %url, status = status.as_u16(), body = %body, "gateway request failed");
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Direct notify body for `frame`: the frame's own fields plus `toUserId`.
pub fn direct_body(to: &UserId, frame: &SignalFrame) -> Result<Value, ClientError> {
    let mut body = serde_json::to_value(frame).map_err(|e| ClientError::Decode {
        reason: e.to_string(),
    })?;
    if let Value::Object(map) = &mut body {
        let _ = map.insert("toUserId".into(), Value::String(to.to_string()));
    }
    Ok(body)
}

#[async_trait]
impl Signaler for GatewayClient {
    async fn signal(&self, to: &UserId, frame: &SignalFrame) -> Result<(), ClientError> {
        let body = direct_body(to, frame)?;
        let response = self.notify(&body).await?;
        debug!(
            to = %to,
            kind = frame.kind(),
            delivered = response.get("delivered").and_then(serde_json::Value::as_u64).unwrap_or(0),
            "signal sent"
        );
        Ok(())
    }
}

#[async_trait]
impl GrantSource for GatewayClient {
    async fn fetch_grant(&self, room: &str, identity: &UserId) -> Result<MediaGrant, ClientError> {
        self.request_grant(room, identity, self.display_name.as_deref())
            .await
    }
}

#[async_trait]
impl PresenceNotifier for GatewayClient {
    async fn announce(&self, user: &UserId, last_seen: DateTime<Utc>) -> Result<(), ClientError> {
        let body = json!({
            "broadcast": true,
            "type": "user_presence",
            "userId": user,
            "lastSeen": last_seen.to_rfc3339(),
        });
        let _ = self.notify(&body).await?;
        Ok(())
    }
}
