//! Delivery through a relay running in another process.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::delivery::{DeliveryResult, Targets};
use tracing::{debug, warn};

use super::delivery::{DeliveryError, FrameDelivery};
use super::internal::{DeliverRequest, RELAY_TOKEN_HEADER};

/// HTTP client for a remote relay's `/internal/deliver`.
pub struct RemoteRelay {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for RemoteRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRelay")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl RemoteRelay {
    /// Create a client for the relay at `base_url`.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;
        Ok(Self {
            endpoint: format!("{}/internal/deliver", base_url.trim_end_matches('/')),
            token,
            client,
        })
    }
}

#[async_trait]
impl FrameDelivery for RemoteRelay {
    async fn deliver(&self, targets: Targets, frame: Value) -> Result<DeliveryResult, DeliveryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&DeliverRequest { targets, frame });
        if let Some(token) = &self.token {
            request = request.header(RELAY_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "relay unreachable");
            DeliveryError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let details = serde_json::from_str(&text).unwrap_or(Value::String(text));
            warn!(status = status.as_u16(), details = %details, "relay rejected delivery");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                details,
            });
        }

        let result: DeliveryResult = response
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidResponse(e.to_string()))?;
        debug!(delivered = result.delivered, "remote delivery");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tether_core::ids::UserId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_targets_and_frame() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/deliver"))
            .and(header(RELAY_TOKEN_HEADER, "shh"))
            .and(body_json(json!({
                "targets": {"mode": "identities", "ids": ["u2"]},
                "frame": {"type": "ping"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "delivered": 1, "totalTargets": 1, "totalConnected": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let relay = RemoteRelay::new(&server.uri(), Some("shh".into()), Duration::from_secs(5)).unwrap();
        let r = relay
            .deliver(Targets::one(UserId::new("u2")), json!({"type": "ping"}))
            .await
            .unwrap();
        assert_eq!(r.delivered, 1);
    }

    #[tokio::test]
    async fn error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let relay = RemoteRelay::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = relay
            .deliver(Targets::AllConnected { except: None }, json!({}))
            .await
            .unwrap_err();
        assert_matches!(err, DeliveryError::Rejected { status: 500, ref details } if details["error"] == "boom");
    }

    #[tokio::test]
    async fn plain_text_error_body_becomes_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let relay = RemoteRelay::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = relay.deliver(Targets::one(UserId::new("u")), json!({})).await.unwrap_err();
        assert_eq!(err.details(), Value::String("bad gateway".into()));
    }

    #[tokio::test]
    async fn unreachable_relay() {
        let relay = RemoteRelay::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        let err = relay.deliver(Targets::one(UserId::new("u")), json!({})).await.unwrap_err();
        assert_matches!(err, DeliveryError::Unreachable(_));
    }

    #[tokio::test]
    async fn garbage_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let relay = RemoteRelay::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = relay.deliver(Targets::one(UserId::new("u")), json!({})).await.unwrap_err();
        assert_matches!(err, DeliveryError::InvalidResponse(_));
    }
}
