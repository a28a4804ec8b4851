//! Network-facing settings: HTTP listener, relay, auth.

use serde::{Deserialize, Serialize};

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Per-request timeout for HTTP handlers in milliseconds.
    pub request_timeout_ms: u64,
    /// Allow cross-origin requests from any origin.
    pub cors_allow_any: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8084,
            request_timeout_ms: 10_000,
            cors_allow_any: true,
        }
    }
}

/// Socket relay tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Frames buffered per connection before sends count as drops.
    pub outbound_capacity: usize,
    /// Interval between server pings on each socket.
    pub heartbeat_interval_ms: u64,
    /// Lifetime drops after which a slow connection is closed.
    pub max_total_drops: u64,
    /// Base URL of a remote relay process. When unset the gateway delivers
    /// through the in-process relay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Shared secret required on the internal delivery endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_token: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            heartbeat_interval_ms: 30_000,
            max_total_drops: 100,
            remote_url: None,
            internal_token: None,
        }
    }
}

/// Request identity verification.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 secret for bearer tokens. `None` accepts caller-supplied ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}
