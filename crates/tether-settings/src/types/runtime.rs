//! Client and process runtime settings.

use serde::{Deserialize, Serialize};

/// Client presence heartbeat.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceSettings {
    /// Seconds between last-seen refreshes.
    pub heartbeat_interval_secs: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 45,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Level for tether crates when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Reconnect backoff for client sockets.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Delay before the first reconnect in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between reconnects in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0–1.0) applied to delays.
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}
