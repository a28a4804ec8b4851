//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON
//! settings file. Each type implements [`Default`] with production default
//! values, and `#[serde(default)]` lets a file specify only what it changes.

mod integrations;
mod runtime;
mod server;

pub use integrations::*;
pub use runtime::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "relay": { "remoteUrl": "http://relay.internal:8084" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Socket relay tuning.
    pub relay: RelaySettings,
    /// Conferencing service credentials.
    pub media: MediaSettings,
    /// Community membership source.
    pub membership: MembershipSettings,
    /// Request identity verification.
    pub auth: AuthSettings,
    /// Client presence heartbeat.
    pub presence: PresenceSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Client reconnect backoff.
    pub retry: RetrySettings,
}

impl TetherSettings {
    /// Clamp out-of-range values with a warning instead of rejecting them.
    ///
    /// Called automatically during loading.
    pub fn validate(&mut self) {
        fn at_least_one_u64(val: &mut u64, default: u64, name: &str) {
            if *val == 0 {
                tracing::warn!("{name} must be positive, using {default}");
                *val = default;
            }
        }

        if self.relay.outbound_capacity == 0 {
            tracing::warn!("relay.outboundCapacity must be positive, using 1");
            self.relay.outbound_capacity = 1;
        }
        if self.relay.max_total_drops == 0 {
            tracing::warn!("relay.maxTotalDrops must be positive, using 1");
            self.relay.max_total_drops = 1;
        }
        at_least_one_u64(
            &mut self.relay.heartbeat_interval_ms,
            RelaySettings::default().heartbeat_interval_ms,
            "relay.heartbeatIntervalMs",
        );
        at_least_one_u64(
            &mut self.presence.heartbeat_interval_secs,
            PresenceSettings::default().heartbeat_interval_secs,
            "presence.heartbeatIntervalSecs",
        );
        at_least_one_u64(
            &mut self.media.token_ttl_secs,
            MediaSettings::default().token_ttl_secs,
            "media.tokenTtlSecs",
        );
        if self.media.token_ttl_secs > MediaSettings::MAX_TOKEN_TTL_SECS {
            tracing::warn!(
                "media.tokenTtlSecs ({}) above {}, clamped",
                self.media.token_ttl_secs,
                MediaSettings::MAX_TOKEN_TTL_SECS
            );
            self.media.token_ttl_secs = MediaSettings::MAX_TOKEN_TTL_SECS;
        }

        let retry = &mut self.retry;
        if retry.jitter_factor < 0.0 || retry.jitter_factor > 1.0 {
            let clamped = retry.jitter_factor.clamp(0.0, 1.0);
            tracing::warn!(
                "retry.jitterFactor out of range ({}), clamped to {clamped}",
                retry.jitter_factor
            );
            retry.jitter_factor = clamped;
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            tracing::warn!(
                "retry.maxDelayMs ({}) < baseDelayMs ({}), correcting",
                retry.max_delay_ms,
                retry.base_delay_ms
            );
            retry.max_delay_ms = retry.base_delay_ms;
        }
    }
}
