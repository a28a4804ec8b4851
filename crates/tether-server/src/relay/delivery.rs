//! The delivery seam between the gateway and a relay.

use async_trait::async_trait;
use serde_json::Value;
use tether_core::delivery::{DeliveryResult, Targets};

/// Relay-side delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The relay could not be reached at all.
    #[error("relay unreachable: {0}")]
    Unreachable(String),
    /// The relay answered with an error status.
    #[error("relay rejected delivery with status {status}")]
    Rejected {
        /// HTTP status returned by the relay.
        status: u16,
        /// Body the relay returned.
        details: Value,
    },
    /// The relay answered 2xx with a body we could not decode.
    #[error("invalid relay response: {0}")]
    InvalidResponse(String),
}

impl DeliveryError {
    /// Detail to attach to an upstream error response.
    pub fn details(&self) -> Value {
        match self {
            Self::Rejected { details, .. } => details.clone(),
            Self::Unreachable(msg) | Self::InvalidResponse(msg) => Value::String(msg.clone()),
        }
    }
}

/// Something that can fan a frame out to live connections.
///
/// Implemented by the in-process [`SignalingRelay`](super::SignalingRelay)
/// and by [`RemoteRelay`](super::RemoteRelay), which forwards to a relay
/// running in another process.
#[async_trait]
pub trait FrameDelivery: Send + Sync {
    /// Push `frame` to every live connection of every identity in `targets`.
    async fn deliver(&self, targets: Targets, frame: Value) -> Result<DeliveryResult, DeliveryError>;
}
