//! Gateway error types.

use serde_json::Value;
use tether_core::errors::ErrorCode;

use super::membership::MembershipError;
use crate::relay::DeliveryError;

/// Failure handling one notification event.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request was missing or had malformed fields.
    #[error("{0}")]
    Validation(String),
    /// The membership store or the relay failed.
    #[error("{message}")]
    Upstream {
        /// Human-readable summary for the caller.
        message: String,
        /// Collaborator-reported detail.
        details: Value,
    },
}

impl GatewayError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap a membership failure.
    pub fn membership(err: &MembershipError) -> Self {
        Self::Upstream {
            message: "Failed to fetch community members".into(),
            details: Value::String(err.to_string()),
        }
    }

    /// Wrap a relay failure with a branch-specific summary.
    pub fn delivery(message: &str, err: &DeliveryError) -> Self {
        Self::Upstream {
            message: message.to_string(),
            details: err.details(),
        }
    }

    /// Error code for the response body.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Upstream { .. } => ErrorCode::UpstreamUnavailable,
        }
    }

    /// Attached detail, if any.
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Validation(_) => None,
            Self::Upstream { details, .. } => Some(details),
        }
    }
}
