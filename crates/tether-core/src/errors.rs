//! Error taxonomy shared by every externally visible surface.
//!
//! Each crate keeps its own `thiserror` enum; those enums map onto an
//! [`ErrorCode`] so a caller can tell "nobody was listening" (a successful
//! response with `delivered: 0`) from "the system is broken".

use serde::{Deserialize, Serialize};

/// Machine-checkable error code carried in HTTP error bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or malformed request fields.
    ValidationError,
    /// A collaborator (membership store, relay) failed or was unreachable.
    UpstreamUnavailable,
    /// No verified identity on a request that needs one.
    AuthRequired,
    /// Anything else (misconfiguration, signing failure).
    InternalError,
}

impl ErrorCode {
    /// Wire string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this code.
    pub fn http_status(self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::AuthRequired => 401,
            Self::UpstreamUnavailable | Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body returned for every failed request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine-checkable code.
    pub code: ErrorCode,
    /// Collaborator-reported detail, when there is any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
