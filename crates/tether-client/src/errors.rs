//! Client error types.

use tether_core::ids::CallId;

use crate::call::CallState;

/// Transport and gateway failures seen by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Client could not be constructed.
    #[error("invalid client configuration: {reason}")]
    Config {
        /// What is wrong.
        reason: String,
    },
    /// The request never got a response.
    #[error("request failed: {reason}")]
    Transport {
        /// Underlying error.
        reason: String,
    },
    /// The gateway answered with an error status.
    #[error("gateway returned {status}: {body}")]
    Status {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },
    /// The response body could not be decoded.
    #[error("invalid response: {reason}")]
    Decode {
        /// Decoder error.
        reason: String,
    },
    /// The call state machine refused the action.
    #[error(transparent)]
    Call(#[from] CallError),
    /// The call driver has stopped.
    #[error("call driver is not running")]
    DriverStopped,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                reason: err.to_string(),
            }
        }
    }
}

/// A call action the machine refused.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// `startCall` while another call is in progress.
    #[error("already in a call ({call_id}, {state:?})")]
    AlreadyInCall {
        /// Current state.
        state: CallState,
        /// Call in progress.
        call_id: CallId,
    },
    /// Callee is empty or is the caller.
    #[error("invalid callee: {0}")]
    InvalidCallee(String),
}
