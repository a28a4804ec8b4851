//! Relay frames: the JSON messages pushed from the relay to client sockets.
//!
//! The relay itself never inspects frame contents; it forwards whatever
//! JSON object the gateway hands it. [`SignalFrame`] is the typed view the
//! call client decodes on the receiving end.
//!
//! ## Wire format
//!
//! Every frame is an object tagged by `type`:
//!
//! ```json
//! { "type": "incoming_call", "callId": "call_…", "callerId": "u1",
//!   "callerName": "Ana", "callType": "audio", "roomName": "u1-u2" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CallId, CommunityId, UserId};

/// Media kind of a call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Voice only.
    #[default]
    Audio,
    /// Voice and camera.
    Video,
}

/// Typed relay frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalFrame {
    /// A peer is inviting this user to a call.
    #[serde(rename_all = "camelCase")]
    IncomingCall {
        /// Call attempt id.
        call_id: CallId,
        /// Inviting user.
        caller_id: UserId,
        /// Display name of the caller.
        #[serde(default)]
        caller_name: Option<String>,
        /// Audio or video.
        #[serde(default)]
        call_type: CallType,
        /// Conferencing room both parties join.
        room_name: String,
    },
    /// The callee accepted.
    #[serde(rename_all = "camelCase")]
    CallAccepted {
        /// Call attempt id.
        call_id: CallId,
        /// Accepting user.
        from_user_id: UserId,
        /// Room agreed for the session.
        room_name: String,
    },
    /// The callee declined.
    #[serde(rename_all = "camelCase")]
    CallRejected {
        /// Call attempt id.
        call_id: CallId,
        /// Declining user.
        from_user_id: UserId,
    },
    /// The other party hung up or cancelled.
    #[serde(rename_all = "camelCase")]
    CallEnded {
        /// Call attempt id.
        call_id: CallId,
        /// User who ended the call.
        from_user_id: UserId,
    },
    /// A message was posted to a community this socket subscribes to.
    #[serde(rename_all = "camelCase")]
    NewCommunityMessage {
        /// Community the message belongs to.
        community_id: CommunityId,
        /// Message row as produced by the data store.
        #[serde(default)]
        message: Value,
    },
    /// Someone's last-seen timestamp changed.
    #[serde(rename_all = "camelCase")]
    UserPresence {
        /// User whose presence changed.
        user_id: UserId,
        /// ISO-8601 last-seen timestamp.
        #[serde(default)]
        last_seen: Option<String>,
    },
}

impl SignalFrame {
    /// Wire `type` tag of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IncomingCall { .. } => "incoming_call",
            Self::CallAccepted { .. } => "call_accepted",
            Self::CallRejected { .. } => "call_rejected",
            Self::CallEnded { .. } => "call_ended",
            Self::NewCommunityMessage { .. } => "new_community_message",
            Self::UserPresence { .. } => "user_presence",
        }
    }

    /// Call id carried by call-signaling frames.
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            Self::IncomingCall { call_id, .. }
            | Self::CallAccepted { call_id, .. }
            | Self::CallRejected { call_id, .. }
            | Self::CallEnded { call_id, .. } => Some(call_id),
            Self::NewCommunityMessage { .. } | Self::UserPresence { .. } => None,
        }
    }

    /// Parse a raw socket text message.
    ///
    /// Returns `Ok(None)` for well-formed JSON whose `type` this client does
    /// not understand, so newer producers don't break older clients.
    pub fn parse(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let known = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| KNOWN_KINDS.contains(&t));
        if !known {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some)
    }
}

const KNOWN_KINDS: [&str; 6] = [
    "incoming_call",
    "call_accepted",
    "call_rejected",
    "call_ended",
    "new_community_message",
    "user_presence",
];
