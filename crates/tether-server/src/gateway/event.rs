//! Notify request classification.
//!
//! A notify body is a flat JSON object: routing keys (`toUserId`,
//! `broadcast`, `communityId`, `excludeUserId`) sit next to the payload that
//! ends up in the frame. Classification checks, in order:
//!
//! 1. `communityId` and `type` present → community broadcast
//! 2. `broadcast: true` and `type == "user_presence"` → presence broadcast
//! 3. otherwise → direct, which requires `toUserId`

use serde_json::{Map, Value};
use tether_core::ids::{CommunityId, UserId};

use super::errors::GatewayError;

/// Routing keys removed before the body is pushed as a frame.
const ROUTING_KEYS: [&str; 3] = ["toUserId", "broadcast", "excludeUserId"];

/// Which fan-out an event takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// One recipient.
    Direct,
    /// Everyone connected except the sender.
    PresenceBroadcast,
    /// Community membership minus exclusions.
    CommunityBroadcast,
}

impl EventKind {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::PresenceBroadcast => "presence",
            Self::CommunityBroadcast => "community",
        }
    }
}

/// Addressing resolved from a notify body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Deliver to `recipient` only.
    Direct {
        /// The addressed identity.
        recipient: UserId,
    },
    /// Deliver to every connected identity except the sender.
    PresenceBroadcast,
    /// Deliver to members of `community_id`.
    CommunityBroadcast {
        /// Community whose members are targeted.
        community_id: CommunityId,
        /// Member to skip.
        exclude: Option<UserId>,
    },
}

/// A classified notify request.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationEvent {
    /// Where the event goes.
    pub route: Route,
    /// Frame `type`, when present.
    pub event_type: Option<String>,
    /// Originating identity, skipped by broadcasts.
    pub sender: Option<UserId>,
    body: Map<String, Value>,
}

impl NotificationEvent {
    /// Classify a raw notify body.
    pub fn from_body(body: Value) -> Result<Self, GatewayError> {
        let Value::Object(body) = body else {
            return Err(GatewayError::validation("Request body must be a JSON object"));
        };

        let event_type = non_blank(&body, "type");
        let sender = non_blank(&body, "senderId").map(UserId::new);

        let community = non_blank(&body, "communityId").filter(|_| event_type.is_some());
        if let Some(community) = community {
            return Ok(Self {
                route: Route::CommunityBroadcast {
                    community_id: CommunityId::new(community),
                    exclude: non_blank(&body, "excludeUserId").map(UserId::new),
                },
                event_type,
                sender,
                body,
            });
        }

        let is_broadcast = body.get("broadcast").and_then(Value::as_bool) == Some(true);
        if is_broadcast && event_type.as_deref() == Some("user_presence") {
            let sender = non_blank(&body, "userId").map(UserId::new).or(sender);
            return Ok(Self {
                route: Route::PresenceBroadcast,
                event_type,
                sender,
                body,
            });
        }

        let recipient = non_blank(&body, "toUserId")
            .map(UserId::new)
            .ok_or_else(|| GatewayError::validation("Missing toUserId"))?;
        Ok(Self {
            route: Route::Direct { recipient },
            event_type,
            sender,
            body,
        })
    }

    /// Direct event from typed parts.
    pub fn direct(recipient: UserId, frame: Value) -> Self {
        let body = match frame {
            Value::Object(map) => map,
            other => Map::from_iter([("payload".to_string(), other)]),
        };
        Self {
            route: Route::Direct { recipient },
            event_type: body.get("type").and_then(Value::as_str).map(str::to_string),
            sender: None,
            body,
        }
    }

    /// Override the sender with a verified identity.
    #[must_use]
    pub fn with_sender(mut self, sender: UserId) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Which fan-out this event takes.
    pub fn kind(&self) -> EventKind {
        match self.route {
            Route::Direct { .. } => EventKind::Direct,
            Route::PresenceBroadcast => EventKind::PresenceBroadcast,
            Route::CommunityBroadcast { .. } => EventKind::CommunityBroadcast,
        }
    }

    /// The frame pushed to sockets: the body minus routing keys.
    pub fn frame(&self) -> Value {
        let mut frame = self.body.clone();
        for key in ROUTING_KEYS {
            let _ = frame.remove(key);
        }
        Value::Object(frame)
    }
}

fn non_blank(body: &Map<String, Value>, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
