//! Media grants: short-lived credentials for the external conferencing service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// What a grant holder may do inside the room.
///
/// Caller-declared; the broker does not check these against any policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// May send audio/video tracks.
    pub can_publish: bool,
    /// May receive other participants' tracks.
    pub can_subscribe: bool,
}

impl Capabilities {
    /// Full participant.
    pub const PUBLISHER: Self = Self {
        can_publish: true,
        can_subscribe: true,
    };

    /// Listen-only participant.
    pub const SUBSCRIBER: Self = Self {
        can_publish: false,
        can_subscribe: true,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::PUBLISHER
    }
}

/// A signed, self-contained credential for one identity in one room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaGrant {
    /// Opaque signed token handed to the conferencing service.
    pub token: String,
    /// Room the token authorizes.
    pub room_name: String,
    /// Identity embedded in the token.
    pub identity: UserId,
    /// Capability flags embedded in the token.
    pub capabilities: Capabilities,
    /// Expiry stamped into the token.
    pub expires_at: DateTime<Utc>,
    /// Conferencing service URL to connect to.
    #[serde(default)]
    pub url: String,
}

impl MediaGrant {
    /// Whether the grant has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(expires_at: DateTime<Utc>) -> MediaGrant {
        MediaGrant {
            token: "t".into(),
            room_name: "r".into(),
            identity: UserId::new("u"),
            capabilities: Capabilities::default(),
            expires_at,
            url: String::new(),
        }
    }

    #[test]
    fn default_capabilities_publish() {
        assert_eq!(Capabilities::default(), Capabilities::PUBLISHER);
        assert!(!Capabilities::SUBSCRIBER.can_publish);
    }

    #[test]
    fn expiry_is_inclusive() {
        let now = Utc::now();
        assert!(grant(now).is_expired_at(now));
        assert!(!grant(now + Duration::minutes(10)).is_expired_at(now));
    }
}
