//! Delivery accounting shared by the relay and the gateway.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Outcome of one fan-out.
///
/// Counts are per identity, not per socket: a user with three open tabs
/// who received the frame counts once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    /// Identities that accepted the frame on at least one socket.
    pub delivered: usize,
    /// Size of the resolved target set.
    pub total_targets: usize,
    /// Identities in the target set that had at least one live socket.
    pub total_connected: usize,
}

impl DeliveryResult {
    /// Result for a fan-out with nobody to deliver to.
    pub const EMPTY: Self = Self {
        delivered: 0,
        total_targets: 0,
        total_connected: 0,
    };
}

/// Which identities a frame is addressed to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum Targets {
    /// An explicit set of identities.
    Identities {
        /// Addressed identities; duplicates collapse.
        ids: BTreeSet<UserId>,
    },
    /// Everyone currently connected, optionally minus one identity.
    AllConnected {
        /// Identity to skip (usually the sender).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        except: Option<UserId>,
    },
}

impl Targets {
    /// Single-identity target.
    pub fn one(id: UserId) -> Self {
        Self::Identities {
            ids: BTreeSet::from([id]),
        }
    }

    /// Explicit target set.
    pub fn many(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self::Identities {
            ids: ids.into_iter().collect(),
        }
    }

    /// Whether this selects nobody without consulting the relay.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Identities { ids } if ids.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_result_wire_shape() {
        let r = DeliveryResult {
            delivered: 1,
            total_targets: 5,
            total_connected: 2,
        };
        let v = serde_json::to_value(r).unwrap();
        assert_eq!(v["delivered"], 1);
        assert_eq!(v["totalTargets"], 5);
        assert_eq!(v["totalConnected"], 2);
    }

    #[test]
    fn targets_many_dedups() {
        let t = Targets::many([UserId::new("a"), UserId::new("a"), UserId::new("b")]);
        match t {
            Targets::Identities { ids } => assert_eq!(ids.len(), 2),
            Targets::AllConnected { .. } => panic!("expected identities"),
        }
    }

    #[test]
    fn empty_targets() {
        assert!(Targets::many(Vec::<UserId>::new()).is_empty());
        assert!(!Targets::one(UserId::new("a")).is_empty());
        assert!(!Targets::AllConnected { except: None }.is_empty());
    }

    #[test]
    fn targets_round_trip_through_json() {
        let t = Targets::AllConnected {
            except: Some(UserId::new("me")),
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["mode"], "allConnected");
        assert_eq!(v["except"], "me");
        let back: Targets = serde_json::from_value(v).unwrap();
        assert_eq!(back, t);
    }
}
