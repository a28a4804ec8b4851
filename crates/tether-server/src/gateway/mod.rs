//! Notification gateway: classify notify events and fan them out.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `event` | Notify body → [`NotificationEvent`] classification |
//! | `membership` | [`MembershipStore`] trait, static and REST implementations |
//! | `errors` | [`GatewayError`] |
//!
//! The gateway holds no state of its own. Every event resolves to a target
//! set and a single relay push.

pub mod errors;
pub mod event;
pub mod membership;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tether_core::delivery::{DeliveryResult, Targets};
use tether_core::ids::UserId;
use tracing::{debug, instrument, warn};

pub use errors::GatewayError;
pub use event::{EventKind, NotificationEvent, Route};
pub use membership::{MembershipError, MembershipStore, RestMembership, StaticMembership};

use crate::metrics::{
    GATEWAY_DELIVERED_TOTAL, GATEWAY_DURATION_SECONDS, GATEWAY_ERRORS_TOTAL, GATEWAY_EVENTS_TOTAL,
};
use crate::relay::FrameDelivery;

/// Classifies notify events and pushes them through a relay.
pub struct NotificationGateway {
    relay: Arc<dyn FrameDelivery>,
    membership: Arc<dyn MembershipStore>,
}

impl NotificationGateway {
    /// Create a gateway over a relay and a membership store.
    pub fn new(relay: Arc<dyn FrameDelivery>, membership: Arc<dyn MembershipStore>) -> Self {
        Self { relay, membership }
    }

    /// Handle one event.
    ///
    /// Offline recipients are a success with a lower `delivered` count.
    /// Only membership or relay failures are errors.
    #[instrument(skip_all, fields(kind = event.kind().as_str(), event_type = ?event.event_type))]
    pub async fn handle(&self, event: NotificationEvent) -> Result<DeliveryResult, GatewayError> {
        let kind = event.kind();
        let start = Instant::now();
        let result = self.dispatch(&event).await;
        let elapsed = start.elapsed().as_secs_f64();

        counter!(GATEWAY_EVENTS_TOTAL, "kind" => kind.as_str()).increment(1);
        histogram!(GATEWAY_DURATION_SECONDS, "kind" => kind.as_str()).record(elapsed);
        match &result {
            Ok(r) => {
                counter!(GATEWAY_DELIVERED_TOTAL, "kind" => kind.as_str())
                    .increment(r.delivered as u64);
                debug!(
                    delivered = r.delivered,
                    total_targets = r.total_targets,
                    total_connected = r.total_connected,
                    "notification handled"
                );
            }
            Err(e) => {
                counter!(GATEWAY_ERRORS_TOTAL, "kind" => kind.as_str(), "code" => e.code().as_str())
                    .increment(1);
                warn!(error = %e, details = ?e.details(), "notification failed");
            }
        }
        result
    }

    async fn dispatch(&self, event: &NotificationEvent) -> Result<DeliveryResult, GatewayError> {
        match &event.route {
            Route::Direct { recipient } => {
                self.push(
                    Targets::one(recipient.clone()),
                    event,
                    "Failed to notify signaling server",
                )
                .await
            }
            Route::PresenceBroadcast => {
                let targets = Targets::AllConnected {
                    except: event.sender.clone(),
                };
                self.push(targets, event, "Failed to broadcast notification").await
            }
            Route::CommunityBroadcast {
                community_id,
                exclude,
            } => {
                let members = self
                    .membership
                    .members(community_id)
                    .await
                    .map_err(|e| GatewayError::membership(&e))?;
                let targets = community_targets(members, exclude.as_ref(), event.sender.as_ref());
                if targets.is_empty() {
                    debug!(community_id = %community_id, "no community members to notify");
                    return Ok(DeliveryResult::EMPTY);
                }
                self.push(
                    Targets::Identities { ids: targets },
                    event,
                    "Failed to broadcast to community",
                )
                .await
            }
        }
    }

    async fn push(
        &self,
        targets: Targets,
        event: &NotificationEvent,
        failure: &str,
    ) -> Result<DeliveryResult, GatewayError> {
        self.relay
            .deliver(targets, event.frame())
            .await
            .map_err(|e| GatewayError::delivery(failure, &e))
    }
}

/// Membership minus the excluded member and the sender.
fn community_targets(
    members: Vec<UserId>,
    exclude: Option<&UserId>,
    sender: Option<&UserId>,
) -> BTreeSet<UserId> {
    members
        .into_iter()
        .filter(|m| Some(m) != exclude && Some(m) != sender)
        .collect()
}
