//! The in-process relay: connection lifecycle and best-effort fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde_json::Value;
use tether_core::delivery::{DeliveryResult, Targets};
use tether_core::ids::{CommunityId, ConnectionId, UserId};
use tether_settings::RelaySettings;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, SendOutcome};
use super::delivery::{DeliveryError, FrameDelivery};
use super::registry::ConnectionRegistry;
use crate::metrics::{
    RELAY_CONNECTION_DURATION_SECONDS, RELAY_CONNECTIONS_ACTIVE, RELAY_CONNECTIONS_TOTAL,
    RELAY_DISCONNECTIONS_TOTAL, RELAY_SEND_DROPS_TOTAL,
};

/// Why a connection left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Client closed the socket or the stream ended.
    ClientClosed,
    /// A socket read or write failed.
    TransportError,
    /// The outbound queue stayed full for too long.
    SlowConsumer,
    /// Server shutdown.
    Shutdown,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::SlowConsumer => "slow_consumer",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Socket relay: owns the registry and pushes frames to live connections.
pub struct SignalingRelay {
    registry: ConnectionRegistry,
    heartbeat_interval: Duration,
    max_total_drops: u64,
}

impl SignalingRelay {
    /// Create a relay from settings.
    pub fn new(settings: &RelaySettings) -> Self {
        Self {
            registry: ConnectionRegistry::new(settings.outbound_capacity),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            max_total_drops: settings.max_total_drops.max(1),
        }
    }

    /// Register an accepted socket.
    pub fn accept_connection(
        &self,
        identity: UserId,
        community_id: Option<CommunityId>,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (conn, rx) = self.registry.register(identity, community_id);
        counter!(RELAY_CONNECTIONS_TOTAL).increment(1);
        gauge!(RELAY_CONNECTIONS_ACTIVE).set(self.registry.connection_count() as f64);
        info!(
            conn_id = %conn.id,
            identity = %conn.identity,
            community_id = ?conn.community_id.as_ref().map(CommunityId::as_str),
            "relay connection accepted"
        );
        (conn, rx)
    }

    /// Remove a connection. Every accepted connection reaches this at least
    /// once; only the first call has any effect.
    pub fn on_close(&self, id: &ConnectionId, reason: CloseReason) {
        let Some(conn) = self.registry.unregister(id) else {
            return;
        };
        let lifetime = (Utc::now() - conn.connected_at).num_milliseconds().max(0) as f64 / 1000.0;
        counter!(RELAY_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        histogram!(RELAY_CONNECTION_DURATION_SECONDS).record(lifetime);
        gauge!(RELAY_CONNECTIONS_ACTIVE).set(self.registry.connection_count() as f64);
        info!(
            conn_id = %conn.id,
            identity = %conn.identity,
            reason = reason.as_str(),
            lifetime_secs = lifetime,
            "relay connection closed"
        );
    }

    /// Push `frame` to every live connection of every identity in `targets`.
    ///
    /// Non-blocking and non-queuing: identities with no live connection
    /// count as not delivered and the frame is discarded for them. A
    /// connection whose queue is closed, or which has exceeded the drop
    /// budget, is closed without affecting the others.
    pub fn deliver_now(&self, targets: &Targets, frame: &Value) -> DeliveryResult {
        let payload = Arc::new(frame.to_string());
        let mut to_close = Vec::new();

        let result = self.registry.with_resolved(targets, |total_targets, resolved| {
            let mut result = DeliveryResult {
                total_targets,
                ..DeliveryResult::EMPTY
            };
            for (identity, conns) in resolved {
                let mut live = false;
                let mut accepted = false;
                for conn in conns {
                    match conn.send(Arc::clone(&payload)) {
                        SendOutcome::Queued => {
                            live = true;
                            accepted = true;
                        }
                        SendOutcome::Full => {
                            live = true;
                            counter!(RELAY_SEND_DROPS_TOTAL).increment(1);
                            let drops = conn.drop_count();
                            if drops >= self.max_total_drops {
                                warn!(conn_id = %conn.id, %identity, drops, "disconnecting slow client");
                                to_close.push((conn.id.clone(), CloseReason::SlowConsumer));
                            } else {
                                warn!(conn_id = %conn.id, %identity, total_drops = drops, "outbound queue full, frame dropped");
                            }
                        }
                        SendOutcome::Closed => {
                            debug!(conn_id = %conn.id, %identity, "connection closed during delivery");
                            to_close.push((conn.id.clone(), CloseReason::TransportError));
                        }
                    }
                }
                if live {
                    result.total_connected += 1;
                }
                if accepted {
                    result.delivered += 1;
                }
            }
            result
        });

        for (id, reason) in to_close {
            self.on_close(&id, reason);
        }

        debug!(
            frame_type = frame.get("type").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            delivered = result.delivered,
            total_targets = result.total_targets,
            total_connected = result.total_connected,
            "relay delivery"
        );
        result
    }

    /// Close every connection.
    pub fn shutdown(&self) {
        info!(
            connections = self.registry.connection_count(),
            "relay shutting down"
        );
        self.registry.close_all();
    }

    /// Interval between server pings.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }
}

#[async_trait]
impl FrameDelivery for SignalingRelay {
    async fn deliver(&self, targets: Targets, frame: Value) -> Result<DeliveryResult, DeliveryError> {
        Ok(self.deliver_now(&targets, &frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relay() -> SignalingRelay {
        SignalingRelay::new(&RelaySettings::default())
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    #[test]
    fn deliver_to_never_registered_identity() {
        let relay = relay();
        let r = relay.deliver_now(&Targets::one(uid("ghost")), &json!({"type": "ping"}));
        assert_eq!(r, DeliveryResult { delivered: 0, total_targets: 1, total_connected: 0 });
    }

    #[tokio::test]
    async fn deliver_pushes_frame_text() {
        let relay = relay();
        let (_conn, mut rx) = relay.accept_connection(uid("u2"), None);
        let r = relay.deliver_now(&Targets::one(uid("u2")), &json!({"type": "ping", "n": 1}));
        assert_eq!(r.delivered, 1);
        let text = rx.recv().await.unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "ping");
        assert_eq!(v["n"], 1);
    }

    #[test]
    fn multi_device_counts_once_per_identity() {
        let relay = relay();
        let (_a, mut ra) = relay.accept_connection(uid("u1"), None);
        let (_b, mut rb) = relay.accept_connection(uid("u1"), None);
        let r = relay.deliver_now(&Targets::one(uid("u1")), &json!({"type": "x"}));
        assert_eq!(r.delivered, 1);
        assert_eq!(r.total_connected, 1);
        assert!(ra.try_recv().is_ok());
        assert!(rb.try_recv().is_ok());
    }

    #[test]
    fn delivered_equals_connected_subset() {
        let relay = relay();
        let mut rxs = Vec::new();
        for id in ["a", "b", "c"] {
            let (_c, rx) = relay.accept_connection(uid(id), None);
            rxs.push(rx);
        }
        let targets = Targets::many(["a", "b", "c", "d", "e", "f"].map(uid));
        let r = relay.deliver_now(&targets, &json!({"type": "x"}));
        assert_eq!(r, DeliveryResult { delivered: 3, total_targets: 6, total_connected: 3 });
    }

    #[test]
    fn closed_connection_is_not_counted_and_is_removed() {
        let relay = relay();
        let (dead, dead_rx) = relay.accept_connection(uid("u1"), None);
        let (_live, mut live_rx) = relay.accept_connection(uid("u1"), None);
        drop(dead_rx);

        let r = relay.deliver_now(&Targets::one(uid("u1")), &json!({"type": "x"}));
        assert_eq!(r.delivered, 1);
        assert!(live_rx.try_recv().is_ok());
        assert!(relay.registry().get(&dead.id).is_none());
        assert_eq!(relay.registry().connection_count(), 1);
    }

    #[test]
    fn identity_with_only_dead_connections_is_not_delivered() {
        let relay = relay();
        let (_dead, dead_rx) = relay.accept_connection(uid("u1"), None);
        drop(dead_rx);
        let r = relay.deliver_now(&Targets::one(uid("u1")), &json!({"type": "x"}));
        assert_eq!(r, DeliveryResult { delivered: 0, total_targets: 1, total_connected: 0 });
        assert_eq!(relay.registry().identity_count(), 0);
    }

    #[test]
    fn shut_down_connections_do_not_count_as_connected() {
        let relay = relay();
        let (_a, _ra) = relay.accept_connection(uid("u1"), None);
        let (_b, _rb) = relay.accept_connection(uid("u2"), None);
        relay.shutdown();

        let r = relay.deliver_now(&Targets::many([uid("u1"), uid("u2")]), &json!({"type": "x"}));
        assert_eq!(r, DeliveryResult { delivered: 0, total_targets: 2, total_connected: 0 });
        assert_eq!(relay.registry().connection_count(), 0);
    }

    #[test]
    fn slow_client_is_disconnected_after_drop_budget() {
        let relay = SignalingRelay::new(&RelaySettings {
            outbound_capacity: 1,
            max_total_drops: 3,
            ..RelaySettings::default()
        });
        let (slow, _slow_rx) = relay.accept_connection(uid("slow"), None);
        let (_fast, mut fast_rx) = relay.accept_connection(uid("fast"), None);
        let targets = Targets::many([uid("slow"), uid("fast")]);

        for _ in 0..4 {
            let _ = relay.deliver_now(&targets, &json!({"type": "x"}));
            while fast_rx.try_recv().is_ok() {}
        }
        assert!(slow.is_closed());
        assert_eq!(relay.registry().connection_count(), 1);

        let r = relay.deliver_now(&targets, &json!({"type": "x"}));
        assert_eq!(r.delivered, 1);
    }

    #[test]
    fn all_connected_excludes_sender() {
        let relay = relay();
        let (_a, mut ra) = relay.accept_connection(uid("me"), None);
        let (_b, mut rb) = relay.accept_connection(uid("you"), None);
        let r = relay.deliver_now(
            &Targets::AllConnected { except: Some(uid("me")) },
            &json!({"type": "user_presence", "userId": "me"}),
        );
        assert_eq!(r, DeliveryResult { delivered: 1, total_targets: 1, total_connected: 1 });
        assert!(ra.try_recv().is_err());
        assert!(rb.try_recv().is_ok());
    }

    #[test]
    fn on_close_only_takes_effect_once() {
        let relay = relay();
        let (conn, _rx) = relay.accept_connection(uid("u1"), None);
        relay.on_close(&conn.id, CloseReason::ClientClosed);
        relay.on_close(&conn.id, CloseReason::TransportError);
        assert_eq!(relay.registry().connection_count(), 0);
    }

    #[test]
    fn no_delivery_after_close() {
        let relay = relay();
        let (conn, mut rx) = relay.accept_connection(uid("u1"), None);
        relay.on_close(&conn.id, CloseReason::ClientClosed);
        let r = relay.deliver_now(&Targets::one(uid("u1")), &json!({"type": "x"}));
        assert_eq!(r.delivered, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn trait_delivery_never_fails_in_process() {
        let relay = relay();
        let r = FrameDelivery::deliver(&relay, Targets::one(uid("u")), json!({"type": "x"}))
            .await
            .unwrap();
        assert_eq!(r.delivered, 0);
    }

    #[test]
    fn concurrent_churn_never_queues_after_unregister() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let relay = SignalingRelay::new(&RelaySettings {
            outbound_capacity: 1024,
            max_total_drops: u64::MAX,
            ..RelaySettings::default()
        });
        let identities: Vec<UserId> = (0..4).map(|i| uid(&format!("u{i}"))).collect();
        let targets = Targets::many(identities.clone());
        let done = AtomicBool::new(false);

        let closed_receivers = std::thread::scope(|scope| {
            for _ in 0..3 {
                let _ = scope.spawn(|| {
                    while !done.load(Ordering::Relaxed) {
                        let r = relay.deliver_now(&targets, &json!({"type": "x"}));
                        assert!(r.delivered <= r.total_connected);
                        assert!(r.total_connected <= r.total_targets);
                        let _ = relay.deliver_now(
                            &Targets::AllConnected { except: None },
                            &json!({"type": "user_presence"}),
                        );
                    }
                });
            }

            let churners: Vec<_> = identities
                .iter()
                .map(|identity| {
                    let relay = &relay;
                    scope.spawn(move || {
                        let mut closed = Vec::new();
                        for _ in 0..200 {
                            let (conn, mut rx) =
                                relay.accept_connection(identity.clone(), Some(CommunityId::new("c")));
                            std::thread::yield_now();
                            let removed = relay.registry().unregister(&conn.id);
                            assert!(removed.is_some());
                            while rx.try_recv().is_ok() {}
                            closed.push(rx);
                        }
                        closed
                    })
                })
                .collect();

            let closed: Vec<_> = churners
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect();
            done.store(true, Ordering::Relaxed);
            closed
        });

        for mut rx in closed_receivers {
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(relay.registry().connection_count(), 0);
        assert_eq!(relay.registry().identity_count(), 0);
        assert_eq!(relay.registry().community_count(), 0);
    }

    #[test]
    fn shutdown_closes_connections() {
        let relay = relay();
        let (conn, _rx) = relay.accept_connection(uid("u1"), None);
        relay.shutdown();
        assert!(conn.is_closed());
    }
}
