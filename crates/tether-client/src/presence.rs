//! Last-seen heartbeat.
//!
//! Once at start and then every interval, the tracker stamps the user's
//! `last_seen` in the data store and broadcasts a `user_presence` event
//! through the gateway. A failed tick is logged and the next one proceeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tether_core::ids::UserId;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::ClientError;

/// Persists last-seen timestamps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Record that `user` was seen at `at`.
    async fn touch(&self, user: &UserId, at: DateTime<Utc>) -> Result<(), ClientError>;
}

/// Tells other connected users about a presence change.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceNotifier: Send + Sync {
    /// Broadcast `user`'s new last-seen time.
    async fn announce(&self, user: &UserId, last_seen: DateTime<Utc>) -> Result<(), ClientError>;
}

/// `profiles.last_seen` in a PostgREST-style data store.
pub struct RestPresenceStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestPresenceStore {
    /// Store against `base_url` (the data store's root URL).
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config {
                reason: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }
}

#[async_trait]
impl PresenceStore for RestPresenceStore {
    async fn touch(&self, user: &UserId, at: DateTime<Utc>) -> Result<(), ClientError> {
        let url = format!("{}/rest/v1/profiles", self.base_url);
        let filter = format!("eq.{user}");
        let response = self
            .client
            .patch(&url)
            .query(&[("id", filter.as_str())])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&json!({ "last_seen": at.to_rfc3339() }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Periodic last-seen refresher for one user.
pub struct PresenceTracker {
    identity: UserId,
    store: Option<Arc<dyn PresenceStore>>,
    notifier: Option<Arc<dyn PresenceNotifier>>,
    interval: Duration,
    nudge: Arc<Notify>,
}

impl PresenceTracker {
    /// Tracker for `identity` ticking every `interval`.
    pub fn new(identity: UserId, interval: Duration) -> Self {
        Self {
            identity,
            store: None,
            notifier: None,
            interval: interval.max(Duration::from_secs(1)),
            nudge: Arc::new(Notify::new()),
        }
    }

    /// Persist ticks to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn PresenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Broadcast ticks through `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn PresenceNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Handle that triggers an immediate tick, e.g. after a reconnect.
    pub fn nudger(&self) -> Arc<Notify> {
        Arc::clone(&self.nudge)
    }

    /// Run one tick. Returns whether every collaborator succeeded.
    pub async fn beat(&self) -> bool {
        let now = Utc::now();
        let mut ok = true;
        if let Some(store) = &self.store {
            if let Err(err) = store.touch(&self.identity, now).await {
                warn!(identity = %self.identity, error = %err, "last-seen update failed");
                ok = false;
            }
        }
        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.announce(&self.identity, now).await {
                warn!(identity = %self.identity, error = %err, "presence broadcast failed");
                ok = false;
            }
        }
        debug!(identity = %self.identity, ok, "presence tick");
        ok
    }

    /// Tick until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                    () = self.nudge.notified() => ticker.reset(),
                }
                let _ = self.beat().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn counting_store(calls: &Arc<AtomicUsize>, fail: bool) -> MockPresenceStore {
        let calls = Arc::clone(calls);
        let mut store = MockPresenceStore::new();
        let _ = store.expect_touch().returning(move |_, _| {
            let _ = calls.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(ClientError::Transport {
                    reason: "offline".into(),
                })
            } else {
                Ok(())
            }
        });
        store
    }

    #[tokio::test]
    async fn beat_touches_store_and_announces() {
        let mut store = MockPresenceStore::new();
        let _ = store
            .expect_touch()
            .withf(|user, _| user.as_str() == "u1")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut notifier = MockPresenceNotifier::new();
        let _ = notifier.expect_announce().times(1).returning(|_, _| Ok(()));

        let tracker = PresenceTracker::new(UserId::new("u1"), Duration::from_secs(45))
            .with_store(Arc::new(store))
            .with_notifier(Arc::new(notifier));
        assert!(tracker.beat().await);
    }

    #[tokio::test]
    async fn store_failure_still_announces() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut notifier = MockPresenceNotifier::new();
        let _ = notifier.expect_announce().times(1).returning(|_, _| Ok(()));

        let tracker = PresenceTracker::new(UserId::new("u1"), Duration::from_secs(45))
            .with_store(Arc::new(counting_store(&calls, true)))
            .with_notifier(Arc::new(notifier));
        assert!(!tracker.beat().await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_immediately_then_every_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tracker = PresenceTracker::new(UserId::new("u1"), Duration::from_secs(45))
            .with_store(Arc::new(counting_store(&calls, false)));
        let cancel = CancellationToken::new();
        let task = tracker.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(100)).await;
        cancel.cancel();
        task.await.unwrap();
        // t = 0, 45, 90
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tracker = PresenceTracker::new(UserId::new("u1"), Duration::from_secs(10))
            .with_store(Arc::new(counting_store(&calls, true)));
        let cancel = CancellationToken::new();
        let task = tracker.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn nudge_forces_a_tick() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tracker = PresenceTracker::new(UserId::new("u1"), Duration::from_secs(45))
            .with_store(Arc::new(counting_store(&calls, false)));
        let nudge = tracker.nudger();
        let cancel = CancellationToken::new();
        let task = tracker.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(5)).await;
        nudge.notify_one();
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rest_store_patches_profile() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.u1"))
            .and(header("apikey", "anon"))
            .and(body_partial_json(serde_json::json!({"last_seen": "2030-01-01T00:00:00+00:00"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = RestPresenceStore::new(&server.uri(), "anon", Duration::from_secs(5)).unwrap();
        let at = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        store.touch(&UserId::new("u1"), at).await.unwrap();
    }

    #[tokio::test]
    async fn rest_store_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let store = RestPresenceStore::new(&server.uri(), "anon", Duration::from_secs(5)).unwrap();
        let err = store.touch(&UserId::new("u1"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 401, .. }));
    }
}
