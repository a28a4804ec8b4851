//! HTTP surface: shared state, router, and handlers.
//!
//! | Route | Method | Mounted when |
//! |-------|--------|--------------|
//! | `/ws`, `/notify` | GET (upgrade) | relay runs here |
//! | `/internal/deliver` | POST | relay runs here |
//! | `/notify` | POST | gateway runs here |
//! | `/token`, `/api/livekit/token` | POST | gateway runs here |
//! | `/health`, `/metrics` | GET | always |

pub mod errors;
pub mod notify;
pub mod ops;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{MethodRouter, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tether_settings::ServerSettings;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use errors::ApiError;

use crate::auth::Authenticator;
use crate::gateway::NotificationGateway;
use crate::relay::{SignalingRelay, internal, socket};
use crate::token::TokenBroker;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Relay, when this process hosts sockets.
    pub relay: Option<Arc<SignalingRelay>>,
    /// Gateway, when this process accepts notify requests.
    pub gateway: Option<Arc<NotificationGateway>>,
    /// Token broker; `None` when media credentials are missing.
    pub broker: Option<Arc<TokenBroker>>,
    /// Bearer-token verifier.
    pub auth: Arc<Authenticator>,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
    /// Shared secret for `/internal/deliver`.
    pub internal_token: Option<String>,
}

impl AppState {
    /// State with nothing mounted but health and metrics.
    pub fn new(auth: Authenticator) -> Self {
        Self {
            relay: None,
            gateway: None,
            broker: None,
            auth: Arc::new(auth),
            metrics: None,
            internal_token: None,
        }
    }

    /// Host relay sockets in this process.
    #[must_use]
    pub fn with_relay(mut self, relay: Arc<SignalingRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Accept notify and token requests in this process.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<NotificationGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Issue media grants.
    #[must_use]
    pub fn with_broker(mut self, broker: Option<Arc<TokenBroker>>) -> Self {
        self.broker = broker;
        self
    }

    /// Render metrics from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Require `token` on internal delivery.
    #[must_use]
    pub fn with_internal_token(mut self, token: Option<String>) -> Self {
        self.internal_token = token.filter(|t| !t.is_empty());
        self
    }
}

/// Build the router for whatever components `state` carries.
pub fn router(state: AppState, settings: &ServerSettings) -> Router {
    let mut notify: MethodRouter<AppState> = MethodRouter::new();
    let mut router = Router::new()
        .route("/health", get(ops::health))
        .route("/metrics", get(ops::metrics));

    if state.relay.is_some() {
        notify = notify.get(socket::connect);
        router = router
            .route("/ws", get(socket::connect))
            .route("/internal/deliver", post(internal::deliver));
    }
    if state.gateway.is_some() {
        notify = notify.post(notify::notify);
        router = router
            .route("/token", post(token::issue))
            .route("/api/livekit/token", post(token::issue));
    }

    let router = router
        .route("/notify", notify)
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_millis(settings.request_timeout_ms)))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http());

    if settings.cors_allow_any {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
