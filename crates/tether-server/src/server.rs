//! Component wiring and the HTTP listener.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tether_settings::{MembershipSource, ServerSettings, TetherSettings};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::auth::Authenticator;
use crate::gateway::{
    MembershipError, MembershipStore, NotificationGateway, RestMembership, StaticMembership,
};
use crate::http::{self, AppState};
use crate::relay::{DeliveryError, FrameDelivery, RemoteRelay, SignalingRelay};
use crate::token::TokenBroker;

/// Which components this process runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMode {
    /// Gateway and relay in one process.
    Full,
    /// Sockets and `/internal/deliver` only.
    RelayOnly,
    /// Notify and token endpoints, delivering through a remote relay.
    GatewayOnly {
        /// Base URL of the relay process.
        relay_url: String,
    },
}

impl ServerMode {
    /// Label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::RelayOnly => "relay",
            Self::GatewayOnly { .. } => "gateway",
        }
    }
}

/// Startup and listener failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// OS error.
        source: std::io::Error,
    },
    /// The listener failed while serving.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
    /// Membership store could not be built.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    /// Remote relay client could not be built.
    #[error(transparent)]
    Relay(#[from] DeliveryError),
}

/// Build handler state for `mode` from settings.
pub fn build_state(
    mode: &ServerMode,
    settings: &TetherSettings,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, ServerError> {
    let timeout = Duration::from_millis(settings.server.request_timeout_ms);
    let mut state = AppState::new(Authenticator::new(&settings.auth))
        .with_internal_token(settings.relay.internal_token.clone());
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let local_relay = match mode {
        ServerMode::Full | ServerMode::RelayOnly => {
            let relay = Arc::new(SignalingRelay::new(&settings.relay));
            state = state.with_relay(Arc::clone(&relay));
            Some(relay)
        }
        ServerMode::GatewayOnly { .. } => None,
    };

    let delivery: Option<Arc<dyn FrameDelivery>> = match (mode, local_relay) {
        (ServerMode::RelayOnly, _) => None,
        (ServerMode::GatewayOnly { relay_url }, _) => {
            let remote = RemoteRelay::new(relay_url, settings.relay.internal_token.clone(), timeout)?;
            Some(Arc::new(remote) as Arc<dyn FrameDelivery>)
        }
        (ServerMode::Full, Some(relay)) => Some(relay as Arc<dyn FrameDelivery>),
        (ServerMode::Full, None) => None,
    };

    if let Some(delivery) = delivery {
        let membership: Arc<dyn MembershipStore> = match settings.membership.source {
            MembershipSource::Static => {
                Arc::new(StaticMembership::new(&settings.membership.communities))
            }
            MembershipSource::Rest => {
                Arc::new(RestMembership::from_settings(&settings.membership, timeout)?)
            }
        };
        state = state.with_gateway(Arc::new(NotificationGateway::new(delivery, membership)));

        let broker = match TokenBroker::new(&settings.media) {
            Ok(broker) => Some(Arc::new(broker)),
            Err(e) => {
                warn!(error = %e, "token endpoint will return errors");
                None
            }
        };
        state = state.with_broker(broker);
    }

    Ok(state)
}

/// Bind `host:port` from settings.
pub async fn bind(settings: &ServerSettings) -> Result<TcpListener, ServerError> {
    let addr = format!("{}:{}", settings.host, settings.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// On shutdown every relay socket is closed before in-flight HTTP requests
/// are drained.
pub async fn serve_listener<F>(
    listener: TcpListener,
    state: AppState,
    settings: &ServerSettings,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr: Option<SocketAddr> = listener.local_addr().ok();
    let relay = state.relay.clone();
    let router = http::router(state, settings);

    info!(addr = ?local_addr, "tether server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            if let Some(relay) = relay {
                relay.shutdown();
            }
        })
        .await
        .map_err(ServerError::Serve)?;
    info!("tether server stopped");
    Ok(())
}

/// Build, bind and serve `mode` until `shutdown` resolves.
pub async fn run<F>(
    mode: ServerMode,
    settings: &TetherSettings,
    metrics: Option<PrometheusHandle>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let state = build_state(&mode, settings, metrics)?;
    let listener = bind(&settings.server).await?;
    info!(
        mode = mode.as_str(),
        auth = state.auth.is_enabled(),
        media = state.broker.is_some(),
        "starting tether"
    );
    serve_listener(listener, state, &settings.server, shutdown).await
}
