//! WebSocket accept and the per-connection write loop.
//!
//! Each accepted socket gets one task that owns both halves of the socket.
//! The task drains the connection's outbound queue, pings on the heartbeat
//! interval, and watches the read half only to notice the client leaving;
//! the relay is push-only so inbound text is ignored.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tether_core::ids::{CommunityId, UserId};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::connection::ClientConnection;
use super::signaling::{CloseReason, SignalingRelay};
use crate::http::{ApiError, AppState};

/// Query parameters of a relay socket request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Identity to subscribe as.
    #[serde(default, alias = "userId")]
    pub identity: Option<String>,
    /// Community to subscribe to.
    #[serde(default)]
    pub community_id: Option<String>,
}

impl ConnectParams {
    fn into_parts(self) -> Result<(UserId, Option<CommunityId>), ApiError> {
        let identity = self
            .identity
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::validation("Missing identity"))?;
        let community = self
            .community_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(CommunityId::new);
        Ok((UserId::new(identity), community))
    }
}

/// `GET /ws` and `GET /notify`: upgrade to a relay socket.
///
/// Parameters are validated before the upgrade so a bad request gets a
/// plain 400 instead of an open socket.
pub async fn connect(
    State(state): State<AppState>,
    params: Result<Query<ConnectParams>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let parts = params
        .map_err(ApiError::from)
        .and_then(|Query(p)| p.into_parts());
    let (identity, community) = match parts {
        Ok(parts) => parts,
        Err(e) => return e.into_response(),
    };
    let Some(relay) = state.relay.clone() else {
        return ApiError::internal("relay not running").into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| async move {
        let (conn, rx) = relay.accept_connection(identity, community);
        run_socket(socket, relay, conn, rx).await;
    })
}

async fn run_socket(
    socket: WebSocket,
    relay: Arc<SignalingRelay>,
    conn: Arc<ClientConnection>,
    mut rx: mpsc::Receiver<Arc<String>>,
) {
    let (mut sink, mut stream) = socket.split();
    let closed = conn.close_token().clone();

    let mut heartbeat = tokio::time::interval(relay.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = heartbeat.tick().await;

    let reason = loop {
        tokio::select! {
            biased;
            () = closed.cancelled() => break CloseReason::Shutdown,
            frame = rx.recv() => {
                let Some(text) = frame else {
                    break CloseReason::Shutdown;
                };
                if let Err(e) = sink.send(Message::Text(text.to_string().into())).await {
                    debug!(conn_id = %conn.id, error = %e, "socket write failed");
                    break CloseReason::TransportError;
                }
            }
            _ = heartbeat.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break CloseReason::TransportError;
                }
            }
            inbound = stream.next() => match inbound {
                None | Some(Ok(Message::Close(_))) => break CloseReason::ClientClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %conn.id, error = %e, "socket read failed");
                    break CloseReason::TransportError;
                }
            },
        }
    };

    let _ = sink.send(Message::Close(None)).await;
    relay.on_close(&conn.id, reason);
}
