//! The session's one relay socket.
//!
//! [`RelayConnection`] owns a background task that connects, forwards
//! decoded frames, and reconnects with jittered exponential backoff when
//! the socket drops. It is created once per session and torn down with
//! [`RelayConnection::shutdown`]; nothing about it is global.

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tether_core::frames::SignalFrame;
use tether_core::ids::{CommunityId, UserId};
use tether_core::retry::Backoff;
use tether_settings::RetrySettings;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket link state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    /// First connection attempt in flight.
    Connecting,
    /// Socket open.
    Connected,
    /// Waiting to retry; `attempt` counts failures since the last success.
    Reconnecting {
        /// Consecutive failed or dropped connections.
        attempt: u32,
    },
    /// Shut down; no further attempts.
    Closed,
}

/// Build the relay socket URL for `identity`.
///
/// Accepts `http(s)` or `ws(s)` base URLs and targets `/notify` under the
/// base path.
pub fn socket_url(
    base: &str,
    identity: &UserId,
    community: Option<&CommunityId>,
) -> Result<Url, ClientError> {
    if identity.is_blank() {
        return Err(ClientError::Config {
            reason: "identity is empty".into(),
        });
    }
    let mut url = Url::parse(base.trim()).map_err(|e| ClientError::Config {
        reason: format!("invalid relay url {base:?}: {e}"),
    })?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::Config {
                reason: format!("unsupported relay url scheme {other:?}"),
            });
        }
    };
    url.set_scheme(scheme).map_err(|()| ClientError::Config {
        reason: format!("cannot use scheme {scheme} for {base:?}"),
    })?;

    let path = format!("{}/notify", url.path().trim_end_matches('/'));
    url.set_path(&path);
    {
        let mut query = url.query_pairs_mut();
        let _ = query.clear().append_pair("identity", identity.as_str());
        if let Some(community) = community {
            let _ = query.append_pair("communityId", community.as_str());
        }
    }
    Ok(url)
}

/// Owned, reconnecting relay socket.
pub struct RelayConnection {
    status: watch::Receiver<LinkStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RelayConnection {
    /// Start connecting to `url`, forwarding frames into `frames`.
    ///
    /// The connection stops on its own if `frames` is dropped.
    pub fn open(url: Url, retry: &RetrySettings, frames: mpsc::Sender<SignalFrame>) -> Self {
        let backoff = Backoff::from_millis(retry.base_delay_ms, retry.max_delay_ms, retry.jitter_factor);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connecting);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(url, backoff, frames, status_tx, cancel.clone()));
        Self {
            status: status_rx,
            cancel,
            task: Some(task),
        }
    }

    /// Current link state.
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Watch link state changes.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Close the socket and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else { return };
        if let Err(err) = task.await {
            warn!(error = %err, "relay connection task failed");
        }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum PumpEnd {
    Cancelled,
    ReceiverGone,
    Disconnected(String),
}

async fn run(
    url: Url,
    backoff: Backoff,
    frames: mpsc::Sender<SignalFrame>,
    status: watch::Sender<LinkStatus>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    loop {
        let connected = tokio::select! {
            () = cancel.cancelled() => break,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((socket, _)) => {
                attempt = 0;
                let _ = status.send_replace(LinkStatus::Connected);
                info!(url = %url, "relay connected");
                match pump(socket, &frames, &cancel).await {
                    PumpEnd::Cancelled | PumpEnd::ReceiverGone => break,
                    PumpEnd::Disconnected(reason) => {
                        warn!(url = %url, reason = %reason, "relay connection lost");
                    }
                }
            }
            Err(err) => {
                warn!(url = %url, attempt, error = %err, "relay connect failed");
            }
        }

        let delay = backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        let _ = status.send_replace(LinkStatus::Reconnecting { attempt });
        debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), attempt, "relay reconnect scheduled");
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    let _ = status.send_replace(LinkStatus::Closed);
    debug!(url = %url, "relay connection closed");
}

async fn pump(
    mut socket: Socket,
    frames: &mpsc::Sender<SignalFrame>,
    cancel: &CancellationToken,
) -> PumpEnd {
    loop {
        let msg = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = socket.close(None).await;
                return PumpEnd::Cancelled;
            }
            () = frames.closed() => {
                let _ = socket.close(None).await;
                return PumpEnd::ReceiverGone;
            }
            msg = socket.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => match SignalFrame::parse(text.as_str()) {
                Ok(Some(frame)) => {
                    debug!(kind = frame.kind(), "relay frame");
                    if frames.send(frame).await.is_err() {
                        let _ = socket.close(None).await;
                        return PumpEnd::ReceiverGone;
                    }
                }
                Ok(None) => debug!("ignoring frame of unknown type"),
                Err(err) => warn!(error = %err, "malformed relay frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(|| "closed by relay".to_string(), |f| f.reason.as_str().to_string());
                return PumpEnd::Disconnected(reason);
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => return PumpEnd::Disconnected(err.to_string()),
            None => return PumpEnd::Disconnected("stream ended".into()),
        }
    }
}
