//! One live relay socket, as seen by the delivery path.
//!
//! The socket task owns the actual WebSocket; everyone else holds an
//! `Arc<ClientConnection>` and talks to it through the bounded outbound
//! queue, so a slow client never blocks a fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tether_core::ids::{CommunityId, ConnectionId, UserId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Result of queueing one frame on one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame queued for the socket writer.
    Queued,
    /// Outbound queue full; the frame was dropped for this connection.
    Full,
    /// Connection already closed; nothing was queued.
    Closed,
}

/// A registered relay connection.
#[derive(Debug)]
pub struct ClientConnection {
    /// Connection handle.
    pub id: ConnectionId,
    /// Identity the socket was opened for.
    pub identity: UserId,
    /// Community the socket subscribed to, if any.
    pub community_id: Option<CommunityId>,
    /// When the socket was accepted.
    pub connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Arc<String>>,
    drops: AtomicU64,
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a connection around an outbound queue sender.
    ///
    /// `closed` should be a child of the relay's shutdown token so a server
    /// shutdown closes every socket.
    pub fn new(
        identity: UserId,
        community_id: Option<CommunityId>,
        tx: mpsc::Sender<Arc<String>>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            identity,
            community_id,
            connected_at: Utc::now(),
            tx,
            drops: AtomicU64::new(0),
            closed,
        }
    }

    /// Queue a serialized frame without waiting.
    pub fn send(&self, frame: Arc<String>) -> SendOutcome {
        if self.closed.is_cancelled() {
            return SendOutcome::Closed;
        }
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Lifetime count of frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Mark the connection closed. The socket task observes this and exits.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the connection is closed.
    pub fn close_token(&self) -> &CancellationToken {
        &self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(UserId::new("u1"), None, tx, CancellationToken::new());
        (conn, rx)
    }

    #[tokio::test]
    async fn send_queues_frame() {
        let (conn, mut rx) = make(4);
        assert_eq!(conn.send(Arc::new("hi".into())), SendOutcome::Queued);
        assert_eq!(&*rx.recv().await.unwrap(), "hi");
    }

    #[test]
    fn full_queue_counts_drops() {
        let (conn, _rx) = make(1);
        assert_eq!(conn.send(Arc::new("a".into())), SendOutcome::Queued);
        assert_eq!(conn.send(Arc::new("b".into())), SendOutcome::Full);
        assert_eq!(conn.send(Arc::new("c".into())), SendOutcome::Full);
        assert_eq!(conn.drop_count(), 2);
    }

    #[test]
    fn send_after_close_is_rejected() {
        let (conn, mut rx) = make(4);
        conn.close();
        assert!(conn.is_closed());
        assert_eq!(conn.send(Arc::new("a".into())), SendOutcome::Closed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_after_receiver_dropped_is_closed() {
        let (conn, rx) = make(4);
        drop(rx);
        assert_eq!(conn.send(Arc::new("a".into())), SendOutcome::Closed);
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn connection_ids_are_unique() {
        let (a, _ra) = make(1);
        let (b, _rb) = make(1);
        assert_ne!(a.id, b.id);
    }
}
