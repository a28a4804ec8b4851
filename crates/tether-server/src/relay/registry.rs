//! Identity → live connections, plus community subscriptions.
//!
//! A single `RwLock` guards all three indexes so that register, unregister
//! and target resolution each see one consistent view. Deliveries queue
//! frames while holding the read lock; queueing never waits, and it means
//! a connection returned by `unregister` can no longer receive anything.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tether_core::delivery::Targets;
use tether_core::ids::{CommunityId, ConnectionId, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Connections resolved for one identity at delivery time.
pub type ResolvedTarget = (UserId, Vec<Arc<ClientConnection>>);

#[derive(Default)]
struct Indexes {
    by_id: HashMap<ConnectionId, Arc<ClientConnection>>,
    by_identity: HashMap<UserId, HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Community → subscribed identity → number of sockets subscribed.
    by_community: HashMap<CommunityId, HashMap<UserId, usize>>,
}

/// Registry of live relay connections.
pub struct ConnectionRegistry {
    inner: RwLock<Indexes>,
    outbound_capacity: usize,
    shutdown: CancellationToken,
}

impl ConnectionRegistry {
    /// Create a registry whose connections buffer `outbound_capacity` frames.
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Indexes::default()),
            outbound_capacity: outbound_capacity.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register a connection for `identity`.
    ///
    /// Returns the connection and the receiving end of its outbound queue.
    /// The caller must eventually pass the connection id to
    /// [`unregister`](Self::unregister).
    pub fn register(
        &self,
        identity: UserId,
        community_id: Option<CommunityId>,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let conn = Arc::new(ClientConnection::new(
            identity.clone(),
            community_id.clone(),
            tx,
            self.shutdown.child_token(),
        ));

        let mut idx = self.inner.write();
        let _ = idx.by_id.insert(conn.id.clone(), Arc::clone(&conn));
        let _ = idx
            .by_identity
            .entry(identity.clone())
            .or_default()
            .insert(conn.id.clone(), Arc::clone(&conn));
        if let Some(community) = community_id {
            *idx.by_community
                .entry(community)
                .or_default()
                .entry(identity)
                .or_insert(0) += 1;
        }
        (conn, rx)
    }

    /// Remove a connection from every index and mark it closed.
    ///
    /// Returns the connection the first time it is called for an id and
    /// `None` afterwards. Closing happens under the write lock, so no
    /// delivery can resolve the connection after this returns.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let mut idx = self.inner.write();
        let conn = idx.by_id.remove(id)?;
        conn.close();

        if let Some(conns) = idx.by_identity.get_mut(&conn.identity) {
            let _ = conns.remove(id);
            if conns.is_empty() {
                let _ = idx.by_identity.remove(&conn.identity);
            }
        }

        if let Some(community) = &conn.community_id {
            if let Some(members) = idx.by_community.get_mut(community) {
                if let Some(count) = members.get_mut(&conn.identity) {
                    *count -= 1;
                    if *count == 0 {
                        let _ = members.remove(&conn.identity);
                    }
                }
                if members.is_empty() {
                    let _ = idx.by_community.remove(community);
                }
            }
        }
        Some(conn)
    }

    /// Live connections for `identity`.
    pub fn connections_for(&self, identity: &UserId) -> Vec<Arc<ClientConnection>> {
        self.inner
            .read()
            .by_identity
            .get(identity)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Identities currently subscribed to `community`.
    ///
    /// Only connected identities appear; true membership lives in the data
    /// store.
    pub fn community_members(&self, community: &CommunityId) -> HashSet<UserId> {
        self.inner
            .read()
            .by_community
            .get(community)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every identity with at least one live connection.
    pub fn connected_identities(&self) -> Vec<UserId> {
        self.inner.read().by_identity.keys().cloned().collect()
    }

    /// Resolve `targets` to connections under one read lock.
    ///
    /// Returns the size of the target set and, for each target with at least
    /// one live connection, the connections to push to.
    pub fn resolve(&self, targets: &Targets) -> (usize, Vec<ResolvedTarget>) {
        Self::resolve_in(&self.inner.read(), targets)
    }

    fn resolve_in(idx: &Indexes, targets: &Targets) -> (usize, Vec<ResolvedTarget>) {
        match targets {
            Targets::Identities { ids } => {
                let resolved = ids
                    .iter()
                    .filter_map(|id| {
                        idx.by_identity
                            .get(id)
                            .map(|conns| (id.clone(), conns.values().cloned().collect()))
                    })
                    .collect();
                (ids.len(), resolved)
            }
            Targets::AllConnected { except } => {
                let resolved: Vec<ResolvedTarget> = idx
                    .by_identity
                    .iter()
                    .filter(|(id, _)| Some(*id) != except.as_ref())
                    .map(|(id, conns)| (id.clone(), conns.values().cloned().collect()))
                    .collect();
                (resolved.len(), resolved)
            }
        }
    }

    /// Resolve `targets` and run `f` on the result before the read lock is
    /// released.
    ///
    /// `f` must not block or touch the registry; it is meant for queueing
    /// frames with `try_send`.
    pub fn with_resolved<R>(
        &self,
        targets: &Targets,
        f: impl FnOnce(usize, &[ResolvedTarget]) -> R,
    ) -> R {
        let idx = self.inner.read();
        let (total, resolved) = Self::resolve_in(&idx, targets);
        f(total, &resolved)
    }

    /// Look up a connection by handle.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.inner.read().by_id.get(id).cloned()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Number of identities with at least one live connection.
    pub fn identity_count(&self) -> usize {
        self.inner.read().by_identity.len()
    }

    /// Number of communities with at least one subscribed connection.
    pub fn community_count(&self) -> usize {
        self.inner.read().by_community.len()
    }

    /// Close every connection, current and future.
    pub fn close_all(&self) {
        self.shutdown.cancel();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(64)
    }
}
