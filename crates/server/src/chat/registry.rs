//! Connection Registry
//!
//! Maps each online user to their one live connection. Every operation
//! runs inside a single short critical section; sends to connections
//! happen after the lock is released, from the snapshots returned here.

use crate::chat::events::ServerEvent;
use crate::core::models::UserId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

/// What a connection task receives on its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Event(ServerEvent),
    /// Close the transport; the session was taken over elsewhere.
    Close,
}

/// Addressable handle to one live connection task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Queue an event. Returns false if the task is already gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(Outbound::Event(event)).is_ok()
    }

    /// Ask the task to close its transport.
    pub fn terminate(&self) -> bool {
        self.tx.send(Outbound::Close).is_ok()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// The online set and the connections to notify, taken atomically.
#[derive(Debug, Clone, Default)]
pub struct PresenceSnapshot {
    pub online: BTreeSet<UserId>,
    pub recipients: Vec<ConnectionHandle>,
}

impl PresenceSnapshot {
    pub fn online_ids(&self) -> Vec<UserId> {
        self.online.iter().copied().collect()
    }
}

#[derive(Debug)]
pub struct AdmissionResult {
    /// Connection displaced by this admit; the caller must terminate it.
    pub previous: Option<ConnectionHandle>,
    pub snapshot: PresenceSnapshot,
}

pub struct ConnectionRegistry {
    connections: Mutex<HashMap<UserId, ConnectionHandle>>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a handle and the queue its connection task will drain.
    pub fn open(&self, user_id: UserId) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            id: ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            user_id,
            created_at: Utc::now(),
            tx,
        };
        (handle, rx)
    }

    /// Install `handle` as the user's connection. Last writer wins: any
    /// earlier connection is removed and returned for termination.
    ///
    /// `publish` runs with the new snapshot before the lock is released, so
    /// snapshots reach every queue in the order they were taken. It must
    /// not block.
    pub fn admit(
        &self,
        handle: ConnectionHandle,
        publish: impl FnOnce(&PresenceSnapshot),
    ) -> AdmissionResult {
        let user_id = handle.user_id;
        let mut connections = self.connections.lock();
        let previous = connections.insert(user_id, handle);
        let snapshot = Self::snapshot_locked(&connections);
        publish(&snapshot);
        drop(connections);

        match &previous {
            Some(old) => info!(
                "[Registry] User {} reconnected, replacing connection {:?}",
                user_id, old.id
            ),
            None => info!("[Registry] User {} admitted", user_id),
        }

        AdmissionResult { previous, snapshot }
    }

    /// Remove the user's mapping if it still points at `handle`, running
    /// `publish` under the lock as `admit` does. A stale disconnect racing
    /// a newer admit leaves the registry untouched, publishes nothing and
    /// returns `None`.
    pub fn evict(
        &self,
        handle: &ConnectionHandle,
        publish: impl FnOnce(&PresenceSnapshot),
    ) -> Option<PresenceSnapshot> {
        let user_id = handle.user_id;
        let mut connections = self.connections.lock();
        let current_id = connections.get(&user_id).map(|current| current.id);
        match current_id {
            Some(current_id) if current_id == handle.id => {
                connections.remove(&user_id);
                let snapshot = Self::snapshot_locked(&connections);
                publish(&snapshot);
                drop(connections);
                info!("[Registry] User {} evicted", user_id);
                Some(snapshot)
            }
            Some(current_id) => {
                drop(connections);
                warn!(
                    "[Registry] Ignoring stale evict for user {}: {:?} is not current {:?}",
                    user_id, handle.id, current_id
                );
                None
            }
            None => {
                drop(connections);
                debug!("[Registry] Evict for offline user {} ignored", user_id);
                None
            }
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.connections.lock().contains_key(&user_id)
    }

    /// Point-in-time online set.
    pub fn snapshot(&self) -> BTreeSet<UserId> {
        self.connections.lock().keys().copied().collect()
    }

    /// The live connection for `user_id`, if any.
    pub fn route(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.connections.lock().get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot_locked(connections: &HashMap<UserId, ConnectionHandle>) -> PresenceSnapshot {
        PresenceSnapshot {
            online: connections.keys().copied().collect(),
            recipients: connections.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reconnect_replaces_and_reports_previous_once() {
        let registry = ConnectionRegistry::new();
        let (c1, mut rx1) = registry.open(UserId(1));
        let (c2, _rx2) = registry.open(UserId(1));

        assert!(registry.admit(c1.clone(), |_| ()).previous.is_none());
        let second = registry.admit(c2.clone(), |_| ());
        assert_eq!(second.previous.as_ref(), Some(&c1));
        assert_eq!(registry.route(UserId(1)), Some(c2.clone()));
        assert_eq!(second.snapshot.online.len(), 1);

        assert!(second.previous.unwrap().terminate());
        assert_eq!(rx1.try_recv().unwrap(), Outbound::Close);
        assert!(rx1.try_recv().is_err());

        // A third admit displaces c2, never c1 again
        let (c3, _rx3) = registry.open(UserId(1));
        assert_eq!(registry.admit(c3, |_| ()).previous, Some(c2));
    }

    #[test]
    fn test_publish_sees_each_change_once() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = registry.open(UserId(5));
        let (c2, _rx2) = registry.open(UserId(5));
        let mut published = Vec::new();

        registry.admit(c1.clone(), |s| published.push(s.online_ids()));
        registry.admit(c2.clone(), |s| published.push(s.online_ids()));
        registry.evict(&c1, |s| published.push(s.online_ids()));
        registry.evict(&c2, |s| published.push(s.online_ids()));

        assert_eq!(
            published,
            vec![vec![UserId(5)], vec![UserId(5)], Vec::<UserId>::new()]
        );
    }

    #[test]
    fn test_stale_evict_is_noop() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = registry.open(UserId(5));
        let (c2, _rx2) = registry.open(UserId(5));
        registry.admit(c1.clone(), |_| ());
        registry.admit(c2.clone(), |_| ());

        assert!(registry.evict(&c1, |_| ()).is_none());
        assert_eq!(registry.route(UserId(5)), Some(c2.clone()));

        let snapshot = registry.evict(&c2, |_| ()).unwrap();
        assert!(snapshot.online.is_empty());
        assert!(!registry.is_online(UserId(5)));
        assert!(registry.evict(&c2, |_| ()).is_none());
    }

    #[test]
    fn test_snapshot_matches_entries() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        let mut last = None;
        for id in [3, 1, 2, 1] {
            let (handle, rx) = registry.open(UserId(id));
            receivers.push(rx);
            last = Some(registry.admit(handle, |_| ()).snapshot);
        }
        let snapshot = last.unwrap();
        assert_eq!(snapshot.online_ids(), vec![UserId(1), UserId(2), UserId(3)]);
        assert_eq!(snapshot.recipients.len(), registry.len());
    }

    #[test]
    fn test_route_unknown_user_is_offline() {
        let registry = ConnectionRegistry::new();
        assert!(registry.route(UserId(404)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_admits_keep_one_connection_per_user() {
        let registry = Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut displaced = 0;
                    for _ in 0..100 {
                        let (handle, _rx) = registry.open(UserId(i % 2));
                        if registry.admit(handle, |_| ()).previous.is_some() {
                            displaced += 1;
                        }
                    }
                    displaced
                })
            })
            .collect();

        let displaced: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();
        // 800 admits across 2 users: every admit but the first per user displaces one
        assert_eq!(displaced, 798);
        assert_eq!(registry.snapshot().len(), 2);
    }
}
