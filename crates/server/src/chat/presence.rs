//! Presence Broadcaster
//!
//! Pushes the full online set to every registered connection whenever the
//! set changes. The hub calls `broadcast` from inside the registry's
//! critical section, so every queue sees snapshots in the order they were
//! taken; enqueueing never blocks. Delivery is best effort: a connection
//! that is closing just misses the update, and its own evict produces the
//! next one.

use crate::chat::events::ServerEvent;
use crate::chat::registry::PresenceSnapshot;
use tracing::debug;

#[derive(Default)]
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    pub fn new() -> Self {
        Self
    }

    /// Send `snapshot.online` to every recipient in the snapshot, including
    /// the connection whose admit or evict produced it. Returns the number
    /// of connections that accepted the event.
    pub fn broadcast(&self, snapshot: &PresenceSnapshot) -> usize {
        let event = ServerEvent::Presence {
            online: snapshot.online_ids(),
        };

        let delivered = snapshot
            .recipients
            .iter()
            .filter(|connection| connection.send(event.clone()))
            .count();

        debug!(
            "[Presence] {} online, pushed to {}/{} connections",
            snapshot.online.len(),
            delivered,
            snapshot.recipients.len()
        );
        delivered
    }
}
