//! Chat hub
//!
//! Ties connection lifecycle to presence, and the send path to the
//! directory and the relay. Socket tasks talk to this and nothing else.

use crate::chat::directory::Directory;
use crate::chat::events::{validate_send, ServerEvent};
use crate::chat::presence::PresenceBroadcaster;
use crate::chat::registry::{ConnectionHandle, ConnectionRegistry, Outbound};
use crate::chat::relay::{DeliveryOutcome, MessageRelay};
use crate::core::error::{StoreError, StoreResult};
use crate::core::models::{DirectMessage, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

pub struct ChatHub {
    registry: Arc<ConnectionRegistry>,
    broadcaster: PresenceBroadcaster,
    relay: MessageRelay,
    directory: Arc<Directory>,
    max_message_len: usize,
}

impl ChatHub {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<Directory>,
        max_message_len: usize,
    ) -> Self {
        Self {
            relay: MessageRelay::new(registry.clone()),
            broadcaster: PresenceBroadcaster::new(),
            registry,
            directory,
            max_message_len,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register an authenticated connection for `user_id`. A previous
    /// connection for the same user is told it was replaced and closed.
    pub fn connect(&self, user_id: UserId) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (handle, rx) = self.registry.open(user_id);
        let admission = self
            .registry
            .admit(handle.clone(), |snapshot| {
                self.broadcaster.broadcast(snapshot);
            });

        if let Some(previous) = admission.previous {
            previous.send(ServerEvent::Replaced {});
            previous.terminate();
            info!(
                "[Hub] Closed connection {:?} for user {}: replaced",
                previous.id(),
                user_id
            );
        }

        (handle, rx)
    }

    /// Drop `handle` from the registry. Stale handles change nothing and
    /// trigger no broadcast.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        self.registry.evict(handle, |snapshot| {
            self.broadcaster.broadcast(snapshot);
        });
    }

    /// Validate, persist, then relay a direct message.
    pub async fn send(
        &self,
        sender: UserId,
        to: UserId,
        body: String,
    ) -> StoreResult<DeliveryOutcome> {
        validate_send(sender, to, &body, self.max_message_len)
            .map_err(|reason| StoreError::Invalid(reason.to_string()))?;
        self.directory.ensure_reachable(sender, to).await?;

        let message = DirectMessage::new(sender, to, body);
        self.directory.store().record_message(&message).await?;
        Ok(self.relay.relay(&message))
    }
}
