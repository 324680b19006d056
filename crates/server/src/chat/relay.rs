//! Message Relay
//!
//! Forwards a direct message to the recipient's live connection. Nothing
//! is queued, retried or stored here: an offline recipient just means the
//! message is not delivered in real time.

use crate::chat::events::ServerEvent;
use crate::chat::registry::ConnectionRegistry;
use crate::core::models::DirectMessage;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RecipientOffline,
}

pub struct MessageRelay {
    registry: Arc<ConnectionRegistry>,
}

impl MessageRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Route `message` to its recipient. Calls for the same pair are
    /// delivered in call order because each one enqueues synchronously on
    /// the recipient's FIFO queue.
    pub fn relay(&self, message: &DirectMessage) -> DeliveryOutcome {
        let Some(connection) = self.registry.route(message.recipient_id) else {
            debug!(
                "[Relay] {} -> {}: recipient offline",
                message.sender_id, message.recipient_id
            );
            return DeliveryOutcome::RecipientOffline;
        };

        let delivered = connection.send(ServerEvent::MessageReceived {
            from: message.sender_id,
            message: message.body.clone(),
            sent_at: message.sent_at,
        });

        if delivered {
            debug!(
                "[Relay] {} -> {}: delivered",
                message.sender_id, message.recipient_id
            );
            DeliveryOutcome::Delivered
        } else {
            // The task closed between route and send
            debug!(
                "[Relay] {} -> {}: connection closing",
                message.sender_id, message.recipient_id
            );
            DeliveryOutcome::RecipientOffline
        }
    }
}
