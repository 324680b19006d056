//! Socket event protocol
//!
//! Every frame is JSON of the form `{"event": "<name>", "data": {...}}`.
//! The set of events is closed; anything else is rejected at the boundary.
//!
//! ```text
//! client -> server   auth                 { token }
//! client -> server   chat:send            { to, message }
//! server -> client   chat:message         { from, message, sentAt }
//! server -> client   global:online-users  { online: [id, ...] }
//! server -> client   session:replaced     {}
//! server -> client   error                { message }
//! ```

use crate::core::models::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "auth")]
    Handshake { token: String },
    #[serde(rename = "chat:send")]
    Send { to: UserId, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "chat:message", rename_all = "camelCase")]
    MessageReceived {
        from: UserId,
        message: String,
        sent_at: DateTime<Utc>,
    },
    #[serde(rename = "global:online-users")]
    Presence { online: Vec<UserId> },
    #[serde(rename = "session:replaced")]
    Replaced {},
    #[serde(rename = "error")]
    Error { message: String },
}

impl ClientEvent {
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn to_frame(&self) -> String {
        // Every variant is plain data; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Boundary checks for an outgoing chat message.
pub fn validate_send(
    sender: UserId,
    to: UserId,
    message: &str,
    max_len: usize,
) -> Result<(), &'static str> {
    if to == sender {
        return Err("cannot message yourself");
    }
    if message.trim().is_empty() {
        return Err("message is empty");
    }
    if message.chars().count() > max_len {
        return Err("message too long");
    }
    Ok(())
}
