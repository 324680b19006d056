use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric user identity assigned by the users table at registration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a user stands in the signup funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ProfileState {
    Unverified,
    ProfileIncomplete { step: u8 },
    Complete,
}

impl ProfileState {
    /// Number of profile steps after verification: basics, interests, picture.
    pub const STEPS: u8 = 3;

    /// Rebuild the state from its `(profile_state, profile_step)` columns.
    pub fn from_columns(state: &str, step: i64) -> Self {
        match state {
            "complete" => ProfileState::Complete,
            "incomplete" => ProfileState::ProfileIncomplete {
                step: step.clamp(0, Self::STEPS as i64) as u8,
            },
            _ => ProfileState::Unverified,
        }
    }

    pub fn to_columns(self) -> (&'static str, i64) {
        match self {
            ProfileState::Unverified => ("unverified", 0),
            ProfileState::ProfileIncomplete { step } => ("incomplete", step as i64),
            ProfileState::Complete => ("complete", Self::STEPS as i64),
        }
    }

    /// State reached after `completed` steps have been stored.
    pub fn after_step(completed: u8) -> Self {
        if completed >= Self::STEPS {
            ProfileState::Complete
        } else {
            ProfileState::ProfileIncomplete { step: completed }
        }
    }
}

/// Public user info (no credentials)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
    pub profile: ProfileState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn from_online(online: bool) -> Self {
        if online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }
}

/// A contact or DM row as stored, before presence is overlaid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRow {
    pub participant_id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub last_message: Option<String>,
    pub is_favorite: bool,
    pub unread_count: i64,
}

/// Contact / DM list entry served to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub last_message: Option<String>,
    pub is_favorite: bool,
    pub unread_count: i64,
    pub status: PresenceStatus,
}

/// DM summaries have the same shape as contacts.
pub type DmSummary = ContactSummary;

impl ContactSummary {
    pub fn from_row(row: ParticipantRow, status: PresenceStatus) -> Self {
        Self {
            id: row.participant_id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_picture: row.profile_picture,
            last_message: row.last_message,
            is_favorite: row.is_favorite,
            unread_count: row.unread_count,
            status,
        }
    }
}

/// Stored profile of a single participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub biography: Option<String>,
    pub gender: Option<String>,
    pub sexual_preference: Option<String>,
    pub age: Option<i64>,
    pub interests: Vec<String>,
}

/// Participant detail served to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture: Option<String>,
    pub biography: Option<String>,
    pub gender: Option<String>,
    pub sexual_preference: Option<String>,
    pub age: Option<i64>,
    pub interests: Vec<String>,
    pub is_favorite: bool,
    pub status: PresenceStatus,
}

impl ParticipantProfile {
    pub fn from_row(row: ProfileRow, is_favorite: bool, status: PresenceStatus) -> Self {
        Self {
            id: row.id,
            username: row.username,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_picture: row.profile_picture,
            biography: row.biography,
            gender: row.gender,
            sexual_preference: row.sexual_preference,
            age: row.age,
            interests: row.interests,
            is_favorite,
            status,
        }
    }
}

/// Only text is sent through the relay; audio is reserved in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Audio,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
        }
    }

    pub fn parse(kind: &str) -> Self {
        match kind {
            "audio" => MessageKind::Audio,
            _ => MessageKind::Text,
        }
    }
}

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl DirectMessage {
    pub fn new(sender_id: UserId, recipient_id: UserId, body: impl Into<String>) -> Self {
        Self {
            sender_id,
            recipient_id,
            body: body.into(),
            sent_at: Utc::now(),
        }
    }
}

/// One line of chat history, seen from the requesting user's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub from: UserId,
    pub is_sender: bool,
    pub message_type: MessageKind,
    pub message_content: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_state_columns() {
        for state in [
            ProfileState::Unverified,
            ProfileState::ProfileIncomplete { step: 0 },
            ProfileState::ProfileIncomplete { step: 2 },
            ProfileState::Complete,
        ] {
            let (name, step) = state.to_columns();
            assert_eq!(ProfileState::from_columns(name, step), state);
        }
    }

    #[test]
    fn test_after_step_reaches_complete() {
        assert_eq!(
            ProfileState::after_step(1),
            ProfileState::ProfileIncomplete { step: 1 }
        );
        assert_eq!(ProfileState::after_step(3), ProfileState::Complete);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let row = ParticipantRow {
            participant_id: UserId(2),
            username: "jane".into(),
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            profile_picture: None,
            last_message: Some("see you".into()),
            is_favorite: true,
            unread_count: 1,
        };
        let json = serde_json::to_value(ContactSummary::from_row(row, PresenceStatus::Online))
            .unwrap();
        assert_eq!(json["id"], 2);
        assert_eq!(json["lastMessage"], "see you");
        assert_eq!(json["status"], "online");
    }
}
