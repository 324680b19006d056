//! SQLite-backed directory store.

use super::DirectoryStore;
use crate::core::db::parse_timestamp;
use crate::core::error::StoreResult;
use crate::core::models::{
    DirectMessage, HistoryEntry, MessageKind, ParticipantRow, ProfileRow, UserId,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

type SummaryRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    i64,
);

/// Participant projection shared by contacts, DMs and favorites. `me` is a
/// one-row CTE holding the requesting user's id so it is bound once.
const SUMMARY_COLUMNS: &str = r#"
    u.id, u.username, u.first_name, u.last_name, u.profile_picture,
    (SELECT m.body FROM messages m
        WHERE (m.sender_id = me.id AND m.recipient_id = u.id)
           OR (m.sender_id = u.id AND m.recipient_id = me.id)
        ORDER BY m.id DESC LIMIT 1) AS last_message,
    EXISTS(SELECT 1 FROM favorites f
        WHERE f.user_id = me.id AND f.favorite_user_id = u.id) AS is_favorite,
    (SELECT COUNT(*) FROM messages m
        WHERE m.sender_id = u.id AND m.recipient_id = me.id AND m.read_at IS NULL) AS unread_count
"#;

const NOT_BLOCKED: &str = r#"
    NOT EXISTS(SELECT 1 FROM blocks b
        WHERE (b.blocker_id = me.id AND b.blocked_id = u.id)
           OR (b.blocker_id = u.id AND b.blocked_id = me.id))
"#;

fn summary_from_row(row: SummaryRow) -> ParticipantRow {
    let (id, username, first_name, last_name, profile_picture, last_message, is_favorite, unread) =
        row;
    ParticipantRow {
        participant_id: UserId(id),
        username,
        first_name,
        last_name,
        profile_picture,
        last_message,
        is_favorite,
        unread_count: unread,
    }
}

pub struct SqliteDirectoryStore {
    pool: SqlitePool,
}

impl SqliteDirectoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn summaries(&self, sql: &str, user_id: UserId) -> StoreResult<Vec<ParticipantRow>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(summary_from_row).collect())
    }
}

#[async_trait]
impl DirectoryStore for SqliteDirectoryStore {
    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn contacts(&self, user_id: UserId) -> StoreResult<Vec<ParticipantRow>> {
        let sql = format!(
            r#"
            WITH me(id) AS (SELECT ?)
            SELECT {}
            FROM me
            JOIN contacts c ON c.user_id = me.id
            JOIN users u ON u.id = c.contact_user_id
            WHERE {}
            ORDER BY u.username
            "#,
            SUMMARY_COLUMNS, NOT_BLOCKED
        );
        self.summaries(&sql, user_id).await
    }

    async fn dm_summaries(&self, user_id: UserId) -> StoreResult<Vec<ParticipantRow>> {
        let sql = format!(
            r#"
            WITH me(id) AS (SELECT ?),
            peers AS (
                SELECT CASE WHEN m.sender_id = me.id THEN m.recipient_id ELSE m.sender_id END AS peer_id,
                       MAX(m.id) AS last_id
                FROM messages m, me
                WHERE m.sender_id = me.id OR m.recipient_id = me.id
                GROUP BY peer_id
            )
            SELECT {}
            FROM me
            JOIN peers p
            JOIN users u ON u.id = p.peer_id
            WHERE {}
            ORDER BY p.last_id DESC
            "#,
            SUMMARY_COLUMNS, NOT_BLOCKED
        );
        self.summaries(&sql, user_id).await
    }

    async fn favorites(&self, user_id: UserId) -> StoreResult<Vec<ParticipantRow>> {
        let sql = format!(
            r#"
            WITH me(id) AS (SELECT ?)
            SELECT {}
            FROM me
            JOIN favorites fav ON fav.user_id = me.id
            JOIN users u ON u.id = fav.favorite_user_id
            WHERE {}
            ORDER BY fav.created_at DESC
            "#,
            SUMMARY_COLUMNS, NOT_BLOCKED
        );
        self.summaries(&sql, user_id).await
    }

    async fn chat_history(
        &self,
        user_id: UserId,
        participant_id: UserId,
        before: Option<i64>,
        limit: u32,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let rows: Vec<(i64, UserId, String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, sender_id, kind, body, sent_at FROM messages
            WHERE ((sender_id = ? AND recipient_id = ?) OR (sender_id = ? AND recipient_id = ?))
              AND id < ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(participant_id)
        .bind(participant_id)
        .bind(user_id)
        .bind(before.unwrap_or(i64::MAX))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .rev()
            .map(|(id, from, kind, body, sent_at)| {
                Ok(HistoryEntry {
                    id,
                    from,
                    is_sender: from == user_id,
                    message_type: MessageKind::parse(&kind),
                    message_content: body,
                    sent_at: parse_timestamp(&sent_at)?,
                })
            })
            .collect()
    }

    async fn mark_read(&self, user_id: UserId, participant_id: UserId) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET read_at = ? WHERE sender_id = ? AND recipient_id = ? AND read_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(participant_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn profile(&self, user_id: UserId) -> StoreResult<Option<ProfileRow>> {
        let row: Option<(
            i64,
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<i64>,
        )> = sqlx::query_as(
            r#"
            SELECT id, username, first_name, last_name, profile_picture,
                   biography, gender, sexual_preference, age
            FROM users WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, username, first_name, last_name, profile_picture, biography, gender, sexual_preference, age)) =
            row
        else {
            return Ok(None);
        };

        let interests: Vec<(String,)> =
            sqlx::query_as("SELECT tag FROM interests WHERE user_id = ? ORDER BY tag")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(ProfileRow {
            id: UserId(id),
            username,
            first_name,
            last_name,
            profile_picture,
            biography,
            gender,
            sexual_preference,
            age,
            interests: interests.into_iter().map(|(tag,)| tag).collect(),
        }))
    }

    async fn is_favorite(&self, user_id: UserId, participant_id: UserId) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM favorites WHERE user_id = ? AND favorite_user_id = ?",
        )
        .bind(user_id)
        .bind(participant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn set_favorite(
        &self,
        user_id: UserId,
        participant_id: UserId,
        favorite: bool,
    ) -> StoreResult<()> {
        if favorite {
            sqlx::query(
                "INSERT OR IGNORE INTO favorites (user_id, favorite_user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(user_id)
            .bind(participant_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM favorites WHERE user_id = ? AND favorite_user_id = ?")
                .bind(user_id)
                .bind(participant_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn add_contact(&self, user_id: UserId, contact_id: UserId) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for (from, to) in [(user_id, contact_id), (contact_id, user_id)] {
            sqlx::query(
                "INSERT OR IGNORE INTO contacts (user_id, contact_user_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(from)
            .bind(to)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn block(&self, user_id: UserId, blocked_id: UserId) -> StoreResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(blocked_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn is_blocked_between(&self, a: UserId, b: UserId) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM blocks
            WHERE (blocker_id = ? AND blocked_id = ?) OR (blocker_id = ? AND blocked_id = ?)
            LIMIT 1
            "#,
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn record_message(&self, message: &DirectMessage) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO messages (sender_id, recipient_id, kind, body, sent_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(MessageKind::Text.as_str())
        .bind(&message.body)
        .bind(message.sent_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
