//! Email verification ledger
//!
//! A token is created with its user at signup and consumed exactly once.
//! Consumption deletes the token, marks the user verified and opens the
//! profile-completion funnel in a single transaction.

use crate::core::error::{StoreError, StoreResult};
use crate::core::models::{ProfileState, UserId};
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

pub struct VerificationLedger {
    pool: SqlitePool,
}

impl VerificationLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Generate a fresh single-use token.
    pub fn new_token() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Record a pending token for `user_id` inside the caller's transaction.
    pub async fn issue(
        tx: &mut Transaction<'_, Sqlite>,
        user_id: UserId,
        token: &str,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO email_verifications (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Consume `token`, returning the user it verified.
    ///
    /// The delete runs first so the transaction takes SQLite's write lock
    /// before anything is read: a concurrent caller waits for the winner to
    /// commit and then finds no row.
    pub async fn consume(&self, token: &str) -> StoreResult<UserId> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(UserId,)> =
            sqlx::query_as("DELETE FROM email_verifications WHERE token = ? RETURNING user_id")
                .bind(token)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((user_id,)) = claimed else {
            tx.rollback().await?;
            info!("[Ledger] Verification token rejected (not found)");
            return Err(StoreError::NotFound("verification token".to_string()));
        };

        let (incomplete, step) = ProfileState::ProfileIncomplete { step: 0 }.to_columns();
        let updated = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = 1,
                profile_state = CASE WHEN profile_state = 'unverified' THEN ? ELSE profile_state END,
                profile_step = CASE WHEN profile_state = 'unverified' THEN ? ELSE profile_step END
            WHERE id = ?
            "#,
        )
        .bind(incomplete)
        .bind(step)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() != 1 {
            // Orphaned token: keep it so the state stays exactly as it was.
            tx.rollback().await?;
            warn!(
                "[Ledger] Token owner {} missing, verification rolled back",
                user_id
            );
            return Err(StoreError::NotFound("user".to_string()));
        }

        tx.commit().await?;
        info!("[Ledger] User {} verified", user_id);
        Ok(user_id)
    }
}
