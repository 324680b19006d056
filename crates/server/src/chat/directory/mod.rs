//! Directory query layer
//!
//! `DirectoryStore` is the relational seam: contacts, DM summaries, chat
//! history, favorites, blocks and profile lookups. `Directory` composes
//! those queries for the HTTP surface and overlays live presence from the
//! connection registry when each response is assembled.

pub mod sqlite;

use crate::chat::registry::ConnectionRegistry;
use crate::core::error::{StoreError, StoreResult};
use crate::core::models::{
    ContactSummary, DirectMessage, DmSummary, HistoryEntry, ParticipantProfile, ParticipantRow,
    PresenceStatus, ProfileRow, UserId,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub use sqlite::SqliteDirectoryStore;

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool>;

    async fn contacts(&self, user_id: UserId) -> StoreResult<Vec<ParticipantRow>>;

    /// Everyone `user_id` has exchanged messages with, most recent first.
    async fn dm_summaries(&self, user_id: UserId) -> StoreResult<Vec<ParticipantRow>>;

    async fn favorites(&self, user_id: UserId) -> StoreResult<Vec<ParticipantRow>>;

    /// Messages between the pair with id below `before`, oldest first.
    async fn chat_history(
        &self,
        user_id: UserId,
        participant_id: UserId,
        before: Option<i64>,
        limit: u32,
    ) -> StoreResult<Vec<HistoryEntry>>;

    /// Mark messages from `participant_id` to `user_id` read.
    async fn mark_read(&self, user_id: UserId, participant_id: UserId) -> StoreResult<u64>;

    async fn profile(&self, user_id: UserId) -> StoreResult<Option<ProfileRow>>;

    async fn is_favorite(&self, user_id: UserId, participant_id: UserId) -> StoreResult<bool>;

    async fn set_favorite(
        &self,
        user_id: UserId,
        participant_id: UserId,
        favorite: bool,
    ) -> StoreResult<()>;

    /// Create the contact relation in both directions.
    async fn add_contact(&self, user_id: UserId, contact_id: UserId) -> StoreResult<()>;

    async fn block(&self, user_id: UserId, blocked_id: UserId) -> StoreResult<()>;

    /// True if either user blocked the other.
    async fn is_blocked_between(&self, a: UserId, b: UserId) -> StoreResult<bool>;

    /// Persist a message, returning its row id.
    async fn record_message(&self, message: &DirectMessage) -> StoreResult<i64>;
}

/// Read-mostly projections served to the UI, with presence overlaid.
pub struct Directory {
    store: Arc<dyn DirectoryStore>,
    registry: Arc<ConnectionRegistry>,
}

impl Directory {
    pub fn new(store: Arc<dyn DirectoryStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Arc<dyn DirectoryStore> {
        &self.store
    }

    /// Presence is read after the store round-trip so it is never older
    /// than the rows it decorates.
    fn overlay(&self, rows: Vec<ParticipantRow>) -> Vec<ContactSummary> {
        let online = self.registry.snapshot();
        rows.into_iter()
            .map(|row| {
                let status = PresenceStatus::from_online(online.contains(&row.participant_id));
                ContactSummary::from_row(row, status)
            })
            .collect()
    }

    pub async fn contacts(&self, user_id: UserId) -> StoreResult<Vec<ContactSummary>> {
        let rows = self.store.contacts(user_id).await?;
        Ok(self.overlay(rows))
    }

    pub async fn dms(&self, user_id: UserId) -> StoreResult<Vec<DmSummary>> {
        let rows = self.store.dm_summaries(user_id).await?;
        Ok(self.overlay(rows))
    }

    pub async fn favorites(&self, user_id: UserId) -> StoreResult<Vec<ContactSummary>> {
        let rows = self.store.favorites(user_id).await?;
        Ok(self.overlay(rows))
    }

    /// One page of history with `participant_id`; reading it marks the
    /// participant's messages read.
    pub async fn history(
        &self,
        user_id: UserId,
        participant_id: UserId,
        before: Option<i64>,
        limit: u32,
    ) -> StoreResult<Vec<HistoryEntry>> {
        self.ensure_reachable(user_id, participant_id).await?;

        let history = self
            .store
            .chat_history(user_id, participant_id, before, limit)
            .await?;
        self.store.mark_read(user_id, participant_id).await?;
        Ok(history)
    }

    pub async fn participant(
        &self,
        viewer_id: UserId,
        participant_id: UserId,
    ) -> StoreResult<ParticipantProfile> {
        let row = self
            .store
            .profile(participant_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("participant".to_string()))?;
        let is_favorite = self.store.is_favorite(viewer_id, participant_id).await?;
        let status = PresenceStatus::from_online(self.registry.is_online(participant_id));
        Ok(ParticipantProfile::from_row(row, is_favorite, status))
    }

    pub async fn set_favorite(
        &self,
        user_id: UserId,
        participant_id: UserId,
        favorite: bool,
    ) -> StoreResult<()> {
        self.ensure_other_user(user_id, participant_id).await?;
        self.store
            .set_favorite(user_id, participant_id, favorite)
            .await?;
        info!(
            "[Directory] User {} favorite {} = {}",
            user_id, participant_id, favorite
        );
        Ok(())
    }

    pub async fn add_contact(&self, user_id: UserId, contact_id: UserId) -> StoreResult<()> {
        self.ensure_reachable(user_id, contact_id).await?;
        self.store.add_contact(user_id, contact_id).await?;
        info!("[Directory] Contact added: {} <-> {}", user_id, contact_id);
        Ok(())
    }

    pub async fn block(&self, user_id: UserId, blocked_id: UserId) -> StoreResult<()> {
        self.ensure_other_user(user_id, blocked_id).await?;
        self.store.block(user_id, blocked_id).await?;
        info!("[Directory] User {} blocked {}", user_id, blocked_id);
        Ok(())
    }

    /// The participant exists, is not the caller, and neither side blocked
    /// the other.
    pub async fn ensure_reachable(&self, user_id: UserId, participant_id: UserId) -> StoreResult<()> {
        self.ensure_other_user(user_id, participant_id).await?;
        if self.store.is_blocked_between(user_id, participant_id).await? {
            return Err(StoreError::Forbidden("conversation is blocked".to_string()));
        }
        Ok(())
    }

    async fn ensure_other_user(&self, user_id: UserId, participant_id: UserId) -> StoreResult<()> {
        if user_id == participant_id {
            return Err(StoreError::Invalid("participant must be another user".to_string()));
        }
        if !self.store.user_exists(participant_id).await? {
            return Err(StoreError::NotFound("participant".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::sqlite::tests::seeded_pool;
    use super::*;

    #[tokio::test]
    async fn test_presence_overlay_reads_live_registry() {
        let (_dir, pool) = seeded_pool(&[1, 2, 3]).await;
        let registry = Arc::new(ConnectionRegistry::new());
        let directory = Directory::new(Arc::new(SqliteDirectoryStore::new(pool)), registry.clone());

        directory.add_contact(UserId(1), UserId(2)).await.unwrap();
        directory.add_contact(UserId(1), UserId(3)).await.unwrap();

        let contacts = directory.contacts(UserId(1)).await.unwrap();
        assert!(contacts.iter().all(|c| c.status == PresenceStatus::Offline));

        let (handle, _rx) = registry.open(UserId(2));
        registry.admit(handle.clone(), |_| ());

        let contacts = directory.contacts(UserId(1)).await.unwrap();
        let two = contacts.iter().find(|c| c.id == UserId(2)).unwrap();
        assert_eq!(two.status, PresenceStatus::Online);
        let profile = directory.participant(UserId(1), UserId(2)).await.unwrap();
        assert_eq!(profile.status, PresenceStatus::Online);

        registry.evict(&handle, |_| ());
        let profile = directory.participant(UserId(1), UserId(2)).await.unwrap();
        assert_eq!(profile.status, PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_history_rejected_when_blocked_or_unknown() {
        let (_dir, pool) = seeded_pool(&[1, 2]).await;
        let directory = Directory::new(
            Arc::new(SqliteDirectoryStore::new(pool)),
            Arc::new(ConnectionRegistry::new()),
        );

        assert!(matches!(
            directory.history(UserId(1), UserId(99), None, 10).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            directory.history(UserId(1), UserId(1), None, 10).await,
            Err(StoreError::Invalid(_))
        ));

        directory.block(UserId(1), UserId(2)).await.unwrap();
        assert!(matches!(
            directory.history(UserId(2), UserId(1), None, 10).await,
            Err(StoreError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_history_marks_read() {
        let (_dir, pool) = seeded_pool(&[1, 2]).await;
        let directory = Directory::new(
            Arc::new(SqliteDirectoryStore::new(pool)),
            Arc::new(ConnectionRegistry::new()),
        );
        directory
            .store()
            .record_message(&DirectMessage::new(UserId(2), UserId(1), "ping"))
            .await
            .unwrap();

        assert_eq!(directory.dms(UserId(1)).await.unwrap()[0].unread_count, 1);
        let history = directory.history(UserId(1), UserId(2), None, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(directory.dms(UserId(1)).await.unwrap()[0].unread_count, 0);
    }
}
