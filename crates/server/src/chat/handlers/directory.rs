//! Directory Handlers
//!
//! Contacts, DMs, history and participant lookups for the signed-in user.

use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use crate::core::models::{ContactSummary, DmSummary, HistoryEntry, ParticipantProfile, UserId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only messages older than this message id
    pub before: Option<i64>,
    pub limit: Option<u32>,
}

/// GET /chat/contacts
pub async fn list_contacts(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<ContactSummary>>> {
    info!("GET /chat/contacts - user {}", ctx.user_id());
    Ok(Json(state.directory.contacts(ctx.user_id()).await?))
}

/// PUT /chat/contacts/{id}
pub async fn add_contact(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(contact_id): Path<UserId>,
) -> Result<StatusCode> {
    state.directory.add_contact(ctx.user_id(), contact_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /chat/dms
pub async fn list_dms(State(state): State<AppState>, ctx: Ctx) -> Result<Json<Vec<DmSummary>>> {
    info!("GET /chat/dms - user {}", ctx.user_id());
    Ok(Json(state.directory.dms(ctx.user_id()).await?))
}

/// GET /chat/history/{id}?before=&limit=
pub async fn chat_history(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(participant_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>> {
    let limit = history_limit(query.limit, state.config.history_page_size);

    let history = state
        .directory
        .history(ctx.user_id(), participant_id, query.before, limit)
        .await?;
    Ok(Json(history))
}

/// Requested page size, defaulting to and capped by the configured one.
fn history_limit(requested: Option<u32>, page_size: u32) -> u32 {
    let page_size = page_size.max(1);
    requested.unwrap_or(page_size).clamp(1, page_size)
}

/// GET /chat/participant/{id}
pub async fn get_participant(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(participant_id): Path<UserId>,
) -> Result<Json<ParticipantProfile>> {
    Ok(Json(
        state
            .directory
            .participant(ctx.user_id(), participant_id)
            .await?,
    ))
}

/// GET /chat/favorites
pub async fn list_favorites(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<ContactSummary>>> {
    Ok(Json(state.directory.favorites(ctx.user_id()).await?))
}

/// PUT /chat/favorites/{id}
pub async fn add_favorite(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(participant_id): Path<UserId>,
) -> Result<StatusCode> {
    state
        .directory
        .set_favorite(ctx.user_id(), participant_id, true)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /chat/favorites/{id}
pub async fn remove_favorite(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(participant_id): Path<UserId>,
) -> Result<StatusCode> {
    state
        .directory
        .set_favorite(ctx.user_id(), participant_id, false)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /chat/blocks/{id}
pub async fn block_user(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(blocked_id): Path<UserId>,
) -> Result<StatusCode> {
    info!("PUT /chat/blocks/{} - user {}", blocked_id, ctx.user_id());
    state.directory.block(ctx.user_id(), blocked_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_bounds() {
        assert_eq!(history_limit(None, 50), 50);
        assert_eq!(history_limit(Some(10), 50), 10);
        assert_eq!(history_limit(Some(500), 50), 50);
        assert_eq!(history_limit(Some(0), 50), 1);
        assert_eq!(history_limit(None, 0), 1);
        assert_eq!(history_limit(Some(7), 0), 1);
    }
}
