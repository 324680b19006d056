use crate::core::auth::ProfileStep;
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use crate::core::models::ProfileState;
use axum::extract::State;
use axum::Json;
use tracing::info;

/// POST /profile/complete
pub async fn complete_profile(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(step): Json<ProfileStep>,
) -> Result<Json<ProfileState>> {
    info!("POST /profile/complete - user {} step {}", ctx.user_id(), step.index() + 1);

    let next = state.auth.complete_profile(ctx.user_id(), step).await?;

    Ok(Json(next))
}
