use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use crate::core::models::UserInfo;
use axum::extract::State;
use axum::Json;

/// GET /auth/me
pub async fn me(State(state): State<AppState>, ctx: Ctx) -> Result<Json<UserInfo>> {
    // 'ctx' carries a user id the middleware already validated
    let user = state.auth.get_user(ctx.user_id()).await?;

    Ok(Json(user))
}
