//! Auth handlers

use crate::core::auth::middleware::bearer_token;
use crate::core::auth::NewAccount;
use crate::core::config::AppState;
use crate::core::error::{Error, Result, StoreError};
use crate::core::models::{UserId, UserInfo};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub user_id: UserId,
    pub verified: bool,
}

/// POST /auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<NewAccount>,
) -> Result<(StatusCode, Json<UserInfo>)> {
    info!("POST /auth/signup - {}", req.email);

    let email = req.email.clone();
    let user = state.auth.signup(req).await.map_err(|e| {
        warn!("Signup failed for {}: {}", email, e);
        Error::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    info!("POST /auth/login - {}", req.email);

    let (user, session) = state
        .auth
        .login(&req.email, &req.password)
        .await
        .map_err(|e| match e {
            StoreError::NotFound(_) => Error::LoginFail,
            other => Error::from(other),
        })?;

    Ok(Json(AuthResponse {
        token: session.token,
        user,
    }))
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode> {
    info!("POST /auth/logout");

    let token = bearer_token(&headers)?;
    state.auth.logout(token).await?;

    Ok(StatusCode::OK)
}

/// GET /auth/verify/{token}
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<VerifyResponse>> {
    info!("GET /auth/verify");

    let user_id = state.ledger.consume(&token).await?;

    Ok(Json(VerifyResponse {
        user_id,
        verified: true,
    }))
}
