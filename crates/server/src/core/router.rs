//! Core Router
//!
//! Account routes. `public_router` is reachable without a session;
//! `router` is merged behind `mw_require_auth`.

use crate::core::auth::handlers as auth_handlers;
use crate::core::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(auth_handlers::signup))
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/auth/verify/{token}", get(auth_handlers::verify_email))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth_handlers::me))
        .route("/profile/complete", post(auth_handlers::complete_profile))
}
