//! Chat Handlers and Router
//!
//! Directory routes require a session; the socket route authenticates its
//! own handshake.

use crate::chat::socket;
use crate::core::AppState;
use axum::{
    routing::{get, put},
    Router,
};

pub mod directory;

/// Routes that sit behind `mw_require_auth`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/contacts", get(directory::list_contacts))
        .route("/chat/contacts/{id}", put(directory::add_contact))
        .route("/chat/dms", get(directory::list_dms))
        .route("/chat/history/{id}", get(directory::chat_history))
        .route("/chat/participant/{id}", get(directory::get_participant))
        .route("/chat/favorites", get(directory::list_favorites))
        .route(
            "/chat/favorites/{id}",
            put(directory::add_favorite).delete(directory::remove_favorite),
        )
        .route("/chat/blocks/{id}", put(directory::block_user))
}

pub fn socket_router() -> Router<AppState> {
    Router::new().route("/ws", get(socket::ws_handler))
}
