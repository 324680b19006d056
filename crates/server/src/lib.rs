//! Matcha Chat Server Library
//!
//! Real-time core of the Matcha dating app: one live socket per user,
//! presence broadcast, direct-message relay, email verification and the
//! directory queries behind the chat UI.

pub mod chat;
pub mod core;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::chat::directory::{Directory, SqliteDirectoryStore};
use crate::chat::registry::ConnectionRegistry;
use crate::chat::ChatHub;
use crate::core::auth::middleware::mw_require_auth;
use crate::core::auth::verification::VerificationLedger;
use crate::core::auth::AuthManager;
use crate::core::config::{AppState, ServerConfig};
use crate::core::db;
use crate::core::mail::{LogMailer, VerificationMailer};

/// Open the database and wire every component around one registry.
pub async fn build_state(
    config: ServerConfig,
    mailer: Arc<dyn VerificationMailer>,
) -> anyhow::Result<AppState> {
    let pool = db::connect(&config).await?;

    let registry = Arc::new(ConnectionRegistry::new());
    let directory = Arc::new(Directory::new(
        Arc::new(SqliteDirectoryStore::new(pool.clone())),
        registry.clone(),
    ));
    let hub = Arc::new(ChatHub::new(
        registry,
        directory.clone(),
        config.max_message_len,
    ));
    let ledger = Arc::new(VerificationLedger::new(pool.clone()));
    let auth = Arc::new(AuthManager::new(pool.clone(), &config, mailer));

    Ok(AppState {
        config,
        pool,
        auth,
        ledger,
        directory,
        hub,
    })
}

pub fn app(state: AppState) -> Router {
    let protected = crate::core::router()
        .merge(crate::chat::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            mw_require_auth,
        ));

    Router::new()
        .merge(crate::core::public_router())
        .merge(crate::chat::socket_router())
        .merge(protected)
        .route("/health", get(health_check))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Already set when embedded in tests; ignore
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    info!("=== Matcha Server ===");

    let config = ServerConfig::default();
    config.ensure_dirs().await?;
    info!("Data directory: {:?}", config.data_dir);

    let addr = config.bind_addr;
    let state = build_state(config, Arc::new(LogMailer)).await?;
    info!("Chat hub, directory and verification ledger initialized");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Matcha Server"
}
