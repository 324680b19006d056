//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::chat::directory::Directory;
use crate::chat::hub::ChatHub;
use crate::core::auth::verification::VerificationLedger;
use crate::core::auth::AuthManager;

/// Configuration for the Matcha server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Data directory (database lives here)
    pub data_dir: PathBuf,
    /// Address the HTTP/WebSocket listener binds to
    pub bind_addr: SocketAddr,
    /// How long a socket may stay unauthenticated
    pub handshake_timeout: Duration,
    /// Max chat message body length in characters
    pub max_message_len: usize,
    /// Default page size for chat history
    pub history_page_size: u32,
    /// Session lifetime
    pub session_ttl: chrono::Duration,
    /// Base URL verification tokens are appended to
    pub verify_url: String,
    /// Pooled database connections
    pub db_max_connections: u32,
    /// bcrypt work factor for password hashes
    pub bcrypt_cost: u32,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::var("MATCHA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("matcha_data")),
            bind_addr: env_or(
                "MATCHA_BIND",
                SocketAddr::from(([0, 0, 0, 0], 3000)),
            ),
            handshake_timeout: Duration::from_secs(env_or("MATCHA_HANDSHAKE_TIMEOUT_SECS", 5)),
            max_message_len: env_or("MATCHA_MAX_MESSAGE_LEN", 2000),
            history_page_size: env_or("MATCHA_HISTORY_PAGE_SIZE", 50u32).max(1),
            session_ttl: chrono::Duration::days(env_or("MATCHA_SESSION_TTL_DAYS", 30)),
            verify_url: std::env::var("MATCHA_VERIFY_URL")
                .unwrap_or_else(|_| "http://localhost:3000/auth/verify".to_string()),
            db_max_connections: env_or("MATCHA_DB_MAX_CONNECTIONS", 8),
            bcrypt_cost: env_or("MATCHA_BCRYPT_COST", bcrypt::DEFAULT_COST),
        }
    }
}

impl ServerConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("matcha.sqlite")
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub pool: SqlitePool,
    pub auth: Arc<AuthManager>,
    pub ledger: Arc<VerificationLedger>,
    pub directory: Arc<Directory>,
    pub hub: Arc<ChatHub>,
}
