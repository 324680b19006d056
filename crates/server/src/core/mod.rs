//! Core Service Layer
//!
//! Shared infrastructure for the Matcha server: accounts and sessions,
//! email verification, data models, configuration and storage.

pub mod auth;
pub mod config;
pub mod ctx;
pub mod db;
pub mod error;
pub mod mail;
pub mod models;
pub mod router;

// Re-exports for convenience
pub use config::{AppState, ServerConfig};
pub use ctx::Ctx;
pub use error::{Error, Result};
pub use router::{public_router, router};
