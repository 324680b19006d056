//! Auth Handlers and Module

pub mod auth;
pub mod auth_me;
pub mod profile;

pub use auth::{login, logout, signup, verify_email};
pub use auth_me::me;
pub use profile::complete_profile;
