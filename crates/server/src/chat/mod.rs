//! Chat Service Layer
//!
//! Live connections, presence, direct-message relay and the directory
//! queries behind the chat UI.

pub mod directory;
pub mod events;
pub mod handlers;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod socket;

pub use handlers::{router, socket_router};
pub use hub::ChatHub;
