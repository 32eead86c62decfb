//! Business logic: presence registry and conversation delivery.

pub mod chat;
pub mod presence;

pub use chat::ChatService;
pub use presence::{InMemoryPresence, JoinEffect, LeaveEffect, PresenceStore};
