//! Data models for messages, presence, notifications, and the WS protocol.

pub mod event;
pub mod message;
pub mod notification;
pub mod presence;

pub use event::*;
pub use message::*;
pub use notification::*;
pub use presence::*;
