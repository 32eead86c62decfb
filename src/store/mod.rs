//! Persistence seams. The realtime core only speaks to these traits; main
//! wires the Postgres implementation, tests wire the in-memory one.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::{DbPool, PgStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Message, Notification, Reaction};

/// Minimal user profile the realtime core needs: display name for
/// notifications, deleted flag for nearby filtering.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub deleted: bool,
}

/// User identity and block-list lookups (owned by the out-of-scope CRUD
/// layer; consumed here as a collaborator interface).
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a device id to its anonymous user, creating one on first use.
    async fn user_for_device(&self, device_id: &str) -> AppResult<UserProfile>;

    async fn profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;

    /// True when either user blocks the other.
    async fn is_blocked(&self, a: Uuid, b: Uuid) -> AppResult<bool>;
}

/// Durable chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message; the store assigns id and created timestamp.
    /// `temp_id` is echoed on the returned message, never stored.
    async fn insert(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        body: &str,
        temp_id: Option<String>,
    ) -> AppResult<Message>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Flip read flags, but only on messages actually sent by `sender_id`
    /// to `recipient_id`; ids outside that direction are ignored.
    async fn mark_read(&self, ids: &[Uuid], sender_id: Uuid, recipient_id: Uuid) -> AppResult<()>;

    /// Replace any prior reaction by the same reactor, then add the new one.
    /// Errors with `NotFound` when the message does not exist.
    async fn upsert_reaction(&self, message_id: Uuid, reaction: Reaction) -> AppResult<Message>;

    /// Most recent messages of the pair's conversation, ascending by time.
    async fn conversation(&self, a: Uuid, b: Uuid, limit: u32) -> AppResult<Vec<Message>>;

    /// Latest message of every conversation the user participates in,
    /// newest conversation first.
    async fn inbox(&self, user_id: Uuid) -> AppResult<Vec<Message>>;
}

/// Durable unread-count ledger; source of truth for counts shown to a
/// recipient who was offline at send time.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Record one unseen message: create the (recipient, sender) entry or
    /// bump its count and replace the preview.
    async fn record_unseen(
        &self,
        recipient_id: Uuid,
        from_user_id: Uuid,
        from_username: &str,
        preview: &str,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Notification>;

    /// Clear the counter for one sender. Idempotent.
    async fn mark_read_from(&self, recipient_id: Uuid, from_user_id: Uuid) -> AppResult<()>;

    /// Clear all counters for the recipient. Idempotent.
    async fn mark_all_read(&self, recipient_id: Uuid) -> AppResult<()>;

    async fn list(&self, recipient_id: Uuid) -> AppResult<Vec<Notification>>;
}
