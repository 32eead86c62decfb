//! PostgreSQL store: users, messages (reactions as jsonb), notification
//! ledger. Schema in `migrations/0001_init.sql`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{conversation_id, Message, Notification, Reaction};

use super::{MessageStore, NotificationStore, UserDirectory, UserProfile};

pub type DbPool = sqlx::PgPool;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Postgres-backed implementation of all three store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    /// Open a pool sized from config and wrap it.
    pub async fn connect(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    deleted: bool,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        UserProfile {
            id: row.id,
            username: row.username,
            deleted: row.deleted,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    conversation_id: String,
    body: String,
    created_at: DateTime<Utc>,
    read: bool,
    reactions: Json<Vec<Reaction>>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            conversation_id: row.conversation_id,
            body: row.body,
            created_at: row.created_at,
            read: row.read,
            reactions: row.reactions.0,
            temp_id: None,
        }
    }
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    recipient_id: Uuid,
    from_user_id: Uuid,
    from_username: String,
    message_preview: String,
    conversation_id: String,
    unread_count: i32,
    updated_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            recipient_id: row.recipient_id,
            from_user_id: row.from_user_id,
            from_username: row.from_username,
            message_preview: row.message_preview,
            conversation_id: row.conversation_id,
            unread_count: row.unread_count.max(0) as u32,
            updated_at: row.updated_at,
        }
    }
}

const MESSAGE_COLUMNS: &str =
    r#"id, sender_id, recipient_id, conversation_id, body, created_at, "read", reactions"#;

#[async_trait]
impl UserDirectory for PgStore {
    async fn user_for_device(&self, device_id: &str) -> AppResult<UserProfile> {
        let id = Uuid::new_v4();
        let username = format!("traveler-{}", &id.simple().to_string()[..8]);
        // ON CONFLICT DO UPDATE keeps the existing row but still RETURNs it.
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, device_id, username)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id) DO UPDATE SET device_id = EXCLUDED.device_id
            RETURNING id, username, deleted
            "#,
        )
        .bind(id)
        .bind(device_id)
        .bind(&username)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, deleted FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM blocks
                WHERE (blocker_id = $1 AND blocked_id = $2)
                   OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;
        Ok(blocked)
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn insert(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        body: &str,
        temp_id: Option<String>,
    ) -> AppResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages (sender_id, recipient_id, conversation_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(sender_id)
        .bind(recipient_id)
        .bind(conversation_id(sender_id, recipient_id))
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        let mut msg: Message = row.into();
        msg.temp_id = temp_id;
        Ok(msg)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn mark_read(&self, ids: &[Uuid], sender_id: Uuid, recipient_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE messages SET "read" = true
            WHERE id = ANY($1) AND sender_id = $2 AND recipient_id = $3
            "#,
        )
        .bind(ids)
        .bind(sender_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_reaction(&self, message_id: Uuid, reaction: Reaction) -> AppResult<Message> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            UPDATE messages
            SET reactions = (
                SELECT coalesce(jsonb_agg(r), '[]'::jsonb)
                FROM jsonb_array_elements(reactions) AS r
                WHERE r->>'fromUserId' <> $2
            ) || $3
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#,
        ))
        .bind(message_id)
        .bind(reaction.from_user_id.to_string())
        .bind(Json(vec![reaction]))
        .fetch_optional(&self.pool)
        .await?;
        let row = row.ok_or_else(|| AppError::NotFound(format!("message {}", message_id)))?;
        Ok(row.into())
    }

    async fn conversation(&self, a: Uuid, b: Uuid, limit: u32) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE conversation_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC
            "#,
        ))
        .bind(conversation_id(a, b))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn inbox(&self, user_id: Uuid) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT DISTINCT ON (conversation_id) {MESSAGE_COLUMNS}
                FROM messages
                WHERE sender_id = $1 OR recipient_id = $1
                ORDER BY conversation_id, created_at DESC
            ) latest
            ORDER BY created_at DESC
            "#,
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn record_unseen(
        &self,
        recipient_id: Uuid,
        from_user_id: Uuid,
        from_username: &str,
        preview: &str,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO notifications
                (recipient_id, from_user_id, from_username, message_preview, conversation_id, unread_count, updated_at)
            VALUES ($1, $2, $3, $4, $5, 1, $6)
            ON CONFLICT (recipient_id, from_user_id) DO UPDATE SET
                unread_count = notifications.unread_count + 1,
                message_preview = EXCLUDED.message_preview,
                from_username = EXCLUDED.from_username,
                updated_at = EXCLUDED.updated_at
            RETURNING recipient_id, from_user_id, from_username, message_preview, conversation_id, unread_count, updated_at
            "#,
        )
        .bind(recipient_id)
        .bind(from_user_id)
        .bind(from_username)
        .bind(preview)
        .bind(conversation_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn mark_read_from(&self, recipient_id: Uuid, from_user_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM notifications WHERE recipient_id = $1 AND from_user_id = $2")
            .bind(recipient_id)
            .bind(from_user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM notifications WHERE recipient_id = $1")
            .bind(recipient_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, recipient_id: Uuid) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT recipient_id, from_user_id, from_username, message_preview, conversation_id, unread_count, updated_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
