//! Conversation channel: persist, broadcast, and fan out chat events.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{conversation_id, notification, Message, Reaction, ServerEvent};
use crate::registry::{conversation_room, notification_room, RoomRegistry};
use crate::store::{MessageStore, NotificationStore, UserDirectory};

/// Orchestrates the message path: persist via the store, broadcast to the
/// conversation room, and notify the recipient's live connections.
#[derive(Clone)]
pub struct ChatService {
    messages: Arc<dyn MessageStore>,
    notifications: Arc<dyn NotificationStore>,
    users: Arc<dyn UserDirectory>,
    registry: RoomRegistry,
}

impl ChatService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        notifications: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        registry: RoomRegistry,
    ) -> Self {
        Self {
            messages,
            notifications,
            users,
            registry,
        }
    }

    /// Persist and deliver a message. The broadcast echo carries the
    /// sender's `temp_id`; the notification fanout reaches every recipient
    /// connection subscribed via `joinNotifications` (possibly zero) while
    /// the durable ledger accumulates the unread count regardless.
    pub async fn send(
        &self,
        sender_id: Uuid,
        to: Uuid,
        body: &str,
        temp_id: Option<String>,
    ) -> AppResult<Message> {
        if body.trim().is_empty() {
            return Err(AppError::Validation("empty message body".to_string()));
        }

        let msg = self.messages.insert(sender_id, to, body, temp_id).await?;

        let room = conversation_room(&msg.conversation_id);
        self.registry
            .broadcast(&room, &ServerEvent::MessageNew { message: msg.clone() });

        let sender_name = self
            .users
            .profile(sender_id)
            .await?
            .map(|p| p.username)
            .unwrap_or_else(|| "unknown".to_string());

        let entry = self
            .notifications
            .record_unseen(
                to,
                sender_id,
                &sender_name,
                &notification::preview(body),
                &msg.conversation_id,
                msg.created_at,
            )
            .await?;

        let reached = self.registry.broadcast(
            &notification_room(to),
            &ServerEvent::NotificationNew {
                from_user_id: sender_id,
                from_username: sender_name,
                message_preview: entry.message_preview,
                created_at: msg.created_at,
                conversation_id: msg.conversation_id.clone(),
            },
        );
        info!(
            conversation_id = %msg.conversation_id,
            message_id = %msg.id,
            reached,
            "message delivered"
        );
        Ok(msg)
    }

    /// Flip read flags and confirm to the conversation so the original
    /// sender's client can move its copies to "read".
    pub async fn mark_read(
        &self,
        from_user_id: Uuid,
        to_user_id: Uuid,
        message_ids: Vec<Uuid>,
    ) -> AppResult<()> {
        if message_ids.is_empty() {
            return Err(AppError::Validation("messageIds must not be empty".to_string()));
        }
        self.messages.mark_read(&message_ids, from_user_id, to_user_id).await?;
        let room = conversation_room(&conversation_id(from_user_id, to_user_id));
        self.registry
            .broadcast(&room, &ServerEvent::MessageReadConfirm { message_ids });
        Ok(())
    }

    /// Upsert-replace a reaction and broadcast the result into the stored
    /// message's conversation room. The caller sends the scoped
    /// `message:reaction:error` on failure.
    pub async fn react(
        &self,
        actor: Uuid,
        message_id: Uuid,
        reaction: Reaction,
    ) -> AppResult<Message> {
        if reaction.from_user_id != actor {
            return Err(AppError::Auth("reaction actor mismatch".to_string()));
        }
        let existing = self
            .messages
            .get(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("message {}", message_id)))?;
        if existing.sender_id != actor && existing.recipient_id != actor {
            warn!(message_id = %message_id, "reaction on foreign conversation rejected");
            return Err(AppError::Auth("not a participant".to_string()));
        }
        let updated = self.messages.upsert_reaction(message_id, reaction.clone()).await?;
        let room = conversation_room(&existing.conversation_id);
        self.registry
            .broadcast(&room, &ServerEvent::MessageReaction { message_id, reaction });
        Ok(updated)
    }

    /// Optimistic delete: re-broadcast only; durable removal is a
    /// best-effort concern outside this core.
    pub async fn delete(&self, actor: Uuid, message_id: Uuid) -> AppResult<()> {
        let Some(msg) = self.messages.get(message_id).await? else {
            debug!(message_id = %message_id, "delete for unknown message ignored");
            return Ok(());
        };
        if msg.sender_id != actor && msg.recipient_id != actor {
            return Err(AppError::Auth("not a participant".to_string()));
        }
        let room = conversation_room(&msg.conversation_id);
        self.registry
            .broadcast(&room, &ServerEvent::MessageDelete { message_id });
        Ok(())
    }
}
