//! In-memory store for tests and local development. Single mutex per
//! collection; every mutation is one synchronous critical section.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{conversation_id, Message, Notification, Reaction};

use super::{MessageStore, NotificationStore, UserDirectory, UserProfile};

#[derive(Default)]
struct Users {
    by_device: HashMap<String, Uuid>,
    profiles: HashMap<Uuid, UserProfile>,
    /// Directed block edges (blocker, blocked).
    blocks: HashSet<(Uuid, Uuid)>,
}

/// One struct backing all three store traits.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Users>,
    messages: Mutex<Vec<Message>>,
    notifications: Mutex<HashMap<(Uuid, Uuid), Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: register a profile directly.
    pub fn put_profile(&self, profile: UserProfile) {
        let mut users = self.users.lock().expect("users poisoned");
        users.profiles.insert(profile.id, profile);
    }

    /// Test helper: have `blocker` block `blocked`.
    pub fn block(&self, blocker: Uuid, blocked: Uuid) {
        let mut users = self.users.lock().expect("users poisoned");
        users.blocks.insert((blocker, blocked));
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn user_for_device(&self, device_id: &str) -> AppResult<UserProfile> {
        let mut users = self.users.lock().expect("users poisoned");
        if let Some(id) = users.by_device.get(device_id) {
            if let Some(profile) = users.profiles.get(id) {
                return Ok(profile.clone());
            }
        }
        let id = Uuid::new_v4();
        let profile = UserProfile {
            id,
            username: format!("traveler-{}", &id.simple().to_string()[..8]),
            deleted: false,
        };
        users.by_device.insert(device_id.to_string(), id);
        users.profiles.insert(id, profile.clone());
        Ok(profile)
    }

    async fn profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let users = self.users.lock().expect("users poisoned");
        Ok(users.profiles.get(&user_id).cloned())
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let users = self.users.lock().expect("users poisoned");
        Ok(users.blocks.contains(&(a, b)) || users.blocks.contains(&(b, a)))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        body: &str,
        temp_id: Option<String>,
    ) -> AppResult<Message> {
        let msg = Message {
            id: Uuid::new_v4(),
            sender_id,
            recipient_id,
            conversation_id: conversation_id(sender_id, recipient_id),
            body: body.to_string(),
            created_at: Utc::now(),
            read: false,
            reactions: Vec::new(),
            temp_id,
        };
        let mut stored = msg.clone();
        stored.temp_id = None;
        self.messages.lock().expect("messages poisoned").push(stored);
        Ok(msg)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        let messages = self.messages.lock().expect("messages poisoned");
        Ok(messages.iter().find(|m| m.id == id).cloned())
    }

    async fn mark_read(&self, ids: &[Uuid], sender_id: Uuid, recipient_id: Uuid) -> AppResult<()> {
        let mut messages = self.messages.lock().expect("messages poisoned");
        for msg in messages.iter_mut() {
            if ids.contains(&msg.id) && msg.sender_id == sender_id && msg.recipient_id == recipient_id {
                msg.read = true;
            }
        }
        Ok(())
    }

    async fn upsert_reaction(&self, message_id: Uuid, reaction: Reaction) -> AppResult<Message> {
        let mut messages = self.messages.lock().expect("messages poisoned");
        let msg = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| AppError::NotFound(format!("message {}", message_id)))?;
        msg.reactions.retain(|r| r.from_user_id != reaction.from_user_id);
        msg.reactions.push(reaction);
        Ok(msg.clone())
    }

    async fn conversation(&self, a: Uuid, b: Uuid, limit: u32) -> AppResult<Vec<Message>> {
        let conv = conversation_id(a, b);
        let messages = self.messages.lock().expect("messages poisoned");
        let mut out: Vec<Message> = messages
            .iter()
            .filter(|m| m.conversation_id == conv)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        let skip = out.len().saturating_sub(limit as usize);
        Ok(out.into_iter().skip(skip).collect())
    }

    async fn inbox(&self, user_id: Uuid) -> AppResult<Vec<Message>> {
        let messages = self.messages.lock().expect("messages poisoned");
        let mut latest: HashMap<String, Message> = HashMap::new();
        for msg in messages.iter() {
            if msg.sender_id != user_id && msg.recipient_id != user_id {
                continue;
            }
            match latest.get(&msg.conversation_id) {
                Some(prev) if prev.created_at >= msg.created_at => {}
                _ => {
                    latest.insert(msg.conversation_id.clone(), msg.clone());
                }
            }
        }
        let mut out: Vec<Message> = latest.into_values().collect();
        out.sort_by(|x, y| y.created_at.cmp(&x.created_at));
        Ok(out)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn record_unseen(
        &self,
        recipient_id: Uuid,
        from_user_id: Uuid,
        from_username: &str,
        preview: &str,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> AppResult<Notification> {
        let mut notifications = self.notifications.lock().expect("notifications poisoned");
        let entry = notifications
            .entry((recipient_id, from_user_id))
            .and_modify(|n| {
                n.unread_count += 1;
                n.message_preview = preview.to_string();
                n.updated_at = at;
            })
            .or_insert_with(|| Notification {
                recipient_id,
                from_user_id,
                from_username: from_username.to_string(),
                message_preview: preview.to_string(),
                conversation_id: conversation_id.to_string(),
                unread_count: 1,
                updated_at: at,
            });
        Ok(entry.clone())
    }

    async fn mark_read_from(&self, recipient_id: Uuid, from_user_id: Uuid) -> AppResult<()> {
        let mut notifications = self.notifications.lock().expect("notifications poisoned");
        notifications.remove(&(recipient_id, from_user_id));
        Ok(())
    }

    async fn mark_all_read(&self, recipient_id: Uuid) -> AppResult<()> {
        let mut notifications = self.notifications.lock().expect("notifications poisoned");
        notifications.retain(|(rec, _), _| *rec != recipient_id);
        Ok(())
    }

    async fn list(&self, recipient_id: Uuid) -> AppResult<Vec<Notification>> {
        let notifications = self.notifications.lock().expect("notifications poisoned");
        let mut out: Vec<Notification> = notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        out.sort_by(|x, y| y.updated_at.cmp(&x.updated_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn device_id_maps_to_stable_user() {
        let store = MemoryStore::new();
        let first = store.user_for_device("device-123456").await.unwrap();
        let second = store.user_for_device("device-123456").await.unwrap();
        assert_eq!(first.id, second.id);
        let other = store.user_for_device("device-654321").await.unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn reaction_upsert_replaces_same_reactor() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let msg = store.insert(a, b, "hi", None).await.unwrap();

        store
            .upsert_reaction(msg.id, Reaction { emoji: "👍".into(), from_user_id: a })
            .await
            .unwrap();
        let updated = store
            .upsert_reaction(msg.id, Reaction { emoji: "❤️".into(), from_user_id: a })
            .await
            .unwrap();

        assert_eq!(updated.reactions.len(), 1);
        assert_eq!(updated.reactions[0].emoji, "❤️");
    }

    #[tokio::test]
    async fn mark_read_only_touches_the_given_direction() {
        let store = MemoryStore::new();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let own = store.insert(a, b, "for b", None).await.unwrap();
        let foreign = store.insert(c, d, "for d", None).await.unwrap();
        let reply = store.insert(b, a, "from b", None).await.unwrap();

        store.mark_read(&[own.id, foreign.id, reply.id], a, b).await.unwrap();

        assert!(store.get(own.id).await.unwrap().unwrap().read);
        // Another pair's message, and the opposite direction, stay unread.
        assert!(!store.get(foreign.id).await.unwrap().unwrap().read);
        assert!(!store.get(reply.id).await.unwrap().unwrap().read);
    }

    #[tokio::test]
    async fn reaction_on_missing_message_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .upsert_reaction(
                Uuid::new_v4(),
                Reaction { emoji: "👍".into(), from_user_id: Uuid::new_v4() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn notification_collapse_counts_per_sender() {
        let store = MemoryStore::new();
        let (rec, from) = (Uuid::new_v4(), Uuid::new_v4());
        for i in 0..3 {
            store
                .record_unseen(rec, from, "ana", &format!("msg {}", i), "conv", Utc::now())
                .await
                .unwrap();
        }
        let list = store.list(rec).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].unread_count, 3);
        assert_eq!(list[0].message_preview, "msg 2");
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let store = MemoryStore::new();
        let (rec, from) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .record_unseen(rec, from, "ana", "hey", "conv", Utc::now())
            .await
            .unwrap();
        store.mark_read_from(rec, from).await.unwrap();
        store.mark_read_from(rec, from).await.unwrap();
        assert!(store.list(rec).await.unwrap().is_empty());
        store.mark_all_read(rec).await.unwrap();
    }

    #[tokio::test]
    async fn inbox_keeps_latest_message_per_conversation() {
        let store = MemoryStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.insert(a, b, "first", None).await.unwrap();
        store.insert(b, a, "second", None).await.unwrap();
        store.insert(c, a, "other thread", None).await.unwrap();

        let inbox = store.inbox(a).await.unwrap();
        assert_eq!(inbox.len(), 2);
        let ab: Vec<_> = inbox
            .iter()
            .filter(|m| m.conversation_id == conversation_id(a, b))
            .collect();
        assert_eq!(ab.len(), 1);
        assert_eq!(ab[0].body, "second");
    }
}
