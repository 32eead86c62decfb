//! Chat messages and reactions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One emoji reaction by one user. A message carries at most one reaction
/// per reactor; reacting again replaces the previous emoji.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub from_user_id: Uuid,
}

/// A direct message between two users. The durable shape is owned by the
/// store; `temp_id` is only present on the first server echo so the sender
/// can reconcile its optimistic copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub conversation_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
}

/// Deterministic, order-independent conversation id for a pair of users.
pub fn conversation_id(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}_{}", lo.simple(), hi.simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(conversation_id(a, b), conversation_id(b, a));
    }

    #[test]
    fn conversation_id_distinguishes_pairs() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_ne!(conversation_id(a, b), conversation_id(a, c));
    }

    #[test]
    fn temp_id_skipped_when_absent() {
        let msg = Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            conversation_id: "x".to_string(),
            body: "hi".to_string(),
            created_at: Utc::now(),
            read: false,
            reactions: vec![],
            temp_id: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tempId").is_none());
        assert!(json.get("senderId").is_some());
    }
}
