//! WebSocket protocol: closed event enums for both directions.
//!
//! Inbound events are a tagged enum matched exhaustively, so an unhandled
//! event kind is a compile error rather than a silently dropped string.
//! Wire shape is `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{Message, Reaction};
use super::presence::Coordinates;

/// Client → server events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Subscribe to the personal notification stream.
    #[serde(rename = "joinNotifications")]
    JoinNotifications {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
    /// Enter a city presence room.
    #[serde(rename = "whois:join")]
    WhoisJoin {
        city: String,
        #[serde(default)]
        coordinates: Option<Coordinates>,
    },
    /// Leave the current city presence room. Wire payload is an empty object.
    #[serde(rename = "whois:leave")]
    WhoisLeave {},
    /// Enter the 2-party chat room for the given pair.
    #[serde(rename = "joinConversation")]
    JoinConversation {
        #[serde(rename = "userId1")]
        user_id1: Uuid,
        #[serde(rename = "userId2")]
        user_id2: Uuid,
    },
    /// Send a chat message. `temp_id` is echoed back for reconciliation.
    #[serde(rename = "message")]
    Message {
        to: Uuid,
        message: String,
        #[serde(rename = "tempId", default)]
        temp_id: Option<String>,
    },
    /// Mark the listed messages read.
    #[serde(rename = "message:read")]
    MessageRead {
        #[serde(rename = "fromUserId")]
        from_user_id: Uuid,
        #[serde(rename = "toUserId")]
        to_user_id: Uuid,
        #[serde(rename = "messageIds")]
        message_ids: Vec<Uuid>,
    },
    /// Add or replace a reaction on a message.
    #[serde(rename = "message:reaction")]
    MessageReaction {
        #[serde(rename = "messageId")]
        message_id: Uuid,
        reaction: Reaction,
        #[serde(rename = "toUserId")]
        to_user_id: Uuid,
    },
    /// Optimistic client-local delete; re-broadcast, best-effort only.
    #[serde(rename = "message:delete")]
    MessageDelete {
        #[serde(rename = "messageId")]
        message_id: Uuid,
    },
    #[serde(rename = "typing")]
    Typing { to: Uuid },
    #[serde(rename = "stoppedTyping")]
    StoppedTyping { to: Uuid },
}

/// Server → client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "userOnline")]
    UserOnline {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
    #[serde(rename = "userOffline")]
    UserOffline {
        #[serde(rename = "userId")]
        user_id: Uuid,
    },
    #[serde(rename = "notification:new")]
    NotificationNew {
        #[serde(rename = "fromUserId")]
        from_user_id: Uuid,
        #[serde(rename = "fromUsername")]
        from_username: String,
        #[serde(rename = "messagePreview")]
        message_preview: String,
        #[serde(rename = "createdAt")]
        created_at: chrono::DateTime<chrono::Utc>,
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    #[serde(rename = "message:new")]
    MessageNew { message: Message },
    /// Send failed; scoped to the sender's connection only.
    #[serde(rename = "message:error")]
    MessageError {
        #[serde(rename = "tempId")]
        temp_id: Option<String>,
        error: String,
    },
    #[serde(rename = "message:read:confirm")]
    MessageReadConfirm {
        #[serde(rename = "messageIds")]
        message_ids: Vec<Uuid>,
    },
    #[serde(rename = "message:reaction")]
    MessageReaction {
        #[serde(rename = "messageId")]
        message_id: Uuid,
        reaction: Reaction,
    },
    /// Reaction rejected; scoped to the actor's connection only.
    #[serde(rename = "message:reaction:error")]
    MessageReactionError {
        #[serde(rename = "messageId")]
        message_id: Uuid,
        emoji: String,
        #[serde(rename = "fromUserId")]
        from_user_id: Uuid,
    },
    #[serde(rename = "message:delete")]
    MessageDelete {
        #[serde(rename = "messageId")]
        message_id: Uuid,
    },
    #[serde(rename = "typing")]
    Typing { from: Uuid },
    #[serde(rename = "stoppedTyping")]
    StoppedTyping { from: Uuid },
    /// Malformed or rejected payload; scoped to the offending connection.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Serialize for the wire. Infallible by construction of the enum.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"event":"error","data":{"message":"serialization failure"}}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_round_trips_colon_names() {
        let raw = r#"{"event":"whois:join","data":{"city":"Lisbon","coordinates":{"lat":38.7,"lng":-9.1}}}"#;
        let ev: ClientEvent = serde_json::from_str(raw).unwrap();
        match ev {
            ClientEvent::WhoisJoin { city, coordinates } => {
                assert_eq!(city, "Lisbon");
                assert!(coordinates.is_some());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn client_event_message_optional_temp_id() {
        let to = Uuid::new_v4();
        let raw = format!(r#"{{"event":"message","data":{{"to":"{}","message":"hi"}}}}"#, to);
        let ev: ClientEvent = serde_json::from_str(&raw).unwrap();
        match ev {
            ClientEvent::Message { temp_id, .. } => assert!(temp_id.is_none()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn whois_leave_accepts_empty_object_data() {
        let ev: ClientEvent =
            serde_json::from_str(r#"{"event":"whois:leave","data":{}}"#).unwrap();
        assert!(matches!(ev, ClientEvent::WhoisLeave {}));
    }

    #[test]
    fn server_event_wire_shape() {
        let ev = ServerEvent::UserOnline { user_id: Uuid::nil() };
        let json: serde_json::Value = serde_json::from_str(&ev.to_payload()).unwrap();
        assert_eq!(json["event"], "userOnline");
        assert_eq!(json["data"]["userId"], Uuid::nil().to_string());
    }

    #[test]
    fn unknown_event_is_rejected() {
        let res = serde_json::from_str::<ClientEvent>(r#"{"event":"nope","data":{}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        // message:reaction without messageId must not parse
        let res = serde_json::from_str::<ClientEvent>(
            r#"{"event":"message:reaction","data":{"reaction":{"emoji":"x","fromUserId":"00000000-0000-0000-0000-000000000000"},"toUserId":"00000000-0000-0000-0000-000000000000"}}"#,
        );
        assert!(res.is_err());
    }
}
