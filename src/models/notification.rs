//! Unread-thread notifications: one collapsed entry per (recipient, sender).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum characters kept in a message preview.
pub const PREVIEW_MAX_CHARS: usize = 80;

/// "Recipient has an unread thread from sender." Multiple unseen messages
/// from the same sender collapse into one entry with an incremented count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: Uuid,
    pub from_user_id: Uuid,
    pub from_username: String,
    pub message_preview: String,
    pub conversation_id: String,
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Truncate a message body to a preview, respecting char boundaries.
pub fn preview(body: &str) -> String {
    if body.chars().count() <= PREVIEW_MAX_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_unchanged() {
        assert_eq!(preview("hello"), "hello");
    }

    #[test]
    fn long_body_truncated() {
        let body = "x".repeat(200);
        let p = preview(&body);
        assert!(p.chars().count() <= PREVIEW_MAX_CHARS + 1);
        assert!(p.ends_with('…'));
    }

    #[test]
    fn multibyte_body_not_split() {
        let body = "é".repeat(100);
        let p = preview(&body);
        assert!(p.starts_with("é"));
    }
}
