//! Optimistic message outbox: temp-id correlation and echo reconciliation.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::Message;

/// Window inside which a server echo without a temp id may still be matched
/// to an optimistic copy by content fingerprint.
pub const FINGERPRINT_WINDOW: Duration = Duration::seconds(60);

/// Lifecycle of one rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    /// Optimistic local copy, not yet confirmed.
    Sending,
    /// Server echoed; real id assigned.
    Sent,
    /// Read receipt confirmed by the counterpart.
    Read,
    /// Send failed; stays visible, manual resend only.
    Failed(String),
}

/// One message as the client renders it, local or confirmed.
#[derive(Debug, Clone)]
pub struct LocalMessage {
    /// Client correlation token; only outgoing messages carry one.
    pub temp_id: Option<String>,
    pub server_id: Option<Uuid>,
    pub peer: Uuid,
    pub body: String,
    pub mine: bool,
    pub state: SendState,
    pub queued_at: DateTime<Utc>,
}

/// Outcome of feeding a `message:new` broadcast into the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// An optimistic copy was confirmed; exactly one rendered message remains.
    Confirmed { temp_id: String, server_id: Uuid },
    /// Re-delivery of something already rendered; dropped.
    Duplicate,
    /// A counterpart (or own other-device) message was appended.
    /// `should_mark_read` asks the caller to emit `message:read` now —
    /// read-on-view, not read-on-explicit-action.
    Incoming { should_mark_read: bool },
}

/// Client-side optimistic send state for one conversation view.
pub struct Outbox {
    me: Uuid,
    messages: Vec<LocalMessage>,
    /// temp id -> index into `messages`, for entries still awaiting echo.
    pending: HashMap<String, usize>,
}

impl Outbox {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            messages: Vec::new(),
            pending: HashMap::new(),
        }
    }

    /// Queue an optimistic send. Returns the temp id to attach to the emit.
    pub fn send(&mut self, peer: Uuid, body: &str, now: DateTime<Utc>) -> String {
        let temp_id = format!("tmp-{}", Uuid::new_v4().simple());
        self.messages.push(LocalMessage {
            temp_id: Some(temp_id.clone()),
            server_id: None,
            peer,
            body: body.to_string(),
            mine: true,
            state: SendState::Sending,
            queued_at: now,
        });
        self.pending.insert(temp_id.clone(), self.messages.len() - 1);
        temp_id
    }

    /// Reconcile a `message:new` broadcast against local state.
    pub fn on_message_new(&mut self, msg: &Message) -> Reconciliation {
        if self.messages.iter().any(|m| m.server_id == Some(msg.id)) {
            return Reconciliation::Duplicate;
        }

        if msg.sender_id == self.me {
            // Temp-id echo first, then content+time fingerprint.
            let idx = msg
                .temp_id
                .as_deref()
                .and_then(|t| self.pending.get(t).copied())
                .or_else(|| self.fingerprint_match(msg));

            if let Some(idx) = idx {
                let local = &mut self.messages[idx];
                local.server_id = Some(msg.id);
                local.state = SendState::Sent;
                let temp_id = local.temp_id.clone().unwrap_or_default();
                self.pending.remove(&temp_id);
                return Reconciliation::Confirmed { temp_id, server_id: msg.id };
            }

            // Own message sent from another tab/device.
            self.push_confirmed(msg, true);
            return Reconciliation::Incoming { should_mark_read: false };
        }

        self.push_confirmed(msg, false);
        Reconciliation::Incoming { should_mark_read: !msg.read }
    }

    fn fingerprint_match(&self, msg: &Message) -> Option<usize> {
        self.messages.iter().position(|m| {
            m.mine
                && m.state == SendState::Sending
                && m.body == msg.body
                && (msg.created_at - m.queued_at).abs() < FINGERPRINT_WINDOW
        })
    }

    fn push_confirmed(&mut self, msg: &Message, mine: bool) {
        self.messages.push(LocalMessage {
            temp_id: None,
            server_id: Some(msg.id),
            peer: if mine { msg.recipient_id } else { msg.sender_id },
            body: msg.body.clone(),
            mine,
            state: if msg.read { SendState::Read } else { SendState::Sent },
            queued_at: msg.created_at,
        });
    }

    /// `message:read:confirm` — flip own confirmed messages to read.
    pub fn on_read_confirm(&mut self, message_ids: &[Uuid]) {
        for m in self.messages.iter_mut() {
            if m.mine && m.server_id.map(|id| message_ids.contains(&id)).unwrap_or(false) {
                m.state = SendState::Read;
            }
        }
    }

    /// `message:error` — the send failed; keep it visible in failed state.
    pub fn on_send_error(&mut self, temp_id: &str, error: &str) {
        if let Some(idx) = self.pending.remove(temp_id) {
            self.messages[idx].state = SendState::Failed(error.to_string());
        }
    }

    /// Optimistic local delete (UI-only removal).
    pub fn remove(&mut self, server_id: Uuid) {
        self.messages.retain(|m| m.server_id != Some(server_id));
        self.reindex();
    }

    /// Collect abandoned sends: `Sending` entries older than `horizon` are
    /// flipped to failed and dropped from the correlation table. Returns the
    /// abandoned temp ids.
    pub fn gc(&mut self, now: DateTime<Utc>, horizon: Duration) -> Vec<String> {
        let mut abandoned = Vec::new();
        for m in self.messages.iter_mut() {
            if m.state == SendState::Sending && now.signed_duration_since(m.queued_at) > horizon {
                m.state = SendState::Failed("send abandoned".to_string());
                if let Some(t) = &m.temp_id {
                    abandoned.push(t.clone());
                }
            }
        }
        for t in &abandoned {
            self.pending.remove(t);
        }
        abandoned
    }

    fn reindex(&mut self) {
        self.pending.clear();
        for (idx, m) in self.messages.iter().enumerate() {
            if m.state == SendState::Sending {
                if let Some(t) = &m.temp_id {
                    self.pending.insert(t.clone(), idx);
                }
            }
        }
    }

    pub fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }
}
