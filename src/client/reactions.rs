//! Optimistic reactions: promise-with-timeout, rolled back after 8s.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::models::Reaction;

/// How long the client waits for a reaction echo before reverting.
/// The server is never told about this timeout; it only cancels the wait.
pub const REACTION_TIMEOUT: Duration = Duration::from_secs(8);

struct PendingReaction {
    emoji: String,
    /// Emoji shown before the optimistic apply, restored on rollback.
    previous: Option<String>,
    deadline: Instant,
}

/// A reverted optimistic reaction; surface a failure toast and restore
/// `previous` in the rendered reaction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolledBack {
    pub message_id: Uuid,
    pub emoji: String,
    pub previous: Option<String>,
}

/// Client-side pending-reaction table, one slot per message (a reactor has
/// at most one reaction per message, so a newer click replaces the slot).
pub struct PendingReactions {
    me: Uuid,
    pending: HashMap<Uuid, PendingReaction>,
}

impl PendingReactions {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            pending: HashMap::new(),
        }
    }

    /// Apply optimistically and arm the timeout.
    pub fn apply(&mut self, message_id: Uuid, emoji: &str, previous: Option<String>, now: Instant) {
        self.pending.insert(
            message_id,
            PendingReaction {
                emoji: emoji.to_string(),
                previous,
                deadline: now + REACTION_TIMEOUT,
            },
        );
    }

    /// Feed a `message:reaction` broadcast. Our own echo resolves the slot
    /// (timer cancelled); other users' reactions are ignored here.
    pub fn resolve(&mut self, message_id: Uuid, reaction: &Reaction) -> bool {
        if reaction.from_user_id != self.me {
            return false;
        }
        self.pending.remove(&message_id).is_some()
    }

    /// Explicit `message:reaction:error` for this actor.
    pub fn fail(&mut self, message_id: Uuid) -> Option<RolledBack> {
        self.pending.remove(&message_id).map(|p| RolledBack {
            message_id,
            emoji: p.emoji,
            previous: p.previous,
        })
    }

    /// Roll back every slot whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<RolledBack> {
        let expired: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|(_, p)| now >= p.deadline)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.fail(id))
            .collect()
    }

    pub fn is_pending(&self, message_id: Uuid) -> bool {
        self.pending.contains_key(&message_id)
    }
}
