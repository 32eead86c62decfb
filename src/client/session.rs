//! Client session: room subscriptions to replay on reconnect, and the
//! typing debounce. The server keeps no subscription state across a full
//! disconnect; rejoining is entirely the client's job.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::models::{ClientEvent, Coordinates};

/// `stoppedTyping` is auto-emitted this long after the last keystroke.
pub const TYPING_IDLE: Duration = Duration::from_millis(1400);

/// A room the client considers itself "in".
#[derive(Debug, Clone)]
pub enum Subscription {
    Notifications,
    City {
        city: String,
        coordinates: Option<Coordinates>,
    },
    Conversation {
        other: Uuid,
    },
}

/// Tracks subscriptions and produces the join events to replay after a
/// reconnect.
pub struct ClientSession {
    me: Uuid,
    city: Option<(String, Option<Coordinates>)>,
    conversations: Vec<Uuid>,
    notifications: bool,
}

impl ClientSession {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            city: None,
            conversations: Vec::new(),
            notifications: false,
        }
    }

    pub fn track(&mut self, sub: Subscription) {
        match sub {
            Subscription::Notifications => self.notifications = true,
            // One city at a time; a new city replaces the previous one.
            Subscription::City { city, coordinates } => self.city = Some((city, coordinates)),
            Subscription::Conversation { other } => {
                if !self.conversations.contains(&other) {
                    self.conversations.push(other);
                }
            }
        }
    }

    pub fn leave_city(&mut self) {
        self.city = None;
    }

    /// Events to emit, in order, when the transport reconnects.
    pub fn resubscribe(&self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        if self.notifications {
            events.push(ClientEvent::JoinNotifications { user_id: self.me });
        }
        if let Some((city, coordinates)) = &self.city {
            events.push(ClientEvent::WhoisJoin {
                city: city.clone(),
                coordinates: *coordinates,
            });
        }
        for other in &self.conversations {
            events.push(ClientEvent::JoinConversation {
                user_id1: self.me,
                user_id2: *other,
            });
        }
        events
    }
}

/// Emits `typing` on the first keystroke of a burst and `stoppedTyping`
/// once the burst has been idle for [`TYPING_IDLE`].
#[derive(Default)]
pub struct TypingDebouncer {
    last_keystroke: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when a `typing` emit is due (burst start).
    pub fn keystroke(&mut self, now: Instant) -> bool {
        let start = match self.last_keystroke {
            None => true,
            Some(last) => now.duration_since(last) >= TYPING_IDLE,
        };
        self.last_keystroke = Some(now);
        start
    }

    /// Returns true when a `stoppedTyping` emit is due. Call on a timer.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.last_keystroke {
            Some(last) if now.duration_since(last) >= TYPING_IDLE => {
                self.last_keystroke = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resubscribe_replays_tracked_rooms() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut session = ClientSession::new(me);

        session.track(Subscription::Notifications);
        session.track(Subscription::City { city: "lisbon".into(), coordinates: None });
        session.track(Subscription::Conversation { other });
        session.track(Subscription::Conversation { other });

        let events = session.resubscribe();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ClientEvent::JoinNotifications { user_id } if user_id == me));
        assert!(matches!(&events[1], ClientEvent::WhoisJoin { city, .. } if city == "lisbon"));
        assert!(
            matches!(events[2], ClientEvent::JoinConversation { user_id1, user_id2 }
                if user_id1 == me && user_id2 == other)
        );
    }

    #[test]
    fn new_city_replaces_previous() {
        let mut session = ClientSession::new(Uuid::new_v4());
        session.track(Subscription::City { city: "lisbon".into(), coordinates: None });
        session.track(Subscription::City { city: "porto".into(), coordinates: None });

        let events = session.resubscribe();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ClientEvent::WhoisJoin { city, .. } if city == "porto"));
    }

    #[test]
    fn typing_debounce_cycle() {
        let mut debouncer = TypingDebouncer::new();
        let t0 = Instant::now();

        assert!(debouncer.keystroke(t0));
        assert!(!debouncer.keystroke(t0 + Duration::from_millis(300)));
        // Not yet idle 1.4s after the last keystroke.
        assert!(!debouncer.poll(t0 + Duration::from_millis(1600)));
        assert!(debouncer.poll(t0 + Duration::from_millis(1701)));
        // Next keystroke starts a fresh burst.
        assert!(debouncer.keystroke(t0 + Duration::from_secs(5)));
    }
}
