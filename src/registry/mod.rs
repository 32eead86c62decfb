//! Connection and room registry for broadcasts.
//!
//! Maintains bidirectional mappings: room -> connections (broadcast) and
//! connection -> rooms (cleanup on disconnect). Per-user notification
//! fanout rides on the `notify:<user>` room each tab joins. Every
//! read-modify-write runs as one synchronous critical section under the
//! inner mutex; the lock is never held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::ServerEvent;

pub type ConnId = String;

/// Room name for a city presence room.
pub fn city_room(city: &str) -> String {
    format!("city:{}", city)
}

/// Room name for a two-party conversation.
pub fn conversation_room(conversation_id: &str) -> String {
    format!("conv:{}", conversation_id)
}

/// Room name for a user's personal notification stream.
pub fn notification_room(user_id: Uuid) -> String {
    format!("notify:{}", user_id.simple())
}

struct ConnState {
    tx: mpsc::UnboundedSender<String>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    conns: HashMap<ConnId, ConnState>,
    rooms: HashMap<String, HashSet<ConnId>>,
}

/// Shared registry of live connections. Cloneable; store in `AppState`.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with its outbound channel.
    pub fn register(&self, conn_id: &str, tx: mpsc::UnboundedSender<String>) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        inner.conns.insert(
            conn_id.to_string(),
            ConnState {
                tx,
                rooms: HashSet::new(),
            },
        );
    }

    /// Drop a connection, leaving every room it was in. Returns the rooms it
    /// occupied so the caller can run per-room departure effects.
    pub fn unregister(&self, conn_id: &str) -> Vec<String> {
        let mut inner = self.inner.lock().expect("registry poisoned");
        let Some(state) = inner.conns.remove(conn_id) else {
            return Vec::new();
        };
        for room in &state.rooms {
            if let Some(members) = inner.rooms.get_mut(room) {
                members.remove(conn_id);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
            }
        }
        state.rooms.into_iter().collect()
    }

    /// Join a room. Unknown connections are ignored.
    pub fn join(&self, conn_id: &str, room: &str) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        let Some(state) = inner.conns.get_mut(conn_id) else {
            return;
        };
        state.rooms.insert(room.to_string());
        inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id.to_string());
    }

    /// Leave a room.
    pub fn leave(&self, conn_id: &str, room: &str) {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if let Some(state) = inner.conns.get_mut(conn_id) {
            state.rooms.remove(room);
        }
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(conn_id);
            if members.is_empty() {
                inner.rooms.remove(room);
            }
        }
    }

    /// Rooms the connection currently occupies.
    pub fn rooms_of(&self, conn_id: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("registry poisoned");
        inner
            .conns
            .get(conn_id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Broadcast to every connection in a room. Fire-and-forget: a closed
    /// receiver is skipped, delivery is not acknowledged.
    pub fn broadcast(&self, room: &str, event: &ServerEvent) -> usize {
        self.send_room(room, event, None)
    }

    /// Broadcast to a room, excluding one connection (typically the emitter).
    pub fn broadcast_except(&self, room: &str, except: &str, event: &ServerEvent) -> usize {
        self.send_room(room, event, Some(except))
    }

    fn send_room(&self, room: &str, event: &ServerEvent, except: Option<&str>) -> usize {
        let payload = event.to_payload();
        let inner = self.inner.lock().expect("registry poisoned");
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };
        let mut sent = 0;
        for conn_id in members {
            if Some(conn_id.as_str()) == except {
                continue;
            }
            if let Some(state) = inner.conns.get(conn_id) {
                if state.tx.send(payload.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Send an event to a single connection (scoped errors).
    pub fn send_to_conn(&self, conn_id: &str, event: &ServerEvent) {
        let inner = self.inner.lock().expect("registry poisoned");
        if let Some(state) = inner.conns.get(conn_id) {
            let _ = state.tx.send(event.to_payload());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(reg: &RoomRegistry, id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        reg.register(id, tx);
        rx
    }

    #[test]
    fn broadcast_reaches_room_members_only() {
        let reg = RoomRegistry::new();
        let b = Uuid::new_v4();
        let mut rx_a = conn(&reg, "c1");
        let mut rx_b = conn(&reg, "c2");
        reg.join("c1", "city:lisbon");

        let sent = reg.broadcast("city:lisbon", &ServerEvent::UserOnline { user_id: b });
        assert_eq!(sent, 1);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_except_skips_emitter() {
        let reg = RoomRegistry::new();
        let mut rx_a = conn(&reg, "c1");
        let mut rx_b = conn(&reg, "c2");
        reg.join("c1", "r");
        reg.join("c2", "r");

        reg.broadcast_except("r", "c1", &ServerEvent::Typing { from: Uuid::nil() });
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn notification_room_reaches_subscribed_tabs_only() {
        let reg = RoomRegistry::new();
        let user = Uuid::new_v4();
        let mut rx1 = conn(&reg, "tab1");
        let mut rx2 = conn(&reg, "tab2");
        let mut rx3 = conn(&reg, "tab3");
        reg.join("tab1", &notification_room(user));
        reg.join("tab2", &notification_room(user));

        let sent = reg.broadcast(
            &notification_room(user),
            &ServerEvent::UserOnline { user_id: user },
        );
        assert_eq!(sent, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn broadcast_to_empty_room_reaches_zero() {
        let reg = RoomRegistry::new();
        assert_eq!(
            reg.broadcast(
                &notification_room(Uuid::new_v4()),
                &ServerEvent::UserOnline { user_id: Uuid::nil() },
            ),
            0
        );
    }

    #[test]
    fn unregister_cleans_rooms() {
        let reg = RoomRegistry::new();
        let user = Uuid::new_v4();
        let _rx = conn(&reg, "c1");
        reg.join("c1", "city:lisbon");
        reg.join("c1", "conv:x");

        let mut rooms = reg.unregister("c1");
        rooms.sort();
        assert_eq!(rooms, vec!["city:lisbon".to_string(), "conv:x".to_string()]);
        assert_eq!(reg.broadcast("city:lisbon", &ServerEvent::UserOffline { user_id: user }), 0);
    }
}
