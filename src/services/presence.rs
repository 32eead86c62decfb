//! Presence registry: who is visible in which city.
//!
//! In-memory map keyed by user id with a secondary city index, behind the
//! `PresenceStore` seam so a multi-process deployment could swap in a
//! shared backend. All operations are single synchronous critical sections.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{Coordinates, PresenceEntry};

/// Result of a join or ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEffect {
    /// The user just became visible in this city; broadcast `userOnline`.
    /// False on refresh of an existing entry (join idempotence).
    pub came_online: bool,
    /// City the user was moved out of (one city at a time, last wins);
    /// broadcast `userOffline` there.
    pub left_city: Option<String>,
}

/// Result of dropping one connection's membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveEffect {
    /// Last connection in the city is gone; broadcast `userOffline`.
    pub went_offline: bool,
}

/// Presence registry seam: join/ping/leave plus membership queries.
pub trait PresenceStore: Send + Sync {
    /// Bind a live connection to a city. Idempotent per (user, connection,
    /// city): repeats from the same connection only refresh the entry.
    fn join(
        &self,
        user_id: Uuid,
        conn_id: &str,
        city: &str,
        coordinates: Option<Coordinates>,
        now: DateTime<Utc>,
    ) -> JoinEffect;

    /// Keepalive/location refresh without a live room membership (HTTP).
    fn ping(
        &self,
        user_id: Uuid,
        city: &str,
        coordinates: Option<Coordinates>,
        now: DateTime<Utc>,
    ) -> JoinEffect;

    /// Drop one connection's membership in the city.
    fn leave(&self, user_id: Uuid, conn_id: &str, city: &str) -> LeaveEffect;

    /// Visible entries in a city.
    fn members_of(&self, city: &str) -> Vec<PresenceEntry>;

    fn get(&self, user_id: Uuid) -> Option<PresenceEntry>;

    /// Hidden users keep their entry but vanish from membership queries.
    fn set_visibility(&self, user_id: Uuid, visible: bool);

    /// Remove entries not refreshed within `ttl` and no longer backed by a
    /// live connection. Returns what was removed so callers can broadcast
    /// the offline transitions.
    fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<PresenceEntry>;
}

struct Slot {
    entry: PresenceEntry,
    /// Connection ids currently backing this entry. Empty for ping-created
    /// entries, which rely on TTL expiry instead.
    conns: HashSet<String>,
}

impl Slot {
    fn sync_count(&mut self) {
        self.entry.connections = self.conns.len() as u32;
    }
}

#[derive(Default)]
struct Inner {
    by_user: HashMap<Uuid, Slot>,
    by_city: HashMap<String, HashSet<Uuid>>,
}

impl Inner {
    fn detach(&mut self, user_id: Uuid) -> Option<PresenceEntry> {
        let slot = self.by_user.remove(&user_id)?;
        if let Some(users) = self.by_city.get_mut(&slot.entry.city) {
            users.remove(&user_id);
            if users.is_empty() {
                self.by_city.remove(&slot.entry.city);
            }
        }
        Some(slot.entry)
    }
}

/// Single-process presence store.
#[derive(Default)]
pub struct InMemoryPresence {
    inner: Mutex<Inner>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(
        &self,
        user_id: Uuid,
        conn_id: Option<&str>,
        city: &str,
        coordinates: Option<Coordinates>,
        now: DateTime<Utc>,
    ) -> JoinEffect {
        let mut inner = self.inner.lock().expect("presence poisoned");

        if let Some(slot) = inner.by_user.get_mut(&user_id) {
            if slot.entry.city == city {
                // Repeated join refreshes only; exactly one online broadcast,
                // and a re-join from the same connection is not a new device.
                slot.entry.last_seen = now;
                if coordinates.is_some() {
                    slot.entry.coordinates = coordinates;
                }
                if let Some(conn) = conn_id {
                    slot.conns.insert(conn.to_string());
                }
                slot.sync_count();
                return JoinEffect { came_online: false, left_city: None };
            }
        }

        // New city, possibly moving away from a previous one.
        let left_city = inner.detach(user_id).map(|prev| prev.city);
        let conns: HashSet<String> = conn_id.map(String::from).into_iter().collect();
        inner.by_user.insert(
            user_id,
            Slot {
                entry: PresenceEntry {
                    user_id,
                    city: city.to_string(),
                    coordinates,
                    last_seen: now,
                    visible: true,
                    connections: conns.len() as u32,
                },
                conns,
            },
        );
        inner
            .by_city
            .entry(city.to_string())
            .or_default()
            .insert(user_id);
        JoinEffect { came_online: true, left_city }
    }
}

impl PresenceStore for InMemoryPresence {
    fn join(
        &self,
        user_id: Uuid,
        conn_id: &str,
        city: &str,
        coordinates: Option<Coordinates>,
        now: DateTime<Utc>,
    ) -> JoinEffect {
        self.upsert(user_id, Some(conn_id), city, coordinates, now)
    }

    fn ping(
        &self,
        user_id: Uuid,
        city: &str,
        coordinates: Option<Coordinates>,
        now: DateTime<Utc>,
    ) -> JoinEffect {
        self.upsert(user_id, None, city, coordinates, now)
    }

    fn leave(&self, user_id: Uuid, conn_id: &str, city: &str) -> LeaveEffect {
        let mut inner = self.inner.lock().expect("presence poisoned");
        let Some(slot) = inner.by_user.get_mut(&user_id) else {
            return LeaveEffect { went_offline: false };
        };
        if slot.entry.city != city {
            // Stale departure from a city the user already moved out of.
            return LeaveEffect { went_offline: false };
        }
        slot.conns.remove(conn_id);
        slot.sync_count();
        if !slot.conns.is_empty() {
            return LeaveEffect { went_offline: false };
        }
        inner.detach(user_id);
        LeaveEffect { went_offline: true }
    }

    fn members_of(&self, city: &str) -> Vec<PresenceEntry> {
        let inner = self.inner.lock().expect("presence poisoned");
        let Some(users) = inner.by_city.get(city) else {
            return Vec::new();
        };
        users
            .iter()
            .filter_map(|u| inner.by_user.get(u))
            .map(|s| &s.entry)
            .filter(|e| e.visible)
            .cloned()
            .collect()
    }

    fn get(&self, user_id: Uuid) -> Option<PresenceEntry> {
        let inner = self.inner.lock().expect("presence poisoned");
        inner.by_user.get(&user_id).map(|s| s.entry.clone())
    }

    fn set_visibility(&self, user_id: Uuid, visible: bool) {
        let mut inner = self.inner.lock().expect("presence poisoned");
        if let Some(slot) = inner.by_user.get_mut(&user_id) {
            slot.entry.visible = visible;
        }
    }

    fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<PresenceEntry> {
        let mut inner = self.inner.lock().expect("presence poisoned");
        let expired: Vec<Uuid> = inner
            .by_user
            .values()
            .filter(|s| {
                s.conns.is_empty() && now.signed_duration_since(s.entry.last_seen) > ttl
            })
            .map(|s| s.entry.user_id)
            .collect();
        expired
            .into_iter()
            .filter_map(|u| inner.detach(u))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_idempotent_per_user_city() {
        let store = InMemoryPresence::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let first = store.join(user, "conn-1", "lisbon", None, now);
        assert!(first.came_online);
        let second = store.join(user, "conn-2", "lisbon", None, now + Duration::seconds(5));
        assert!(!second.came_online);

        assert_eq!(store.members_of("lisbon").len(), 1);
        let entry = store.get(user).unwrap();
        assert_eq!(entry.connections, 2);
        assert_eq!(entry.last_seen, now + Duration::seconds(5));
    }

    #[test]
    fn rejoin_from_same_connection_counts_once() {
        let store = InMemoryPresence::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        store.join(user, "conn-1", "lisbon", None, now);
        store.join(user, "conn-1", "lisbon", None, now + Duration::seconds(1));
        store.join(user, "conn-1", "lisbon", None, now + Duration::seconds(2));
        assert_eq!(store.get(user).unwrap().connections, 1);

        // One departure from that connection fully clears the entry.
        assert!(store.leave(user, "conn-1", "lisbon").went_offline);
        assert!(store.get(user).is_none());
    }

    #[test]
    fn last_city_wins() {
        let store = InMemoryPresence::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        store.join(user, "conn-1", "lisbon", None, now);
        let effect = store.join(user, "conn-1", "porto", None, now);
        assert!(effect.came_online);
        assert_eq!(effect.left_city.as_deref(), Some("lisbon"));
        assert!(store.members_of("lisbon").is_empty());
        assert_eq!(store.members_of("porto").len(), 1);
    }

    #[test]
    fn offline_only_when_last_connection_leaves() {
        let store = InMemoryPresence::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        store.join(user, "tab-1", "lisbon", None, now);
        store.join(user, "tab-2", "lisbon", None, now);
        assert!(!store.leave(user, "tab-1", "lisbon").went_offline);
        assert!(store.leave(user, "tab-2", "lisbon").went_offline);
        assert!(store.get(user).is_none());
        // Idempotent once gone.
        assert!(!store.leave(user, "tab-2", "lisbon").went_offline);
    }

    #[test]
    fn ping_creates_and_refreshes_without_connection() {
        let store = InMemoryPresence::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let coords = Coordinates { lat: 38.7, lng: -9.1 };

        assert!(store.ping(user, "lisbon", Some(coords), now).came_online);
        assert!(!store.ping(user, "lisbon", None, now + Duration::minutes(1)).came_online);

        let entry = store.get(user).unwrap();
        assert_eq!(entry.connections, 0);
        // Coordinates survive a ping without them.
        assert_eq!(entry.coordinates, Some(coords));
    }

    #[test]
    fn hidden_users_are_excluded_from_members() {
        let store = InMemoryPresence::new();
        let user = Uuid::new_v4();
        store.join(user, "conn-1", "lisbon", None, Utc::now());
        store.set_visibility(user, false);
        assert!(store.members_of("lisbon").is_empty());
        assert!(store.get(user).is_some());
    }

    #[test]
    fn sweep_expires_stale_ping_entries_only() {
        let store = InMemoryPresence::new();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let connected = Uuid::new_v4();
        let now = Utc::now();

        store.ping(stale, "lisbon", None, now - Duration::hours(2));
        store.ping(fresh, "lisbon", None, now);
        store.join(connected, "conn-1", "lisbon", None, now - Duration::hours(2));

        let removed = store.sweep(now, Duration::hours(1));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].user_id, stale);
        assert_eq!(store.members_of("lisbon").len(), 2);
    }
}
