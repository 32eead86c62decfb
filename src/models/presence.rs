//! Presence entries: who is visible in which city.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Geographic coordinates attached to a presence entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// One user's visibility in one city. At most one entry per (user, city),
/// and a user holds presence in at most one city at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: Uuid,
    /// Normalized lowercase city key.
    pub city: String,
    pub coordinates: Option<Coordinates>,
    pub last_seen: DateTime<Utc>,
    /// Hidden users stay connected but are excluded from nearby results.
    pub visible: bool,
    /// Live socket joins for this entry. Ping-created entries may hold zero
    /// and rely on TTL expiry.
    #[serde(skip)]
    pub connections: u32,
}

/// UI activity status derived from last-seen recency. Thresholds are fixed
/// for behavioral parity with the web client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Active,
    Idle,
    Offline,
}

impl ActivityStatus {
    /// <5 min = active, <30 min = idle, else offline.
    pub fn from_last_seen(last_seen: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now.signed_duration_since(last_seen);
        if age < Duration::minutes(5) {
            ActivityStatus::Active
        } else if age < Duration::minutes(30) {
            ActivityStatus::Idle
        } else {
            ActivityStatus::Offline
        }
    }
}

/// Great-circle distance in kilometers between two coordinates (haversine).
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Normalize a user-supplied city name into a registry key.
pub fn normalize_city(city: &str) -> String {
    city.trim().to_lowercase()
}

/// Generate a unique socket/connection id.
pub fn generate_socket_id() -> String {
    format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_thresholds() {
        let now = Utc::now();
        assert_eq!(
            ActivityStatus::from_last_seen(now - Duration::minutes(1), now),
            ActivityStatus::Active
        );
        assert_eq!(
            ActivityStatus::from_last_seen(now - Duration::minutes(10), now),
            ActivityStatus::Idle
        );
        assert_eq!(
            ActivityStatus::from_last_seen(now - Duration::minutes(45), now),
            ActivityStatus::Offline
        );
    }

    #[test]
    fn haversine_lisbon_porto() {
        let lisbon = Coordinates { lat: 38.7223, lng: -9.1393 };
        let porto = Coordinates { lat: 41.1579, lng: -8.6291 };
        let d = haversine_km(lisbon, porto);
        assert!((d - 274.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = Coordinates { lat: 52.52, lng: 13.405 };
        assert!(haversine_km(p, p) < 1e-9);
    }

    #[test]
    fn normalize_city_lowercases_and_trims() {
        assert_eq!(normalize_city("  Lisbon "), "lisbon");
        assert_eq!(normalize_city("SÃO PAULO"), "são paulo");
    }
}
