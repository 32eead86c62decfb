//! Collaborator HTTP surface: nearby, ping, chat history, inbox, mark-read.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::auth::JwtSecret;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{
    haversine_km, normalize_city, ActivityStatus, Coordinates, Message,
};
use crate::registry::{city_room, RoomRegistry};
use crate::services::{ChatService, PresenceStore};
use crate::store::{MessageStore, NotificationStore, UserDirectory};

/// Shared application state for HTTP and WS handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: RoomRegistry,
    pub presence: Arc<dyn PresenceStore>,
    pub messages: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub users: Arc<dyn UserDirectory>,
    pub chat: ChatService,
    pub jwt: JwtSecret,
}

impl AppState {
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        messages: Arc<dyn MessageStore>,
        notifications: Arc<dyn NotificationStore>,
        users: Arc<dyn UserDirectory>,
        jwt: JwtSecret,
    ) -> Self {
        let registry = RoomRegistry::new();
        let chat = ChatService::new(
            messages.clone(),
            notifications.clone(),
            users.clone(),
            registry.clone(),
        );
        Self {
            registry,
            presence,
            messages,
            notifications,
            users,
            chat,
            jwt,
        }
    }
}

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_HISTORY_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub city: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyUser {
    pub user_id: Uuid,
    pub username: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub status: ActivityStatus,
    pub last_seen: DateTime<Utc>,
}

/// GET /whois/nearby?city&page&limit&lat&lon
///
/// Filtering contract: never the caller themself, never hidden users, never
/// blocked-either-way or deleted users. Distance is attached when both sides
/// have coordinates.
pub async fn nearby(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyUser>>, AppError> {
    let city = normalize_city(&query.city);
    if city.is_empty() {
        return Err(AppError::Validation("city must not be empty".to_string()));
    }
    let caller_coords = match (query.lat, query.lon) {
        (Some(lat), Some(lng)) => Some(Coordinates { lat, lng }),
        _ => None,
    };
    let now = Utc::now();

    let mut results = Vec::new();
    for entry in state.presence.members_of(&city) {
        if entry.user_id == caller {
            continue;
        }
        let Some(profile) = state.users.profile(entry.user_id).await? else {
            continue;
        };
        if profile.deleted || state.users.is_blocked(caller, entry.user_id).await? {
            continue;
        }
        let distance_km = match (caller_coords, entry.coordinates) {
            (Some(a), Some(b)) => Some(haversine_km(a, b)),
            _ => None,
        };
        results.push(NearbyUser {
            user_id: entry.user_id,
            username: profile.username,
            city: entry.city,
            distance_km,
            status: ActivityStatus::from_last_seen(entry.last_seen, now),
            last_seen: entry.last_seen,
        });
    }

    // Nearest first; unknown distances trail, most recently seen first.
    results.sort_by(|a, b| match (a.distance_km, b.distance_km) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.last_seen.cmp(&a.last_seen),
    });

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;
    let page = query.page.unwrap_or(1).max(1) as usize;
    let paged: Vec<NearbyUser> = results
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();
    Ok(Json(paged))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PingRequest {
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// POST /whois/ping — keepalive / location refresh without a socket room.
pub async fn ping(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<PingRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let city = normalize_city(&body.city);

    let effect = state.presence.ping(caller, &city, body.coordinates, Utc::now());
    if let Some(previous) = effect.left_city {
        state.registry.broadcast(
            &city_room(&previous),
            &crate::models::ServerEvent::UserOffline { user_id: caller },
        );
    }
    if effect.came_online {
        state.registry.broadcast(
            &city_room(&city),
            &crate::models::ServerEvent::UserOnline { user_id: caller },
        );
    }
    Ok(Json(json!({ "ok": true, "city": city })))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    #[serde(rename = "fromUserId")]
    pub from_user_id: Option<Uuid>,
    #[serde(default)]
    pub all: bool,
}

/// PUT /notifications/mark-read — clear unread counters; idempotent.
pub async fn mark_notifications_read(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    match (body.all, body.from_user_id) {
        (true, _) => state.notifications.mark_all_read(caller).await?,
        (false, Some(from)) => state.notifications.mark_read_from(caller, from).await?,
        (false, None) => {
            return Err(AppError::Validation(
                "fromUserId or all=true required".to_string(),
            ))
        }
    }
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub messages: Vec<Message>,
    pub other_user: PeerInfo,
}

/// GET /whois/chat/:user_id?limit — conversation history with one user.
pub async fn chat_history(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(other): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let profile = state
        .users
        .profile(other)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", other)))?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);
    let messages = state.messages.conversation(caller, other, limit).await?;
    Ok(Json(HistoryResponse {
        messages,
        other_user: PeerInfo {
            user_id: profile.id,
            username: profile.username,
        },
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub other_user: PeerInfo,
    pub last_message: Message,
    pub unread_count: u32,
}

/// GET /whois/chat/inbox — latest message per thread plus unread counts.
pub async fn inbox(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let latest = state.messages.inbox(caller).await?;
    let unread = state.notifications.list(caller).await?;

    let mut out = Vec::with_capacity(latest.len());
    for msg in latest {
        let other = if msg.sender_id == caller {
            msg.recipient_id
        } else {
            msg.sender_id
        };
        let username = state
            .users
            .profile(other)
            .await?
            .map(|p| p.username)
            .unwrap_or_else(|| "unknown".to_string());
        let unread_count = unread
            .iter()
            .find(|n| n.from_user_id == other)
            .map(|n| n.unread_count)
            .unwrap_or(0);
        out.push(ConversationSummary {
            conversation_id: msg.conversation_id.clone(),
            other_user: PeerInfo { user_id: other, username },
            last_message: msg,
            unread_count,
        });
    }
    Ok(Json(out))
}

/// GET /health — liveness probe.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "wakapadi-rt" })),
    )
}

/// Convenience used by main's presence sweeper: broadcast offline
/// transitions for entries the TTL sweep removed.
pub fn broadcast_expirations(state: &AppState, expired: Vec<crate::models::PresenceEntry>) {
    for entry in expired {
        state.registry.broadcast(
            &city_room(&entry.city),
            &crate::models::ServerEvent::UserOffline { user_id: entry.user_id },
        );
    }
}
