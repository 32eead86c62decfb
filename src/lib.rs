//! Realtime presence and chat delivery service for Wakapadi.
//!
//! Tracks which travelers are online in which city, delivers direct
//! messages with typing/read/reaction events over WebSocket rooms, and
//! fans out unread-thread notifications across a recipient's open tabs.
//! CRUD, persistence schema, and UI live in external collaborators.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod registry;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::AppError;
pub use handlers::http::AppState;
pub use registry::RoomRegistry;
pub use services::{ChatService, PresenceStore};

use axum::routing::{get, post, put};
use handlers::http;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router (ws, whois, chat, notifications, auth, health).
/// Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    let whois_routes = axum::Router::new()
        .route("/nearby", get(http::nearby))
        .route("/ping", post(http::ping))
        .route("/chat/inbox", get(http::inbox))
        .route("/chat/:user_id", get(http::chat_history));

    axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(http::health))
        .route("/auth/anonymous", post(auth::anonymous))
        .route("/notifications/mark-read", put(http::mark_notifications_read))
        .nest("/whois", whois_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
