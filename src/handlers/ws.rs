//! WebSocket gateway: handshake auth, event dispatch, room lifecycle.
//!
//! One socket per client tab/device. Identity rides on the handshake
//! (`?token=` or Authorization header); there is no login event. A
//! connection with a bad token still completes the transport handshake but
//! every room-scoped event is refused silently — the absent effects are the
//! only observable signal, matching the web client's degraded mode.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::handlers::http::AppState;
use crate::models::{generate_socket_id, normalize_city, ClientEvent, ServerEvent};
use crate::registry::{city_room, conversation_room, notification_room};

const BEARER_PREFIX: &str = "Bearer ";

/// Connection context threaded through event dispatch.
pub(crate) struct ConnCtx {
    pub id: String,
    pub user_id: Option<Uuid>,
}

/// GET /ws?token=JWT — upgrade to WebSocket.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.get("token").cloned().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix(BEARER_PREFIX))
            .map(String::from)
    });

    let user_id = match token {
        Some(token) => match state.jwt.validate(&token) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "ws handshake with invalid token, degrading to anonymous");
                None
            }
        },
        None => None,
    };

    ws.on_upgrade(move |socket| handle_socket(state, socket, user_id))
}

async fn handle_socket(state: AppState, socket: WebSocket, user_id: Option<Uuid>) {
    let socket_id = generate_socket_id();
    info!(socket_id = %socket_id, authenticated = user_id.is_some(), "ws connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    state.registry.register(&socket_id, tx);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let conn = ConnCtx {
        id: socket_id.clone(),
        user_id,
    };

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => dispatch_event(&state, &conn, event).await,
                Err(e) => {
                    debug!(socket_id = %conn.id, error = %e, "malformed client event");
                    state.registry.send_to_conn(
                        &conn.id,
                        &ServerEvent::Error {
                            message: format!("malformed event: {}", e),
                        },
                    );
                }
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(&state, &socket_id, user_id);
    send_task.abort();
    info!(socket_id = %socket_id, "ws disconnected");
}

/// Route one inbound event. Failures stay scoped to this connection; nothing
/// here may take the process down.
pub(crate) async fn dispatch_event(state: &AppState, conn: &ConnCtx, event: ClientEvent) {
    let Some(user) = conn.user_id else {
        // Unauthenticated sockets may stay open but get no room operations.
        debug!(socket_id = %conn.id, "room-scoped event from unauthenticated socket dropped");
        return;
    };

    match event {
        ClientEvent::JoinNotifications { user_id } => {
            if user_id != user {
                scoped_error(state, conn, "userId does not match connection identity");
                return;
            }
            state.registry.join(&conn.id, &notification_room(user));
        }

        ClientEvent::WhoisJoin { city, coordinates } => {
            let city = normalize_city(&city);
            if city.is_empty() {
                scoped_error(state, conn, "city must not be empty");
                return;
            }
            let room = city_room(&city);
            state.registry.join(&conn.id, &room);

            let effect = state
                .presence
                .join(user, &conn.id, &city, coordinates, chrono::Utc::now());
            if let Some(previous) = effect.left_city {
                let old_room = city_room(&previous);
                state.registry.leave(&conn.id, &old_room);
                state
                    .registry
                    .broadcast(&old_room, &ServerEvent::UserOffline { user_id: user });
            }
            if effect.came_online {
                state
                    .registry
                    .broadcast_except(&room, &conn.id, &ServerEvent::UserOnline { user_id: user });
            }
        }

        ClientEvent::WhoisLeave {} => {
            leave_presence(state, &conn.id, user);
        }

        ClientEvent::JoinConversation { user_id1, user_id2 } => {
            if user != user_id1 && user != user_id2 {
                scoped_error(state, conn, "not a participant of this conversation");
                return;
            }
            let conv = crate::models::conversation_id(user_id1, user_id2);
            state.registry.join(&conn.id, &conversation_room(&conv));
        }

        ClientEvent::Message { to, message, temp_id } => {
            if let Err(e) = state.chat.send(user, to, &message, temp_id.clone()).await {
                warn!(socket_id = %conn.id, error = %e, "message send failed");
                state.registry.send_to_conn(
                    &conn.id,
                    &ServerEvent::MessageError {
                        temp_id,
                        error: e.to_string(),
                    },
                );
            }
        }

        ClientEvent::MessageRead { from_user_id, to_user_id, message_ids } => {
            if user != to_user_id {
                scoped_error(state, conn, "only the recipient may mark messages read");
                return;
            }
            if let Err(e) = state.chat.mark_read(from_user_id, to_user_id, message_ids).await {
                scoped_error(state, conn, &e.to_string());
            }
        }

        ClientEvent::MessageReaction { message_id, reaction, to_user_id: _ } => {
            let emoji = reaction.emoji.clone();
            let from_user_id = reaction.from_user_id;
            if let Err(e) = state.chat.react(user, message_id, reaction).await {
                debug!(socket_id = %conn.id, error = %e, "reaction rejected");
                state.registry.send_to_conn(
                    &conn.id,
                    &ServerEvent::MessageReactionError {
                        message_id,
                        emoji,
                        from_user_id,
                    },
                );
            }
        }

        ClientEvent::MessageDelete { message_id } => {
            if let Err(e) = state.chat.delete(user, message_id).await {
                scoped_error(state, conn, &e.to_string());
            }
        }

        ClientEvent::Typing { to } => {
            let conv = crate::models::conversation_id(user, to);
            state.registry.broadcast_except(
                &conversation_room(&conv),
                &conn.id,
                &ServerEvent::Typing { from: user },
            );
        }

        ClientEvent::StoppedTyping { to } => {
            let conv = crate::models::conversation_id(user, to);
            state.registry.broadcast_except(
                &conversation_room(&conv),
                &conn.id,
                &ServerEvent::StoppedTyping { from: user },
            );
        }
    }
}

/// Explicit `whois:leave` for the user's current city.
fn leave_presence(state: &AppState, conn_id: &str, user: Uuid) {
    let Some(entry) = state.presence.get(user) else {
        return;
    };
    let room = city_room(&entry.city);
    state.registry.leave(conn_id, &room);
    let effect = state.presence.leave(user, conn_id, &entry.city);
    if effect.went_offline {
        state
            .registry
            .broadcast(&room, &ServerEvent::UserOffline { user_id: user });
    }
}

/// Connection teardown: drop room memberships and run presence departure
/// effects for any city room the socket was in.
pub(crate) fn handle_disconnect(state: &AppState, socket_id: &str, user_id: Option<Uuid>) {
    let rooms = state.registry.unregister(socket_id);
    let Some(user) = user_id else {
        return;
    };
    for room in rooms {
        let Some(city) = room.strip_prefix("city:") else {
            continue;
        };
        let effect = state.presence.leave(user, socket_id, city);
        if effect.went_offline {
            state
                .registry
                .broadcast(&room, &ServerEvent::UserOffline { user_id: user });
        }
    }
}

fn scoped_error(state: &AppState, conn: &ConnCtx, message: &str) {
    state.registry.send_to_conn(
        &conn.id,
        &ServerEvent::Error {
            message: message.to_string(),
        },
    );
}
