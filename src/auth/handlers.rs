//! Auth HTTP handlers: anonymous session issuance.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::handlers::http::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct AnonymousRequest {
    /// Stable per-device identifier; the same device gets the same user id.
    #[serde(rename = "deviceId")]
    #[validate(length(min = 8, max = 128))]
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct AnonymousResponse {
    pub token: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
}

/// POST /auth/anonymous
///
/// No registration flow exists: an opaque device id maps to a (possibly new)
/// anonymous user, and the response carries the bearer token used on the
/// WS handshake and HTTP calls.
pub async fn anonymous(
    State(state): State<AppState>,
    Json(body): Json<AnonymousRequest>,
) -> Result<Json<AnonymousResponse>, AppError> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let profile = state.users.user_for_device(&body.device_id).await?;
    let token = state.jwt.issue(profile.id)?;

    Ok(Json(AnonymousResponse {
        token,
        user_id: profile.id.to_string(),
        username: profile.username,
    }))
}
