//! Auth middleware: JWT extractor for the collaborator HTTP surface.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::http::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Extractor: authenticated user ID from JWT (Bearer token).
#[derive(Clone, Copy, Debug)]
pub struct AuthUser(pub Uuid);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix(BEARER_PREFIX));
        let token = auth
            .ok_or_else(|| AppError::Auth("Missing or invalid Authorization header".to_string()))?;
        let user_id = state.jwt.validate(token)?;
        Ok(AuthUser(user_id))
    }
}
