use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use super::jwt;
use crate::api::AppState;
use crate::error::ServerError;

/// Authenticated user extracted from the `Authorization: Bearer <token>`
/// header. Add this as a handler parameter to require authentication.
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServerError::Unauthorized("missing Authorization header".to_string())
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ServerError::Unauthorized(
                "invalid Authorization format, expected: Bearer <token>".to_string(),
            )
        })?;

        let claims = jwt::verify_token(token, &state.config.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.email,
        })
    }
}
