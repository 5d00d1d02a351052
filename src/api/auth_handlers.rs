//! Registration, login, and profile endpoints.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use super::{ts_rfc3339, AppJson, AppState};
use crate::auth::{self, AuthUser};
use crate::error::{Result, ServerError};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub email: String,
    pub created_at: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ServerError::BadRequest(
            "email and password are required".to_string(),
        ));
    }
    if !valid_email(&req.email) {
        return Err(ServerError::BadRequest("invalid email format".to_string()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ServerError::BadRequest(
            "password must be at least 8 characters".to_string(),
        ));
    }

    // bcrypt is deliberately slow; keep it off the async runtime.
    let password = req.password;
    let hashed = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| ServerError::Internal(format!("hashing task failed: {e}")))??;

    let user = state.users.create(&req.email, &hashed).await?;
    tracing::info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user_id: user.id,
            email: user.email,
            created_at: ts_rfc3339(user.created_at),
        }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ServerError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    let invalid = || ServerError::Unauthorized("invalid email or password".to_string());

    let user = state.users.by_email(&req.email).await?.ok_or_else(invalid)?;

    let password = req.password;
    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
        .await
        .map_err(|e| ServerError::Internal(format!("verification task failed: {e}")))?;
    if !verified {
        return Err(invalid());
    }

    let (token, expires_at) = auth::sign_token(
        user.id,
        &user.email,
        &state.config.jwt_secret,
        state.config.jwt_expiry_hours,
    )?;

    tracing::info!(user_id = user.id, "user logged in");
    Ok(Json(TokenResponse {
        token,
        expires_at: expires_at.to_rfc3339(),
    }))
}

pub async fn me(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserResponse>> {
    let user = state
        .users
        .by_id(auth_user.user_id)
        .await?
        .ok_or_else(|| ServerError::Unauthorized("user not found".to_string()))?;

    Ok(Json(UserResponse {
        user_id: user.id,
        email: user.email,
        created_at: ts_rfc3339(user.created_at),
    }))
}

/// Minimal email syntax check: one `@`, a non-empty local part, and a domain
/// with an alphabetic TLD of at least two characters.
fn valid_email(email: &str) -> bool {
    if email.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.starts_with('.') || domain.ends_with('.') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("user@example.com"));
        assert!(valid_email("first.last+tag@sub.example.org"));

        assert!(!valid_email("plainaddress"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("user@"));
        assert!(!valid_email("user@example"));
        assert!(!valid_email("user@.com"));
        assert!(!valid_email("user@example."));
        assert!(!valid_email("user name@example.com"));
        assert!(!valid_email("user@example.c0m"));
    }
}
