use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// JWT payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Create a signed HS256 token for a user. Returns the token and its expiry.
pub fn sign_token(
    user_id: i64,
    email: &str,
    secret: &str,
    expiry_hours: i64,
) -> Result<(String, DateTime<Utc>)> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(expiry_hours);

    let claims = Claims {
        user_id,
        email: email.to_string(),
        sub: user_id.to_string(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServerError::Internal(format!("token signing failed: {e}")))?;

    Ok((token, expires_at))
}

/// Validate a token's signature and expiry, returning the claims.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ServerError::Unauthorized(format!("invalid token: {e}")))?;

    Ok(data.claims)
}
