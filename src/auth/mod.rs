//! Authentication: password hashing, JWT issuance, bearer extraction.

mod extract;
mod jwt;

pub use extract::AuthUser;
pub use jwt::{sign_token, verify_token, Claims};

use crate::error::{Result, ServerError};

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password against its stored hash. Hash-format errors count as a
/// failed verification rather than an internal error.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong password", &hash));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
