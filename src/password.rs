//! Salted argon2 password hashing.
//!
//! Hashing is deliberately slow, so both operations run on the blocking pool
//! instead of the request-handling threads.

use std::sync::OnceLock;

use actix_web::web;
use argon2::{self, Config as ArgonConfig};
use rand::Rng;

use crate::error::AppError;

pub async fn hash_password(raw: String) -> Result<String, AppError> {
    web::block(move || {
        let salt: [u8; 16] = rand::thread_rng().gen();
        let config = ArgonConfig::default();
        argon2::hash_encoded(raw.as_bytes(), &salt, &config)
    })
    .await
    .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
    .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Returns `false` both on mismatch and on an unparseable stored hash.
pub async fn verify_password(hash: String, raw: String) -> Result<bool, AppError> {
    web::block(move || argon2::verify_encoded(&hash, raw.as_bytes()).unwrap_or(false))
        .await
        .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))
}

static DECOY_HASH: OnceLock<String> = OnceLock::new();

/// Hash of a random secret nobody knows, for login attempts on unknown emails.
fn decoy_hash() -> &'static str {
    DECOY_HASH.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let secret: [u8; 32] = rng.gen();
        let salt: [u8; 16] = rng.gen();
        argon2::hash_encoded(&secret, &salt, &ArgonConfig::default()).unwrap_or_else(|e| {
            log::error!("decoy password hash failed: {e}");
            String::new()
        })
    })
}

/// Spends the same argon2 work as [`verify_password`] without an account, so
/// an unknown email takes as long to reject as a wrong password.
pub async fn verify_decoy(raw: String) -> Result<(), AppError> {
    web::block(move || {
        let _ = argon2::verify_encoded(decoy_hash(), raw.as_bytes());
    })
    .await
    .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_verifies_against_plaintext() {
        let hash = hash_password("s3cret".to_string()).await.expect("hash");

        assert_ne!(hash, "s3cret");
        assert!(verify_password(hash, "s3cret".to_string()).await.expect("verify"));
    }

    #[tokio::test]
    async fn wrong_password_does_not_verify() {
        let hash = hash_password("s3cret".to_string()).await.expect("hash");

        assert!(!verify_password(hash, "guess".to_string()).await.expect("verify"));
    }

    #[tokio::test]
    async fn same_password_gets_different_salts() {
        let a = hash_password("s3cret".to_string()).await.expect("hash");
        let b = hash_password("s3cret".to_string()).await.expect("hash");

        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn decoy_hash_is_a_real_argon2_hash() {
        let hash = decoy_hash().to_string();

        assert!(hash.starts_with("$argon2"), "got {hash}");
        assert!(!verify_password(hash, String::new()).await.expect("verify"));
        verify_decoy("guess".to_string()).await.expect("decoy");
    }
}
