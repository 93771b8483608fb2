//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs carrying the vendor id (`sub`) and a random token id
//! (`jti`). The signature and expiry are checked here; whether the token id is
//! still active is the identity store's concern.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use thiserror::Error;

use crate::models::Claims;

pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed or its signature does not match")]
    Malformed,

    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        TokenIssuer {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, vendor_id: &str) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        self.issue_at(vendor_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        vendor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        let expires_at = now + self.ttl;
        let token_id = generate_token_id();

        let claims = Claims {
            sub: vendor_id.to_string(),
            jti: token_id.clone(),
            iat: to_epoch(now),
            exp: to_epoch(expires_at),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;

        Ok(IssuedToken {
            token,
            token_id,
            expires_at,
        })
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })
    }
}

fn generate_token_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn to_epoch(at: DateTime<Utc>) -> usize {
    usize::try_from(at.timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("test-secret", Duration::days(DEFAULT_TOKEN_TTL_DAYS))
    }

    #[test]
    fn issued_token_decodes_to_same_subject() {
        let issuer = issuer();
        let issued = issuer.issue("vendor-1").expect("token should encode");
        let claims = issuer.decode(&issued.token).expect("token should decode");

        assert_eq!(claims.sub, "vendor-1");
        assert_eq!(claims.jti, issued.token_id);
    }

    #[test]
    fn expiry_is_thirty_days_out() {
        let now = Utc::now();
        let issued = issuer().issue_at("vendor-1", now).expect("token should encode");

        assert_eq!(issued.expires_at - now, Duration::days(30));
    }

    #[test]
    fn each_token_gets_a_fresh_id() {
        let issuer = issuer();
        let a = issuer.issue("vendor-1").expect("token should encode");
        let b = issuer.issue("vendor-1").expect("token should encode");

        assert_ne!(a.token_id, b.token_id);
    }

    #[test]
    fn expired_token_is_rejected_as_expired() {
        let issuer = issuer();
        let issued = issuer
            .issue_at("vendor-1", Utc::now() - Duration::days(31))
            .expect("token should encode");

        assert_eq!(issuer.decode(&issued.token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn foreign_signature_is_malformed() {
        let other = TokenIssuer::new("another-secret", Duration::days(30));
        let issued = other.issue("vendor-1").expect("token should encode");

        assert_eq!(issuer().decode(&issued.token).unwrap_err(), TokenError::Malformed);
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(issuer().decode("not-a-jwt").unwrap_err(), TokenError::Malformed);
    }
}
