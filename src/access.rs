//! Authorization decision for a single inbound catalog request.
//!
//! ```text
//! Unauthenticated -> TokenPresented -> Verified -> Authorized
//!        \                 \              \
//!         +-----------------+--------------+--> Rejected(reason)
//! ```
//!
//! Steps up to `Verified` run in [`crate::middleware::AuthMiddleware`] for
//! every protected route. The `Verified -> Authorized` step needs the target
//! resource, so the catalog runs it through [`authorize`] once the record is
//! loaded.

use actix_web::dev::Payload;
use actix_web::http::header::HeaderValue;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, Ready};

use crate::error::{AppError, Resource};
use crate::identity::IdentityStore;
use crate::token::TokenError;

const BEARER: &str = "Bearer ";

/// Identity resolved from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub vendor_id: String,
    /// Id of the token this request was made with; logout revokes exactly this one.
    pub token_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingToken,
    MalformedToken,
    ExpiredToken,
    RevokedToken,
    NotOwner,
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::MissingToken => AppError::MissingToken,
            Rejection::MalformedToken => AppError::InvalidToken(TokenError::Malformed),
            Rejection::ExpiredToken => AppError::InvalidToken(TokenError::Expired),
            Rejection::RevokedToken => AppError::RevokedToken,
            Rejection::NotOwner => AppError::Forbidden(Resource::Product),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessState {
    Unauthenticated,
    TokenPresented(String),
    Verified(Caller),
    Authorized(Caller),
    Rejected(Rejection),
}

impl AccessState {
    /// `Unauthenticated -> TokenPresented`, reading an `Authorization: Bearer` header.
    pub fn present(self, header: Option<&HeaderValue>) -> Self {
        if self != AccessState::Unauthenticated {
            return self;
        }

        let Some(header) = header else {
            return AccessState::Rejected(Rejection::MissingToken);
        };

        match header.to_str().ok().and_then(|value| value.strip_prefix(BEARER)) {
            Some(token) if !token.trim().is_empty() => {
                AccessState::TokenPresented(token.trim().to_string())
            }
            Some(_) => AccessState::Rejected(Rejection::MissingToken),
            None => AccessState::Rejected(Rejection::MalformedToken),
        }
    }

    /// `TokenPresented -> Verified`. Verification failures become `Rejected`;
    /// anything else (a storage outage) is returned as an error.
    pub async fn verify(self, identity: &IdentityStore) -> Result<Self, AppError> {
        let token = match self {
            AccessState::TokenPresented(token) => token,
            other => return Ok(other),
        };

        match identity.verify_token(&token).await {
            Ok(caller) => Ok(AccessState::Verified(caller)),
            Err(AppError::InvalidToken(TokenError::Expired)) => {
                Ok(AccessState::Rejected(Rejection::ExpiredToken))
            }
            Err(AppError::InvalidToken(TokenError::Malformed)) => {
                Ok(AccessState::Rejected(Rejection::MalformedToken))
            }
            Err(AppError::RevokedToken) => Ok(AccessState::Rejected(Rejection::RevokedToken)),
            Err(e) => Err(e),
        }
    }

    /// `Verified -> Authorized` when `owner_id` is the verified caller.
    pub fn authorize(self, owner_id: &str) -> Self {
        match self {
            AccessState::Verified(caller) if caller.vendor_id == owner_id => {
                AccessState::Authorized(caller)
            }
            AccessState::Verified(_) => AccessState::Rejected(Rejection::NotOwner),
            other => other,
        }
    }

    /// Terminal result: the caller for `Verified`/`Authorized`, the mapped
    /// rejection otherwise.
    pub fn into_caller(self) -> Result<Caller, AppError> {
        match self {
            AccessState::Verified(caller) | AccessState::Authorized(caller) => Ok(caller),
            AccessState::Rejected(rejection) => Err(rejection.into()),
            AccessState::Unauthenticated | AccessState::TokenPresented(_) => {
                Err(AppError::MissingToken)
            }
        }
    }
}

/// Ownership check for an already verified caller.
pub fn authorize(caller: &Caller, owner_id: &str) -> Result<(), AppError> {
    AccessState::Verified(caller.clone())
        .authorize(owner_id)
        .into_caller()
        .map(|_| ())
}

/// Handlers behind [`crate::middleware::AuthMiddleware`] take the verified caller
/// as an argument; outside it the extractor fails with `MissingToken`.
impl FromRequest for Caller {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Caller>()
                .cloned()
                .ok_or(AppError::MissingToken),
        )
    }
}
