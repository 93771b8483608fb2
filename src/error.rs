use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;
use crate::token::TokenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Vendor,
    Product,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Vendor => f.write_str("vendor"),
            Resource::Product => f.write_str("product"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("email already registered")]
    DuplicateEmail,

    #[error("{0} not found")]
    NotFound(Resource),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authorization token missing")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("token has been revoked")]
    RevokedToken,

    #[error("not authorized to modify this {0}")]
    Forbidden(Resource),

    #[error("storage error")]
    Storage(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// Message sent to clients. Unknown accounts and wrong passwords share one
    /// message, and storage details never leave the process.
    fn public_message(&self) -> String {
        match self {
            AppError::NotFound(Resource::Vendor) | AppError::InvalidCredentials => {
                "Invalid credentials".to_string()
            }
            AppError::Storage(_) | AppError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEmail => StatusCode::CONFLICT,
            AppError::NotFound(Resource::Product) => StatusCode::NOT_FOUND,
            AppError::NotFound(Resource::Vendor)
            | AppError::InvalidCredentials
            | AppError::MissingToken
            | AppError::InvalidToken(_)
            | AppError::RevokedToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Storage(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Storage(source) => log::error!("storage failure: {source:?}"),
            AppError::Internal(message) => log::error!("internal failure: {message}"),
            AppError::NotFound(Resource::Vendor) => log::info!("login rejected: unknown email"),
            AppError::InvalidCredentials => log::info!("login rejected: password mismatch"),
            other => log::debug!("request rejected: {other}"),
        }

        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.public_message(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_and_wrong_password_look_the_same() {
        let unknown = AppError::NotFound(Resource::Vendor);
        let wrong = AppError::InvalidCredentials;

        assert_eq!(unknown.status_code(), wrong.status_code());
        assert_eq!(unknown.public_message(), wrong.public_message());
    }

    #[test]
    fn missing_product_is_not_found() {
        assert_eq!(
            AppError::NotFound(Resource::Product).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn storage_errors_are_generic_to_clients() {
        let err = AppError::Storage(StoreError::Sequence("product".to_string()));

        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal Server Error");
    }

    #[test]
    fn forbidden_is_distinct_from_unauthenticated() {
        assert_eq!(
            AppError::Forbidden(Resource::Product).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::RevokedToken.status_code(), StatusCode::UNAUTHORIZED);
    }
}
