use std::env;
use std::fmt::Display;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

use crate::token::DEFAULT_TOKEN_TTL_DAYS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_name: String,
    pub bind_addr: String,
    pub token_ttl: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_name", &self.database_name)
            .field("bind_addr", &self.bind_addr)
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads configuration from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if database_url.is_none() {
            log::warn!("DATABASE_URL not set, falling back to the in-memory store");
        }

        let ttl_days: i64 = parse_or(&lookup, "TOKEN_TTL_DAYS", DEFAULT_TOKEN_TTL_DAYS)?;
        if ttl_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "TOKEN_TTL_DAYS",
                message: "must be positive".to_string(),
            });
        }

        Ok(Config {
            jwt_secret,
            database_url,
            database_name: parse_or(&lookup, "DATABASE_NAME", "vendor_catalog".to_string())?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", "127.0.0.1:8080".to_string())?,
            token_ttl: Duration::days(ttl_days),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => {
            log::info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
