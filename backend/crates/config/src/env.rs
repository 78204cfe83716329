use opsdash_common::error::{OpsError, OpsResult};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> OpsResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: get_var("DATABASE_URL")?,
            max_connections: parse_var_or("DATABASE_MAX_CONNECTIONS", 10)?,
            log_level: get_var_or("LOG_LEVEL", "info"),
        })
    }
}

pub(crate) fn get_var(key: &str) -> OpsResult<String> {
    env::var(key).map_err(|_| OpsError::Config(format!("{key} is required but not set")))
}

pub(crate) fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an optional variable, falling back to `default` when unset.
/// A value that is present but malformed is a configuration error.
pub(crate) fn parse_var_or<T>(key: &str, default: T) -> OpsResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| OpsError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}
