//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Default bearer token lifetime in hours (one week).
const DEFAULT_TOKEN_TTL_HOURS: i64 = 168;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Base URL of the external Resource Directory service
    pub directory_url: String,

    /// Resource Directory request timeout in seconds
    pub directory_timeout_secs: u64,

    /// Bearer token lifetime in hours
    pub token_ttl_hours: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            directory_url: env::var("DIRECTORY_URL")
                .map_err(|_| AppError::Config("DIRECTORY_URL not set".into()))?,
            directory_timeout_secs: env::var("DIRECTORY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".into())
                .parse()
                .unwrap_or(30),
            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .unwrap_or_else(|_| DEFAULT_TOKEN_TTL_HOURS.to_string())
                .parse()
                .unwrap_or(DEFAULT_TOKEN_TTL_HOURS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_token_ttl_is_one_week() {
        assert_eq!(DEFAULT_TOKEN_TTL_HOURS, 168);
    }
}
