//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

use crate::auth::MAX_TOKEN_TTL_MINUTES;

/// Signing key used outside production when `JWT_SIGN` is unset
const DEV_JWT_SIGN: &str = "wallet-ledger-dev-signing-key";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// HS256 key for bearer tokens
    pub jwt_sign: String,

    /// Token lifetime in minutes, at most 30 days
    pub jwt_ttl_minutes: i64,

    pub log_format: LogFormat,

    /// Seconds between stuck-lock sweeps, 0 disables the monitor
    pub lock_monitor_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "8000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let jwt_sign = match lookup("JWT_SIGN").filter(|s| !s.is_empty()) {
            Some(key) => key,
            None if environment == "production" => return Err(ConfigError::MissingEnv("JWT_SIGN")),
            None => DEV_JWT_SIGN.to_string(),
        };

        let jwt_ttl_minutes = lookup("JWT_TTL_MINUTES")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .ok()
            .filter(|m: &i64| (1..=MAX_TOKEN_TTL_MINUTES).contains(m))
            .ok_or(ConfigError::InvalidValue("JWT_TTL_MINUTES"))?;

        let log_format = match lookup("LOG_FORMAT")
            .unwrap_or_else(|| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        let lock_monitor_interval_secs = lookup("LOCK_MONITOR_INTERVAL_SECS")
            .unwrap_or_else(|| "60".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("LOCK_MONITOR_INTERVAL_SECS"))?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            jwt_sign,
            jwt_ttl_minutes,
            log_format,
            lock_monitor_interval_secs,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
