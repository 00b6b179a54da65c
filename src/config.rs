//! Store configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is required")]
    Missing { var: &'static str },
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid { var: &'static str, expected: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `DB_ACQUIRE_TIMEOUT_SECS`: default 10
    ///
    /// `DEBUG` is read separately by `debug_enabled`, since logging starts
    /// before the store is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is unset or a numeric value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing { var: "DATABASE_URL" })?;
        let max_connections = env_parse("DB_MAX_CONNECTIONS", "a positive integer", DEFAULT_DB_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS",
                expected: "a positive integer",
                value: "0".into(),
            });
        }
        let acquire_secs = env_parse("DB_ACQUIRE_TIMEOUT_SECS", "a number of seconds", DEFAULT_DB_ACQUIRE_TIMEOUT_SECS)?;

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_secs),
        })
    }
}

/// Whether `DEBUG` holds a truthy value (`1`, `true`, `on` or `yes`).
#[must_use]
pub fn debug_enabled() -> bool {
    std::env::var("DEBUG").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

fn env_parse<T: std::str::FromStr>(var: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var, expected, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
