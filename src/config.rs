//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::events::DispatchConfig;
use crate::jobs::JobSchedulerConfig;

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

    /// Deadline for one handler attempt
    pub handler_timeout_ms: u64,

    /// Attempts per handler before dead-lettering; 1 disables retries
    pub handler_max_attempts: u32,

    pub handler_retry_backoff_ms: u64,

    /// Handler attempts allowed to run at once
    pub handler_concurrency: usize,

    /// How often the outbox relay scans for stranded events
    pub outbox_poll_interval_secs: u64,

    /// Age after which an undispatched outbox row is redelivered
    pub outbox_redelivery_after_secs: u64,

    pub outbox_batch_size: i64,

    /// How long dispatched outbox rows and ledger markers are kept
    pub outbox_retention_hours: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let config = Self {
            database_url,
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            host,
            port: parse(&lookup, "PORT", 3000)?,
            environment,
            handler_timeout_ms: parse(&lookup, "HANDLER_TIMEOUT_MS", 10_000)?,
            handler_max_attempts: parse(&lookup, "HANDLER_MAX_ATTEMPTS", 3)?,
            handler_retry_backoff_ms: parse(&lookup, "HANDLER_RETRY_BACKOFF_MS", 100)?,
            handler_concurrency: parse(&lookup, "HANDLER_CONCURRENCY", 256)?,
            outbox_poll_interval_secs: parse(&lookup, "OUTBOX_POLL_INTERVAL_SECS", 5)?,
            outbox_redelivery_after_secs: parse(&lookup, "OUTBOX_REDELIVERY_AFTER_SECS", 60)?,
            outbox_batch_size: parse(&lookup, "OUTBOX_BATCH_SIZE", 100)?,
            outbox_retention_hours: parse(&lookup, "OUTBOX_RETENTION_HOURS", 72)?,
        };

        if config.handler_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("HANDLER_MAX_ATTEMPTS"));
        }
        if config.handler_concurrency == 0 {
            return Err(ConfigError::InvalidValue("HANDLER_CONCURRENCY"));
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Executor settings
    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            handler_timeout: Duration::from_millis(self.handler_timeout_ms),
            max_attempts: self.handler_max_attempts,
            retry_backoff: Duration::from_millis(self.handler_retry_backoff_ms),
            concurrency: self.handler_concurrency,
        }
    }

    /// Outbox relay and retention settings
    pub fn scheduler(&self) -> JobSchedulerConfig {
        JobSchedulerConfig {
            outbox_poll_interval: Duration::from_secs(self.outbox_poll_interval_secs),
            redelivery_after: Duration::from_secs(self.outbox_redelivery_after_secs),
            batch_size: self.outbox_batch_size,
            retention: Duration::from_secs(self.outbox_retention_hours * 3600),
            ..JobSchedulerConfig::default()
        }
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/matzip")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_max_connections, 10);
        assert!(!config.is_production());
        assert_eq!(config.dispatch(), DispatchConfig::default());
        assert_eq!(config.scheduler().retention, Duration::from_secs(72 * 3600));
    }

    #[test]
    fn test_missing_database_url() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("DATABASE_URL")));
    }

    #[test]
    fn test_invalid_values() {
        let err = load(&[("DATABASE_URL", "x"), ("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("PORT")));

        let err = load(&[("DATABASE_URL", "x"), ("HANDLER_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("HANDLER_MAX_ATTEMPTS")));
    }

    #[test]
    fn test_single_attempt_disables_retries() {
        let config = load(&[("DATABASE_URL", "x"), ("HANDLER_MAX_ATTEMPTS", "1")]).unwrap();
        assert_eq!(config.dispatch().max_attempts, 1);
    }
}
