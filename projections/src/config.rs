//! Environment-based configuration for the indexer.
//!
//! | Env var | Field | Default |
//! |---|---|---|
//! | `DATABASE_URL` | `database_url` | required |
//! | `STAKING_INDEXER_NAME` | `projection_name` | `staking-indexer` |
//! | `STAKING_INDEXER_MAX_CONNECTIONS` | `max_connections` | `10` |
//! | `STAKING_INDEXER_CHECKPOINT_INTERVAL` | `checkpoint_interval` | `100` |
//!
//! ```ignore
//! let config = IndexerConfig::from_env()?;
//! let store = PostgresEntityStore::connect(&config).await?;
//! ```

use crate::stream::DEFAULT_CHECKPOINT_INTERVAL;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Default checkpoint key.
pub const DEFAULT_PROJECTION_NAME: &str = "staking-indexer";

/// Default connection pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Environment variable not set: {0}")]
    Missing(String),

    /// A variable is set but unusable.
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Variable or field name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Indexer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Checkpoint key for this indexer.
    pub projection_name: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// Events between checkpoint saves.
    pub checkpoint_interval: u64,
}

impl IndexerConfig {
    /// Configuration with defaults for everything but the database URL.
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            projection_name: DEFAULT_PROJECTION_NAME.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `DATABASE_URL` is unset, or
    /// [`ConfigError::Invalid`] if any value fails to parse or validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::Missing("DATABASE_URL".to_string()))?;

        let mut config = Self::new(database_url);
        if let Some(name) = lookup("STAKING_INDEXER_NAME") {
            config.projection_name = name;
        }
        if let Some(value) = lookup("STAKING_INDEXER_MAX_CONNECTIONS") {
            config.max_connections = parse("STAKING_INDEXER_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = lookup("STAKING_INDEXER_CHECKPOINT_INTERVAL") {
            config.checkpoint_interval = parse("STAKING_INDEXER_CHECKPOINT_INTERVAL", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty URL or name, or a zero
    /// pool size or checkpoint interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(invalid("database_url", "must not be empty"));
        }
        if self.projection_name.trim().is_empty() {
            return Err(invalid("projection_name", "must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections", "must be greater than 0"));
        }
        if self.checkpoint_interval == 0 {
            return Err(invalid("checkpoint_interval", "must be greater than 0"));
        }
        Ok(())
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| invalid(name, &e.to_string()))
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
