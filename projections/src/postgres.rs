//! `PostgreSQL` implementations of the entity store and checkpoint.
//!
//! # Schema
//!
//! All entities share one table, partitioned by kind:
//!
//! ```sql
//! CREATE TABLE entities (
//!     kind TEXT NOT NULL,
//!     key TEXT NOT NULL,
//!     data BYTEA NOT NULL,
//!     updated_at TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (kind, key)
//! );
//! ```
//!
//! Stored bytes are JSON, so `convert_from(data, 'UTF8')::jsonb` makes every
//! entity queryable from SQL.
//!
//! # Example
//!
//! ```ignore
//! let store = PostgresEntityStore::connect(&config).await?;
//! store.migrate().await?;
//! let checkpoint = PostgresCheckpoint::new(store.pool().clone());
//! ```

use crate::config::IndexerConfig;
use staking_indexer_core::{
    Checkpoint, DateTime, EntityKind, EntityStore, EventPosition, IndexerError, Result, Utc,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;

/// Default table for entity data.
pub const DEFAULT_ENTITY_TABLE: &str = "entities";

/// PostgreSQL-backed [`EntityStore`].
#[derive(Clone)]
pub struct PostgresEntityStore {
    pool: PgPool,
    table_name: String,
}

impl PostgresEntityStore {
    /// Create a store over an existing pool, using the [`DEFAULT_ENTITY_TABLE`].
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, DEFAULT_ENTITY_TABLE.to_string())
    }

    /// Create a store over an existing pool and a custom table.
    ///
    /// The table must have the shape created by the bundled migration.
    #[must_use]
    pub const fn with_table(pool: PgPool, table_name: String) -> Self {
        Self { pool, table_name }
    }

    /// Connect a new pool sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Storage`] if the connection fails.
    pub async fn connect(config: &IndexerConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| IndexerError::Storage(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections = config.max_connections, "Connected entity store");
        Ok(Self::new(pool))
    }

    /// Run the bundled migrations (entity and checkpoint tables).
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the table name for this store.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl EntityStore for PostgresEntityStore {
    async fn load(&self, kind: EntityKind, key: &str) -> Result<Option<Vec<u8>>> {
        let query = format!(
            "SELECT data FROM {} WHERE kind = $1 AND key = $2",
            self.table_name
        );

        let result: Option<(Vec<u8>,)> = sqlx::query_as(&query)
            .bind(kind.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(format!("Failed to load {kind} {key}: {e}")))?;

        Ok(result.map(|(data,)| data))
    }

    async fn store(&self, kind: EntityKind, key: &str, data: &[u8]) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (kind, key, data, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (kind, key) DO UPDATE
             SET data = EXCLUDED.data, updated_at = now()",
            self.table_name
        );

        sqlx::query(&query)
            .bind(kind.as_str())
            .bind(key)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(format!("Failed to store {kind} {key}: {e}")))?;

        Ok(())
    }

    async fn exists(&self, kind: EntityKind, key: &str) -> Result<bool> {
        let query = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE kind = $1 AND key = $2)",
            self.table_name
        );

        let (exists,): (bool,) = sqlx::query_as(&query)
            .bind(kind.as_str())
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(format!("Failed to check {kind} {key}: {e}")))?;

        Ok(exists)
    }
}

/// PostgreSQL-backed [`Checkpoint`].
///
/// ```sql
/// CREATE TABLE indexer_checkpoints (
///     indexer_name TEXT PRIMARY KEY,
///     events_processed BIGINT NOT NULL,
///     block_number BIGINT NOT NULL,
///     log_index BIGINT NOT NULL,
///     recorded_at TIMESTAMPTZ NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```
#[derive(Clone)]
pub struct PostgresCheckpoint {
    pool: PgPool,
}

impl PostgresCheckpoint {
    /// Create a checkpoint tracker using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

type CheckpointRow = (i64, i64, i64, DateTime<Utc>);

fn position_from_row(row: CheckpointRow) -> Result<EventPosition> {
    let (events_processed, block_number, log_index, recorded_at) = row;
    let unsigned = |value: i64, column: &str| {
        u64::try_from(value)
            .map_err(|_| IndexerError::Checkpoint(format!("Negative {column} in checkpoint")))
    };
    let log_index = u32::try_from(log_index).map_err(|_| {
        IndexerError::Checkpoint("log_index out of range in checkpoint".to_string())
    })?;

    Ok(EventPosition::new(
        unsigned(events_processed, "events_processed")?,
        unsigned(block_number, "block_number")?,
        log_index,
        recorded_at,
    ))
}

impl Checkpoint for PostgresCheckpoint {
    fn save_position(
        &self,
        name: &str,
        position: EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            // BIGINT is signed; counts and block heights stay well below 2^63.
            #[allow(clippy::cast_possible_wrap)]
            let (events_processed, block_number) = (
                position.events_processed as i64,
                position.block_number as i64,
            );

            sqlx::query(
                "INSERT INTO indexer_checkpoints
                     (indexer_name, events_processed, block_number, log_index, recorded_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, now())
                 ON CONFLICT (indexer_name) DO UPDATE
                 SET events_processed = EXCLUDED.events_processed,
                     block_number = EXCLUDED.block_number,
                     log_index = EXCLUDED.log_index,
                     recorded_at = EXCLUDED.recorded_at,
                     updated_at = now()",
            )
            .bind(name)
            .bind(events_processed)
            .bind(block_number)
            .bind(i64::from(position.log_index))
            .bind(position.recorded_at)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Checkpoint(format!("Failed to save checkpoint: {e}")))?;

            Ok(())
        })
    }

    fn load_position(
        &self,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<EventPosition>>> + Send + '_>> {
        let name = name.to_string();
        Box::pin(async move {
            let row: Option<CheckpointRow> = sqlx::query_as(
                "SELECT events_processed, block_number, log_index, recorded_at
                 FROM indexer_checkpoints
                 WHERE indexer_name = $1",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Checkpoint(format!("Failed to load checkpoint: {e}")))?;

            row.map(position_from_row).transpose()
        })
    }
}
