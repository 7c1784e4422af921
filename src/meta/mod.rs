//! Ledger storage using SQLite
//!
//! This module owns the two persisted tables:
//! - `media_data` (the ledger store, see [`LedgerStore`])
//! - `processed_users` (the checkpoint tracker, see [`CheckpointTracker`])
//!
//! Every store call is bounded by the configured operation timeout; a call
//! that elapses fails with `StoreUnavailable` and is safe to retry.

mod checkpoint;
mod media;
mod schema;

pub use checkpoint::*;
pub use media::*;
pub use schema::*;

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StoreConfig};
use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ledger database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    op_timeout: Duration,
}

impl MetaDb {
    /// Connect to the ledger database described by `config`, creating the schema if needed
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file, &config.store).await
    }

    /// Open a database file directly (without full config)
    pub async fn open(db_path: &Path, store: &StoreConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(store.busy_timeout());

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(store.max_connections)
            .acquire_timeout(store.op_timeout())
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            clock: Arc::new(SystemClock::new()),
            op_timeout: store.op_timeout(),
        };

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Replace the clock used for `created_at`, `updated_at` and checkpoint defaults
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the per-call timeout
    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        self.bounded("init_schema", async {
            sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        self.bounded("is_initialized", async {
            let result: Option<(i32,)> = sqlx::query_as(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name='media_data'",
            )
            .fetch_optional(&self.pool)
            .await?;
            Ok(result.is_some())
        })
        .await
    }

    /// Close the pool, waiting for in-flight statements
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run a store call under the operation timeout
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Store call timed out"
                );
                Err(Error::StoreUnavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.op_timeout
                )))
            }
        }
    }
}

/// Longest accepted value for the bounded string columns
pub const MAX_FIELD_CHARS: usize = 255;

pub(crate) fn require_field(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", name)));
    }
    Ok(())
}

pub(crate) fn require_bounded_field(name: &str, value: &str) -> Result<()> {
    require_field(name, value)?;
    let len = value.chars().count();
    if len > MAX_FIELD_CHARS {
        return Err(Error::Validation(format!(
            "{} is {} characters, limit is {}",
            name, len, MAX_FIELD_CHARS
        )));
    }
    Ok(())
}

/// Encode a timestamp in the store's fixed-width text form
pub(crate) fn encode_ts(ts: DateTime<Utc>) -> Result<String> {
    if !(0..=9999).contains(&ts.year()) {
        return Err(Error::Validation(format!(
            "timestamp {} is outside years 0000-9999",
            ts
        )));
    }
    Ok(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRow(format!("bad timestamp '{}': {}", raw, e)))
}
