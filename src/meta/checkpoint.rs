//! Checkpoint tracker: per-user watermark of the last successful pass

use super::{decode_ts, encode_ts, require_bounded_field, MetaDb};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::debug;

/// One row of `processed_users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCheckpoint {
    pub user_name: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct CheckpointRow {
    user_name: String,
    processed_at: String,
}

#[async_trait]
pub trait CheckpointTracker: Send + Sync {
    /// `None` means the user has never been processed.
    async fn get_checkpoint(&self, user_name: &str) -> Result<Option<DateTime<Utc>>>;

    /// Monotonic upsert: the stored value becomes `max(existing, at)`.
    ///
    /// Timestamps are kept at microsecond precision.
    async fn mark_processed(&self, user_name: &str, at: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
impl CheckpointTracker for MetaDb {
    async fn get_checkpoint(&self, user_name: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .bounded("get_checkpoint", async {
                let raw = sqlx::query_scalar(
                    "SELECT processed_at FROM processed_users WHERE user_name = ?",
                )
                .bind(user_name)
                .fetch_optional(&self.pool)
                .await?;
                Ok(raw)
            })
            .await?;
        raw.as_deref().map(decode_ts).transpose()
    }

    async fn mark_processed(&self, user_name: &str, at: DateTime<Utc>) -> Result<()> {
        require_bounded_field("user_name", user_name)?;
        let at = encode_ts(at.trunc_subsecs(6))?;

        self.bounded("mark_processed", async {
            sqlx::query(
                r#"
                INSERT INTO processed_users (user_name, processed_at)
                VALUES (?, ?)
                ON CONFLICT(user_name) DO UPDATE SET
                    processed_at = MAX(processed_users.processed_at, excluded.processed_at)
                "#,
            )
            .bind(user_name)
            .bind(&at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        debug!(%user_name, processed_at = %at, "Marked user processed");
        Ok(())
    }
}

impl MetaDb {
    /// All checkpoints, by user name
    pub async fn list_checkpoints(&self) -> Result<Vec<UserCheckpoint>> {
        let rows = self
            .bounded("list_checkpoints", async {
                let rows = sqlx::query_as::<_, CheckpointRow>(
                    "SELECT user_name, processed_at FROM processed_users ORDER BY user_name",
                )
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(UserCheckpoint {
                    processed_at: decode_ts(&row.processed_at)?,
                    user_name: row.user_name,
                })
            })
            .collect()
    }
}
