//! Checkpoint commands

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::meta::{CheckpointTracker, MetaDb, UserCheckpoint};
use chrono::{DateTime, Utc};

/// Current checkpoint for a user, `None` if never processed
pub async fn cmd_get_checkpoint(db: &MetaDb, user_name: &str) -> Result<Option<UserCheckpoint>> {
    Ok(db
        .get_checkpoint(user_name)
        .await?
        .map(|processed_at| UserCheckpoint {
            user_name: user_name.to_string(),
            processed_at,
        }))
}

/// Mark a user processed at `at` (default: now) and return the stored checkpoint.
///
/// The stored value never moves backwards, so it can be later than `at`.
pub async fn cmd_mark_checkpoint(
    db: &MetaDb,
    user_name: &str,
    at: Option<DateTime<Utc>>,
) -> Result<UserCheckpoint> {
    let at = at.unwrap_or_else(|| db.clock().now());
    db.mark_processed(user_name, at).await?;
    cmd_get_checkpoint(db, user_name).await?.ok_or_else(|| {
        Error::CorruptRow(format!("checkpoint for '{}' missing after mark", user_name))
    })
}

pub fn print_checkpoint(user_name: &str, checkpoint: Option<&UserCheckpoint>) {
    match checkpoint {
        Some(c) => println!("{}: {}", c.user_name, c.processed_at.to_rfc3339()),
        None => println!("{}: never processed", user_name),
    }
}
