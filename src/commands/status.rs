//! Status command implementation

use crate::config::{Config, SourceKind};
use crate::error::Result;
use crate::meta::{LedgerStats, MetaDb, UserCheckpoint};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub source: String,
    pub configured_users: Vec<String>,
    pub ledger: LedgerStats,
    pub checkpoints: Vec<UserCheckpoint>,
}

/// Get ledger totals and every checkpoint
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<StatusInfo> {
    info!("Getting status");

    let source = match config.source.kind {
        SourceKind::File => match config.source_path() {
            Some(path) => format!("file {}", path.display()),
            None => "file (no path configured)".to_string(),
        },
        SourceKind::Http => format!("http {}", config.source.url),
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        source,
        configured_users: config.ingest.users.clone(),
        ledger: db.get_ledger_stats().await?,
        checkpoints: db.list_checkpoints().await?,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 media-ledger Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Source: {}", status.source);
    if !status.configured_users.is_empty() {
        println!("Configured users: {}", status.configured_users.join(", "));
    }

    println!("\nLedger:");
    println!("  Records: {}", status.ledger.total_records);
    println!("  Users: {}", status.ledger.unique_users);

    println!("\nCheckpoints:");
    if status.checkpoints.is_empty() {
        println!("  (none yet)");
    }
    for checkpoint in &status.checkpoints {
        println!(
            "  {:<20} {}",
            checkpoint.user_name,
            checkpoint.processed_at.to_rfc3339()
        );
    }
}
