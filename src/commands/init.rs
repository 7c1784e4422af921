//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Where init put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitSummary {
    pub config_path: String,
    pub db_path: String,
    pub overwrote_config: bool,
}

/// Write a default config and create the ledger schema
pub async fn cmd_init(options: InitOptions) -> Result<InitSummary> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    let existed = config_path.exists();
    if existed && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.close().await;

    info!(
        config = %config.paths.config_file.display(),
        db = %config.paths.db_file.display(),
        "Initialized media-ledger"
    );

    Ok(InitSummary {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        overwrote_config: existed,
    })
}

pub fn print_init_summary(summary: &InitSummary) {
    println!("✓ media-ledger initialized successfully");
    println!("  Config: {}", summary.config_path);
    println!("  Database: {}", summary.db_path);
    println!("\nNext steps:");
    println!("  1. Point [source] at a media export or feed in the config file");
    println!("  2. List users under [ingest] or pass them with --user");
    println!("  3. Run: media-ledger ingest");
}
