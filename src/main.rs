//! media-ledger CLI entry point

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use media_ledger::{
    commands::{
        cmd_get_checkpoint, cmd_get_media, cmd_ingest, cmd_init, cmd_list_media,
        cmd_mark_checkpoint, cmd_remove_media, cmd_status, print_checkpoint, print_ingest_stats,
        print_init_summary, print_media_record, print_media_records, print_status, IngestOptions,
        InitOptions, MediaFilter,
    },
    config::Config,
    error::{Error, Result},
    meta::{MetaDb, ResourceType},
    progress::LogWriterFactory,
    source::create_source,
};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "media-ledger")]
#[command(version, about = "Idempotent media-ingestion ledger with resumable per-user checkpoints", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize media-ledger configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Run an ingestion pass for each user
    Ingest {
        /// User to ingest (repeatable; defaults to ingest.users)
        #[arg(short, long = "user")]
        users: Vec<String>,

        /// Maximum passes in flight
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show ledger totals and checkpoints
    Status,

    /// Inspect or remove ledger records
    Media {
        #[command(subcommand)]
        action: MediaAction,
    },

    /// Inspect or set user checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum MediaAction {
    /// Show the record for a resource id
    Get { resource_id: String },

    /// List records
    List {
        /// Only this user's records, oldest first
        #[arg(short, long)]
        user: Option<String>,

        /// Only this type (photo, video, album or a numeric code)
        #[arg(short = 't', long = "type")]
        resource_type: Option<ResourceType>,
    },

    /// Remove the record for a resource id
    Remove { resource_id: String },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Show a user's checkpoint
    Get { user: String },

    /// Advance a user's checkpoint
    Mark {
        user: String,

        /// RFC3339 timestamp (defaults to now); earlier values leave the checkpoint unchanged
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory))
        .with(filter)
        .init();

    // Neither needs an existing config
    match cli.command {
        Commands::Init { force } => return handle_init(cli.config, force, cli.json).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "media-ledger", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    let db = MetaDb::connect(&config).await?;

    let result = dispatch(cli.command, cli.json, &config, &db).await;
    db.close().await;
    result
}

async fn dispatch(command: Commands, json: bool, config: &Config, db: &MetaDb) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest { users, concurrency } => {
            let source = create_source(config)?;
            let options = IngestOptions {
                users: (!users.is_empty()).then_some(users),
                concurrency,
            };

            let stats = cmd_ingest(config, db, source.as_ref(), options, cancel_on_ctrl_c()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_ingest_stats(&stats);
            }
            if stats.users_failed > 0 {
                return Err(Error::PassesFailed {
                    failed: stats.users_failed,
                    total: stats.passes.len(),
                });
            }
        }

        Commands::Status => {
            let status = cmd_status(config, db).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Media { action } => handle_media(db, action, json).await?,

        Commands::Checkpoint { action } => handle_checkpoint(db, action, json).await?,
    }

    Ok(())
}

/// Flip the cancellation flag on the first Ctrl-C
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn handle_init(config: Option<PathBuf>, force: bool, json: bool) -> Result<()> {
    let (base_dir, config_path) = Config::resolve_location(config.as_deref());

    let summary = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
    })
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_init_summary(&summary);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let (_, config_path) = Config::resolve_location(path);
    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    let config = Config::load(&config_path)?;
    if !config.is_initialized() {
        return Err(Error::NotInitialized);
    }
    Ok(config)
}

async fn handle_media(db: &MetaDb, action: MediaAction, json: bool) -> Result<()> {
    match action {
        MediaAction::Get { resource_id } => {
            let record = cmd_get_media(db, &resource_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                match &record {
                    Some(record) => print_media_record(record),
                    None => println!("No record for resource '{}'", resource_id),
                }
            }
        }

        MediaAction::List {
            user,
            resource_type,
        } => {
            let filter = MediaFilter {
                user_name: user,
                resource_type,
            };
            let records = cmd_list_media(db, filter).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_media_records(&records);
            }
        }

        MediaAction::Remove { resource_id } => {
            let removed = cmd_remove_media(db, &resource_id).await?;
            if json {
                println!("{}", serde_json::json!({ "resource_id": resource_id, "removed": removed }));
            } else if removed {
                println!("✓ Removed resource '{}'", resource_id);
            } else {
                println!("No record for resource '{}'", resource_id);
            }
        }
    }
    Ok(())
}

async fn handle_checkpoint(db: &MetaDb, action: CheckpointAction, json: bool) -> Result<()> {
    let (user, checkpoint) = match action {
        CheckpointAction::Get { user } => {
            let checkpoint = cmd_get_checkpoint(db, &user).await?;
            (user, checkpoint)
        }
        CheckpointAction::Mark { user, at } => {
            let checkpoint = cmd_mark_checkpoint(db, &user, at).await?;
            (user, Some(checkpoint))
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    } else {
        print_checkpoint(&user, checkpoint.as_ref());
    }
    Ok(())
}
