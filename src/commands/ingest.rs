//! Ingest command - run one ingestion pass per user

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::pass::{IngestionPass, PassLimits, PassReport, PassState};
use crate::progress::pass_progress_bar;
use crate::retry::RetryPolicy;
use crate::source::MediaSource;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

/// Ingest options
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Users to process instead of `ingest.users`
    pub users: Option<Vec<String>>,
    /// Override `ingest.concurrency`
    pub concurrency: Option<usize>,
}

/// Ingestion statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub users_done: usize,
    pub users_failed: usize,
    pub users_cancelled: usize,
    pub resources_fetched: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub passes: Vec<PassReport>,
    pub errors: Vec<String>,
}

impl IngestStats {
    fn record(&mut self, report: PassReport) {
        self.resources_fetched += report.fetched;
        self.records_inserted += report.inserted;
        self.records_updated += report.updated;
        match report.state {
            PassState::Done => self.users_done += 1,
            PassState::Cancelled => self.users_cancelled += 1,
            _ => {
                self.users_failed += 1;
                let error_msg = format!(
                    "{}: {}",
                    report.user_name,
                    report.error.as_deref().unwrap_or("pass did not finish")
                );
                self.errors.push(error_msg);
            }
        }
        self.passes.push(report);
    }

    pub fn all_succeeded(&self) -> bool {
        self.users_failed == 0 && self.users_cancelled == 0
    }
}

/// Run passes for the requested users against `source`
pub async fn cmd_ingest(
    config: &Config,
    db: &MetaDb,
    source: &dyn MediaSource,
    options: IngestOptions,
    cancel: watch::Receiver<bool>,
) -> Result<IngestStats> {
    let users = options
        .users
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| config.ingest.users.clone());
    if users.is_empty() {
        return Err(Error::Config(
            "No users to ingest: pass --user or set ingest.users".to_string(),
        ));
    }
    let concurrency = options.concurrency.unwrap_or(config.ingest.concurrency);

    info!(
        users = users.len(),
        concurrency,
        source = source.name(),
        "Starting ingestion"
    );

    let clock = db.clock();
    let pass = IngestionPass::new(db, db, source, clock.as_ref())
        .with_retry(RetryPolicy::from_config(&config.retry))
        .with_limits(PassLimits::from_config(&config.ingest))
        .with_cancellation(cancel);

    let bar = pass_progress_bar(users.len() as u64);
    let reports = pass
        .run_all(&users, concurrency, |report| {
            bar.set_message(format!("{} {}", report.user_name, report.state));
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    let mut stats = IngestStats::default();
    for report in reports {
        if report.state == PassState::Failed {
            warn!(user_name = %report.user_name, "Pass failed, checkpoint unchanged");
        }
        stats.record(report);
    }
    stats.passes.sort_by(|a, b| a.user_name.cmp(&b.user_name));

    Ok(stats)
}

/// Print ingest stats to console
pub fn print_ingest_stats(stats: &IngestStats) {
    println!("\n✓ Ingestion complete\n");
    println!("Users done: {}", stats.users_done);
    if stats.users_failed > 0 {
        println!("Users failed: {}", stats.users_failed);
    }
    if stats.users_cancelled > 0 {
        println!("Users cancelled: {}", stats.users_cancelled);
    }
    println!("Resources fetched: {}", stats.resources_fetched);
    println!("Records inserted: {}", stats.records_inserted);
    println!("Records updated: {}", stats.records_updated);

    println!("\nPasses:");
    for pass in &stats.passes {
        let checkpoint = pass
            .checkpoint_after
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<20} {:<10} +{} ~{}  checkpoint {}",
            pass.user_name, pass.state, pass.inserted, pass.updated, checkpoint
        );
    }

    if !stats.errors.is_empty() {
        println!("\nErrors:");
        for error in &stats.errors {
            println!("- {}", error);
        }
    }
}
