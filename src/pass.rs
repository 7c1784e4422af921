//! Per-user ingestion pass
//!
//! A pass walks Start -> Fetch -> Apply -> Commit and ends in Done, Failed or
//! Cancelled. The checkpoint is only advanced in Commit, after every fetched
//! resource has been applied, so an interrupted pass leaves the watermark where
//! it was and the next pass re-reads the same window. Re-applying is harmless
//! because ingestion is idempotent per `resource_id`. The watermark committed
//! is the instant the pass started, so anything published while it runs falls
//! into the next window.

use crate::clock::Clock;
use crate::config::IngestConfig;
use crate::error::Error;
use crate::meta::{CheckpointTracker, IngestOutcome, LedgerStore, MediaCandidate};
use crate::retry::RetryPolicy;
use crate::source::{filter_candidates, FetchRequest, MediaSource};
use chrono::{DateTime, SubsecRound, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassState {
    Start,
    Fetch,
    Apply,
    Commit,
    Done,
    Failed,
    Cancelled,
}

impl PassState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PassState::Done | PassState::Failed | PassState::Cancelled)
    }
}

impl std::fmt::Display for PassState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PassState::Start => "start",
            PassState::Fetch => "fetch",
            PassState::Apply => "apply",
            PassState::Commit => "commit",
            PassState::Done => "done",
            PassState::Failed => "failed",
            PassState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub user_name: String,
    pub state: PassState,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub checkpoint_before: Option<DateTime<Utc>>,
    pub checkpoint_after: Option<DateTime<Utc>>,
    /// Step that failed, if any
    pub failed_in: Option<PassState>,
    pub error: Option<String>,
}

impl PassReport {
    fn new(user_name: &str) -> Self {
        Self {
            user_name: user_name.to_string(),
            state: PassState::Start,
            fetched: 0,
            inserted: 0,
            updated: 0,
            checkpoint_before: None,
            checkpoint_after: None,
            failed_in: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == PassState::Done
    }
}

/// How many resources to request from the source
#[derive(Debug, Clone, Copy)]
pub struct PassLimits {
    pub new_user_limit: usize,
    pub existing_user_limit: usize,
}

impl PassLimits {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            new_user_limit: config.new_user_limit,
            existing_user_limit: config.existing_user_limit,
        }
    }

    pub fn for_checkpoint(&self, checkpoint: Option<DateTime<Utc>>) -> usize {
        match checkpoint {
            Some(_) => self.existing_user_limit,
            None => self.new_user_limit,
        }
    }
}

impl Default for PassLimits {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Drives ingestion passes against a ledger, a checkpoint tracker and a media source
pub struct IngestionPass<'a> {
    ledger: &'a dyn LedgerStore,
    checkpoints: &'a dyn CheckpointTracker,
    source: &'a dyn MediaSource,
    clock: &'a dyn Clock,
    retry: RetryPolicy,
    limits: PassLimits,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> IngestionPass<'a> {
    pub fn new(
        ledger: &'a dyn LedgerStore,
        checkpoints: &'a dyn CheckpointTracker,
        source: &'a dyn MediaSource,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            ledger,
            checkpoints,
            source,
            clock,
            retry: RetryPolicy::default(),
            limits: PassLimits::default(),
            cancel: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: PassLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Stop passes at the next step boundary once `true` is sent
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn fail(&self, report: &mut PassReport, step: PassState, err: Error) -> PassState {
        warn!(
            user_name = %report.user_name,
            step = %step,
            error = %err,
            "Ingestion pass failed"
        );
        report.failed_in = Some(step);
        report.error = Some(err.to_string());
        PassState::Failed
    }

    /// Run one pass for `user_name` to a terminal state
    pub async fn run(&self, user_name: &str) -> PassReport {
        let mut report = PassReport::new(user_name);
        let mut checkpoint = None;
        let mut started_at = DateTime::<Utc>::MIN_UTC;
        let mut batch: Vec<MediaCandidate> = Vec::new();
        let mut state = PassState::Start;

        while !state.is_terminal() {
            if self.is_cancelled() {
                info!(%user_name, step = %state, "Ingestion pass cancelled");
                state = PassState::Cancelled;
                break;
            }
            debug!(%user_name, step = %state, "Ingestion pass step");

            state = match state {
                PassState::Start => {
                    match self
                        .retry
                        .run("get_checkpoint", || self.checkpoints.get_checkpoint(user_name))
                        .await
                    {
                        Ok(found) => {
                            checkpoint = found;
                            report.checkpoint_before = found;
                            // Anything published after this instant belongs to the next window
                            started_at = self.clock.now().trunc_subsecs(6);
                            PassState::Fetch
                        }
                        Err(e) => self.fail(&mut report, PassState::Start, e),
                    }
                }

                PassState::Fetch => {
                    let request = FetchRequest {
                        user_name: user_name.to_string(),
                        since: checkpoint,
                        limit: self.limits.for_checkpoint(checkpoint),
                    };
                    match self.source.fetch(&request).await {
                        Ok(listing) => {
                            // Sources may ignore `since`; the window is enforced here too
                            batch = filter_candidates(listing, &request);
                            report.fetched = batch.len();
                            PassState::Apply
                        }
                        Err(e) => self.fail(&mut report, PassState::Fetch, e),
                    }
                }

                PassState::Apply => self.apply(&batch, &mut report).await,

                PassState::Commit => {
                    match self
                        .retry
                        .run("mark_processed", || {
                            self.checkpoints.mark_processed(user_name, started_at)
                        })
                        .await
                    {
                        Ok(()) => {
                            report.checkpoint_after =
                                Some(checkpoint.map_or(started_at, |prev| prev.max(started_at)));
                            PassState::Done
                        }
                        Err(e) => self.fail(&mut report, PassState::Commit, e),
                    }
                }

                terminal => terminal,
            };
        }

        if report.checkpoint_after.is_none() {
            report.checkpoint_after = report.checkpoint_before;
        }
        report.state = state;

        if state == PassState::Done {
            info!(
                %user_name,
                fetched = report.fetched,
                inserted = report.inserted,
                updated = report.updated,
                "Ingestion pass complete"
            );
        }
        report
    }

    /// Returns Commit, Failed or Cancelled
    async fn apply(&self, batch: &[MediaCandidate], report: &mut PassReport) -> PassState {
        for candidate in batch {
            if self.is_cancelled() {
                info!(
                    user_name = %report.user_name,
                    applied = report.inserted + report.updated,
                    remaining = batch.len() - (report.inserted + report.updated),
                    "Ingestion pass cancelled during apply"
                );
                return PassState::Cancelled;
            }

            match self.retry.run("ingest", || self.ledger.ingest(candidate)).await {
                Ok(IngestOutcome::Inserted) => report.inserted += 1,
                Ok(IngestOutcome::Updated) => report.updated += 1,
                Err(e) => {
                    let e = match e {
                        Error::Validation(msg) => Error::Validation(format!(
                            "resource '{}': {}",
                            candidate.resource_id, msg
                        )),
                        other => other,
                    };
                    return self.fail(report, PassState::Apply, e);
                }
            }
        }
        PassState::Commit
    }

    /// Run one pass per distinct user with at most `concurrency` in flight.
    ///
    /// `on_report` sees each report as its pass finishes.
    pub async fn run_all(
        &self,
        users: &[String],
        concurrency: usize,
        mut on_report: impl FnMut(&PassReport),
    ) -> Vec<PassReport> {
        let mut seen = HashSet::new();
        let distinct: Vec<&str> = users
            .iter()
            .map(String::as_str)
            .filter(|u| seen.insert(*u))
            .collect();

        futures::stream::iter(distinct)
            .map(|user| self.run(user))
            .buffer_unordered(concurrency.max(1))
            .inspect(|report| on_report(report))
            .collect()
            .await
    }
}
