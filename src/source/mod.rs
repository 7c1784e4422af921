//! Media sources
//!
//! This module provides an abstraction over the upstream media feed with:
//! - A trait for different feed backends
//! - A JSON export reader (`media_data.json` style)
//! - An HTTP feed client

mod file_source;
mod http_backend;

pub use file_source::*;
pub use http_backend::*;

use crate::config::{Config, SourceKind};
use crate::error::{Error, Result};
use crate::meta::MediaCandidate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// What a pass asks its source for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub user_name: String,
    /// Only resources published after this instant; `None` for a user never processed
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Trait for media feed providers
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// List the user's resources, newest-first or in feed order, at most `request.limit`
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<MediaCandidate>>;

    /// Short name for logs
    fn name(&self) -> &str;
}

/// Whether a candidate is newer than the checkpoint.
///
/// Candidates without a publish time are always kept: re-ingesting them is harmless.
pub fn is_newer_than(candidate: &MediaCandidate, since: Option<DateTime<Utc>>) -> bool {
    match (since, candidate.published_at) {
        (Some(since), Some(published)) => published > since,
        _ => true,
    }
}

/// Apply a fetch request to a full listing
pub fn filter_candidates(
    candidates: impl IntoIterator<Item = MediaCandidate>,
    request: &FetchRequest,
) -> Vec<MediaCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.user_name == request.user_name)
        .filter(|c| is_newer_than(c, request.since))
        .take(request.limit)
        .collect()
}

/// Create a media source based on configuration
pub fn create_source(config: &Config) -> Result<Box<dyn MediaSource>> {
    match config.source.kind {
        SourceKind::File => {
            let path = config.source_path().ok_or_else(|| {
                Error::Config("source.path is required for the file source".to_string())
            })?;
            Ok(Box::new(FileSource::new(path)))
        }
        SourceKind::Http => Ok(Box::new(HttpSource::new(&config.source)?)),
    }
}
