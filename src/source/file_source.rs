use super::{filter_candidates, FetchRequest, MediaSource};
use crate::error::{Error, Result};
use crate::meta::MediaCandidate;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Reads a JSON array of candidates from disk on every fetch.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<Vec<MediaCandidate>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Source(format!("Failed to read '{}': {}", self.path.display(), e))
        })?;
        let items: Vec<MediaCandidate> = serde_json::from_str(&content)?;
        Ok(items)
    }
}

#[async_trait]
impl MediaSource for FileSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<MediaCandidate>> {
        let all = self.load().await?;
        let total = all.len();
        let selected = filter_candidates(all, request);
        debug!(
            path = %self.path.display(),
            user_name = %request.user_name,
            total,
            selected = selected.len(),
            "Loaded media export"
        );
        Ok(selected)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    const EXPORT: &str = r#"[
        {"user_id": "11", "user_name": "alice", "resource_id": "r1", "resource_url": "https://cdn/r1.jpg"},
        {"user_id": "11", "user_name": "alice", "resource_id": "r2", "resource_url": "https://cdn/r2.mp4", "resource_type": 2,
         "published_at": "2024-03-01T00:00:00Z"},
        {"user_id": "22", "user_name": "bob", "resource_id": "r3", "resource_url": "https://cdn/r3.jpg"}
    ]"#;

    #[tokio::test]
    async fn test_reads_crawler_export() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("media_data.json");
        std::fs::write(&path, EXPORT).unwrap();

        let source = FileSource::new(&path);
        let request = FetchRequest {
            user_name: "alice".to_string(),
            since: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            limit: 20,
        };
        let items = source.fetch(&request).await.unwrap();
        let ids: Vec<_> = items.iter().map(|c| c.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(items[1].resource_type.code(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let tmp = TempDir::new().unwrap();
        let source = FileSource::new(tmp.path().join("absent.json"));
        let request = FetchRequest {
            user_name: "alice".to_string(),
            since: None,
            limit: 5,
        };
        assert!(matches!(source.fetch(&request).await, Err(Error::Source(_))));
    }
}
