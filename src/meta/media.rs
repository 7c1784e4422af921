//! Ledger store: deduplicated media records keyed by `resource_id`

use super::{decode_ts, encode_ts, require_bounded_field, require_field, MetaDb};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Media category, persisted as its numeric code.
///
/// Equality and hashing go by [`ResourceType::code`], so `Other(1) == Photo`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ResourceType {
    #[default]
    Photo,
    Video,
    Album,
    Other(i32),
}

impl ResourceType {
    pub fn code(self) -> i32 {
        match self {
            ResourceType::Photo => 1,
            ResourceType::Video => 2,
            ResourceType::Album => 8,
            ResourceType::Other(code) => code,
        }
    }
}

impl PartialEq for ResourceType {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for ResourceType {}

impl std::hash::Hash for ResourceType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code().hash(state);
    }
}

impl From<i32> for ResourceType {
    fn from(code: i32) -> Self {
        match code {
            1 => ResourceType::Photo,
            2 => ResourceType::Video,
            8 => ResourceType::Album,
            other => ResourceType::Other(other),
        }
    }
}

impl From<ResourceType> for i32 {
    fn from(kind: ResourceType) -> Self {
        kind.code()
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Photo => write!(f, "photo"),
            ResourceType::Video => write!(f, "video"),
            ResourceType::Album => write!(f, "album"),
            ResourceType::Other(code) => write!(f, "type-{}", code),
        }
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "photo" => Ok(ResourceType::Photo),
            "video" => Ok(ResourceType::Video),
            "album" => Ok(ResourceType::Album),
            other => other
                .trim_start_matches("type-")
                .parse::<i32>()
                .map(ResourceType::from)
                .map_err(|_| Error::Validation(format!("Unknown resource type: {}", s))),
        }
    }
}

/// A resource as listed by a media source, before it enters the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCandidate {
    pub user_id: String,
    pub user_name: String,
    pub resource_id: String,
    pub resource_url: String,
    #[serde(default)]
    pub resource_type: ResourceType,
    /// When the upstream platform published the resource; only used to filter fetches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl MediaCandidate {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        resource_id: impl Into<String>,
        resource_url: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            resource_id: resource_id.into(),
            resource_url: resource_url.into(),
            resource_type,
            published_at: None,
        }
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_bounded_field("resource_id", &self.resource_id)?;
        require_bounded_field("user_id", &self.user_id)?;
        require_bounded_field("user_name", &self.user_name)?;
        require_field("resource_url", &self.resource_url)?;
        Ok(())
    }
}

/// One row of `media_data`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub resource_id: String,
    pub resource_url: String,
    pub resource_type: ResourceType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MediaRow {
    id: String,
    user_id: String,
    user_name: String,
    resource_id: String,
    resource_url: String,
    resource_type: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = Error;

    fn try_from(row: MediaRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| Error::CorruptRow(format!("bad media id '{}': {}", row.id, e)))?;
        let code = i32::try_from(row.resource_type).map_err(|_| {
            Error::CorruptRow(format!("resource_type {} out of range", row.resource_type))
        })?;
        Ok(Self {
            id,
            user_id: row.user_id,
            user_name: row.user_name,
            resource_id: row.resource_id,
            resource_url: row.resource_url,
            resource_type: ResourceType::from(code),
            created_at: decode_ts(&row.created_at)?,
            updated_at: decode_ts(&row.updated_at)?,
        })
    }
}

fn into_records(rows: Vec<MediaRow>) -> Result<Vec<MediaRecord>> {
    rows.into_iter().map(MediaRecord::try_from).collect()
}

/// Result of a single ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    /// A new row was created
    Inserted,
    /// An existing row's mutable fields were refreshed
    Updated,
}

impl std::fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestOutcome::Inserted => write!(f, "inserted"),
            IngestOutcome::Updated => write!(f, "updated"),
        }
    }
}

/// Ledger totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_records: usize,
    pub unique_users: usize,
    pub users: Vec<String>,
}

/// Durable, deduplicated record of media resources
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert the candidate, or refresh the mutable fields of the row with the same `resource_id`.
    ///
    /// Atomic per `resource_id`: of any number of concurrent calls for one
    /// resource exactly one reports `Inserted`.
    async fn ingest(&self, candidate: &MediaCandidate) -> Result<IngestOutcome>;

    async fn lookup_by_resource_id(&self, resource_id: &str) -> Result<Option<MediaRecord>>;

    /// Records for a user, oldest `created_at` first
    async fn list_by_user_name(&self, user_name: &str) -> Result<Vec<MediaRecord>>;

    /// Records of one type, in no particular order
    async fn list_by_resource_type(&self, resource_type: ResourceType)
        -> Result<Vec<MediaRecord>>;
}

#[async_trait]
impl LedgerStore for MetaDb {
    async fn ingest(&self, candidate: &MediaCandidate) -> Result<IngestOutcome> {
        candidate.validate()?;

        let fresh_id = Uuid::new_v4().to_string();
        let now = encode_ts(self.clock.now())?;

        let stored_id: String = self
            .bounded("ingest", async {
                let id: String = sqlx::query_scalar(
                    r#"
                    INSERT INTO media_data (id, user_id, user_name, resource_id, resource_url, resource_type, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(resource_id) DO UPDATE SET
                        user_id = excluded.user_id,
                        user_name = excluded.user_name,
                        resource_url = excluded.resource_url,
                        resource_type = excluded.resource_type,
                        updated_at = MAX(media_data.updated_at, excluded.updated_at)
                    RETURNING id
                    "#,
                )
                .bind(&fresh_id)
                .bind(&candidate.user_id)
                .bind(&candidate.user_name)
                .bind(&candidate.resource_id)
                .bind(&candidate.resource_url)
                .bind(candidate.resource_type.code())
                .bind(&now)
                .bind(&now)
                .fetch_one(&self.pool)
                .await?;
                Ok(id)
            })
            .await?;

        let outcome = if stored_id == fresh_id {
            IngestOutcome::Inserted
        } else {
            IngestOutcome::Updated
        };
        debug!(
            resource_id = %candidate.resource_id,
            user_name = %candidate.user_name,
            %outcome,
            "Ingested media"
        );
        Ok(outcome)
    }

    async fn lookup_by_resource_id(&self, resource_id: &str) -> Result<Option<MediaRecord>> {
        let row = self
            .bounded("lookup_by_resource_id", async {
                let row = sqlx::query_as::<_, MediaRow>(
                    "SELECT * FROM media_data WHERE resource_id = ?",
                )
                .bind(resource_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok(row)
            })
            .await?;
        row.map(MediaRecord::try_from).transpose()
    }

    async fn list_by_user_name(&self, user_name: &str) -> Result<Vec<MediaRecord>> {
        let rows = self
            .bounded("list_by_user_name", async {
                let rows = sqlx::query_as::<_, MediaRow>(
                    "SELECT * FROM media_data WHERE user_name = ? ORDER BY created_at ASC, rowid ASC",
                )
                .bind(user_name)
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;
        into_records(rows)
    }

    async fn list_by_resource_type(
        &self,
        resource_type: ResourceType,
    ) -> Result<Vec<MediaRecord>> {
        let rows = self
            .bounded("list_by_resource_type", async {
                let rows = sqlx::query_as::<_, MediaRow>(
                    "SELECT * FROM media_data WHERE resource_type = ?",
                )
                .bind(resource_type.code())
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;
        into_records(rows)
    }
}

impl MetaDb {
    /// Every record, oldest first
    pub async fn list_media(&self) -> Result<Vec<MediaRecord>> {
        let rows = self
            .bounded("list_media", async {
                let rows = sqlx::query_as::<_, MediaRow>(
                    "SELECT * FROM media_data ORDER BY created_at ASC, rowid ASC",
                )
                .fetch_all(&self.pool)
                .await?;
                Ok(rows)
            })
            .await?;
        into_records(rows)
    }

    /// Administrative removal of one resource. Returns whether a row was deleted.
    pub async fn remove_media(&self, resource_id: &str) -> Result<bool> {
        require_field("resource_id", resource_id)?;
        let removed = self
            .bounded("remove_media", async {
                let result = sqlx::query("DELETE FROM media_data WHERE resource_id = ?")
                    .bind(resource_id)
                    .execute(&self.pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            })
            .await?;
        if removed {
            info!(%resource_id, "Removed media record");
        }
        Ok(removed)
    }

    /// Get ledger totals
    pub async fn get_ledger_stats(&self) -> Result<LedgerStats> {
        self.bounded("get_ledger_stats", async {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_data")
                .fetch_one(&self.pool)
                .await?;

            let users: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT user_name FROM media_data ORDER BY user_name",
            )
            .fetch_all(&self.pool)
            .await?;

            Ok(LedgerStats {
                total_records: total as usize,
                unique_users: users.len(),
                users,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::test_support::{setup_test_db, t0};
    use crate::retry::RetryPolicy;
    use std::sync::Arc;
    use std::time::Duration;

    fn candidate(resource_id: &str, user_name: &str, url: &str) -> MediaCandidate {
        MediaCandidate::new(
            format!("id-{}", user_name),
            user_name,
            resource_id,
            url,
            ResourceType::Photo,
        )
    }

    #[tokio::test]
    async fn test_reingest_updates_url() {
        let (db, _tmp) = setup_test_db().await;

        let first = db.ingest(&candidate("r1", "alice", "u1")).await.unwrap();
        let second = db.ingest(&candidate("r1", "alice", "u2")).await.unwrap();
        assert_eq!(first, IngestOutcome::Inserted);
        assert_eq!(second, IngestOutcome::Updated);

        let record = db.lookup_by_resource_id("r1").await.unwrap().unwrap();
        assert_eq!(record.resource_url, "u2");
        assert_eq!(record.user_name, "alice");
        assert_eq!(record.resource_type, ResourceType::Photo);
    }

    #[tokio::test]
    async fn test_identity_fixed_by_first_ingest() {
        let (db, _tmp) = setup_test_db().await;

        db.ingest(&candidate("r1", "alice", "u1")).await.unwrap();
        let original = db.lookup_by_resource_id("r1").await.unwrap().unwrap();
        assert_eq!(original.created_at, t0());
        assert_eq!(original.updated_at, t0());

        let mut moved = candidate("r1", "alice-renamed", "u9");
        moved.user_id = "id-new".to_string();
        moved.resource_type = ResourceType::Video;
        for _ in 0..3 {
            db.ingest(&moved).await.unwrap();
        }

        let all = db.list_media().await.unwrap();
        assert_eq!(all.len(), 1);
        let latest = &all[0];
        assert_eq!(latest.id, original.id);
        assert_eq!(latest.created_at, original.created_at);
        assert!(latest.updated_at > original.updated_at);
        assert_eq!(latest.user_id, "id-new");
        assert_eq!(latest.user_name, "alice-renamed");
        assert_eq!(latest.resource_url, "u9");
        assert_eq!(latest.resource_type, ResourceType::Video);
    }

    #[tokio::test]
    async fn test_identical_reingest_only_touches_updated_at() {
        let (db, _tmp) = setup_test_db().await;
        let c = candidate("r1", "alice", "u1");

        db.ingest(&c).await.unwrap();
        let once = db.lookup_by_resource_id("r1").await.unwrap().unwrap();
        db.ingest(&c).await.unwrap();
        let twice = db.lookup_by_resource_id("r1").await.unwrap().unwrap();

        assert_eq!(
            MediaRecord {
                updated_at: once.updated_at,
                ..twice.clone()
            },
            once
        );
        assert!(twice.updated_at > once.updated_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ingest_inserts_once() {
        let (db, _tmp) = setup_test_db().await;
        let db = Arc::new(db);
        let policy = RetryPolicy::new(5, Duration::from_millis(5), Duration::from_millis(50));

        let mut handles = Vec::new();
        for i in 0..16 {
            let db = Arc::clone(&db);
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                let c = candidate("shared", &format!("user{}", i), &format!("u{}", i));
                policy.run("ingest", || db.ingest(&c)).await
            }));
        }

        let mut inserted = 0;
        let mut updated = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                IngestOutcome::Inserted => inserted += 1,
                IngestOutcome::Updated => updated += 1,
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(updated, 15);
        assert_eq!(db.list_media().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_fields() {
        let (db, _tmp) = setup_test_db().await;

        let err = db.ingest(&candidate("", "alice", "u1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = db.ingest(&candidate("r1", " ", "u1")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = db.ingest(&candidate("r1", "alice", "")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = db
            .ingest(&candidate(&"r".repeat(256), "alice", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(db.list_media().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_user_name_in_creation_order() {
        let (db, _tmp) = setup_test_db().await;

        db.ingest(&candidate("a1", "alice", "u")).await.unwrap();
        db.ingest(&candidate("b1", "bob", "u")).await.unwrap();
        db.ingest(&candidate("a2", "alice", "u")).await.unwrap();
        db.ingest(&candidate("a3", "alice", "u")).await.unwrap();

        let alice = db.list_by_user_name("alice").await.unwrap();
        let ids: Vec<_> = alice.iter().map(|r| r.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
        assert!(alice.windows(2).all(|w| w[0].created_at < w[1].created_at));

        assert!(db.list_by_user_name("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_resource_type() {
        let (db, _tmp) = setup_test_db().await;

        db.ingest(&candidate("p1", "alice", "u")).await.unwrap();
        let mut video = candidate("v1", "alice", "u");
        video.resource_type = ResourceType::Video;
        db.ingest(&video).await.unwrap();
        let mut odd = candidate("x1", "bob", "u");
        odd.resource_type = ResourceType::Other(42);
        db.ingest(&odd).await.unwrap();

        let photos = db.list_by_resource_type(ResourceType::Photo).await.unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].resource_id, "p1");

        let odd = db.list_by_resource_type(ResourceType::Other(42)).await.unwrap();
        assert_eq!(odd.len(), 1);
        assert_eq!(odd[0].resource_type.code(), 42);
    }

    #[tokio::test]
    async fn test_lookup_missing_is_none() {
        let (db, _tmp) = setup_test_db().await;
        assert!(db.lookup_by_resource_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_and_stats() {
        let (db, _tmp) = setup_test_db().await;

        db.ingest(&candidate("a1", "alice", "u")).await.unwrap();
        db.ingest(&candidate("a2", "alice", "u")).await.unwrap();
        db.ingest(&candidate("b1", "bob", "u")).await.unwrap();

        let stats = db.get_ledger_stats().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.users, vec!["alice", "bob"]);

        assert!(db.remove_media("b1").await.unwrap());
        assert!(!db.remove_media("b1").await.unwrap());

        let stats = db.get_ledger_stats().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.users, vec!["alice"]);
    }

    #[tokio::test]
    async fn test_identity_columns_guarded_by_trigger() {
        let (db, _tmp) = setup_test_db().await;
        db.ingest(&candidate("r1", "alice", "u1")).await.unwrap();

        let result = sqlx::query("UPDATE media_data SET created_at = '1999-01-01T00:00:00.000000Z'")
            .execute(&db.pool)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_resource_type_equality_follows_code() {
        use std::collections::HashSet;

        assert_eq!(ResourceType::Other(1), ResourceType::Photo);
        assert_eq!(ResourceType::Other(8), ResourceType::Album);
        assert_ne!(ResourceType::Other(3), ResourceType::Photo);

        let kinds: HashSet<_> = [ResourceType::Photo, ResourceType::Other(1), ResourceType::Other(2)]
            .into_iter()
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(kinds.contains(&ResourceType::Video));
    }

    #[tokio::test]
    async fn test_late_reingest_never_moves_updated_at_back() {
        use crate::clock::ManualClock;

        let (db, _tmp) = setup_test_db().await;
        let clock = Arc::new(ManualClock::new(t0() + chrono::Duration::hours(1), chrono::Duration::zero()));
        let db = db.with_clock(clock.clone());

        db.ingest(&candidate("r1", "alice", "u1")).await.unwrap();
        // A writer whose timestamp was taken earlier commits last
        clock.set(t0());
        let outcome = db.ingest(&candidate("r1", "alice", "u2")).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Updated);

        let record = db.lookup_by_resource_id("r1").await.unwrap().unwrap();
        assert_eq!(record.resource_url, "u2");
        assert_eq!(record.updated_at, t0() + chrono::Duration::hours(1));
        assert_eq!(record.created_at, t0() + chrono::Duration::hours(1));
    }

    #[test]
    fn test_resource_type_codes_round_trip() {
        for code in [1, 2, 8, 0, -3, 99] {
            assert_eq!(ResourceType::from(code).code(), code);
        }
        assert_eq!("video".parse::<ResourceType>().unwrap(), ResourceType::Video);
        assert_eq!("8".parse::<ResourceType>().unwrap(), ResourceType::Album);
        assert_eq!("type-42".parse::<ResourceType>().unwrap(), ResourceType::Other(42));
        assert!("banana".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_candidate_json_defaults() {
        let c: MediaCandidate = serde_json::from_str(
            r#"{"user_id":"1","user_name":"alice","resource_id":"r1","resource_url":"u"}"#,
        )
        .unwrap();
        assert_eq!(c.resource_type, ResourceType::Photo);
        assert!(c.published_at.is_none());
    }
}
