//! SQLite schema definition

/// SQL schema for the ledger database.
///
/// Timestamps are fixed-width RFC 3339 text at microsecond precision
/// (`YYYY-MM-DDTHH:MM:SS.ffffffZ`), so text ordering is chronological and
/// `MAX()` picks the latest instant.
pub const SCHEMA_SQL: &str = r#"
-- Media resources, one row per external resource_id
CREATE TABLE IF NOT EXISTS media_data (
    id TEXT PRIMARY KEY CHECK (length(id) = 36),
    user_id TEXT NOT NULL,
    user_name TEXT NOT NULL,
    resource_id TEXT NOT NULL UNIQUE,
    resource_url TEXT NOT NULL,
    resource_type INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000Z', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000Z', 'now'))
);

-- Per-user processing watermark
CREATE TABLE IF NOT EXISTS processed_users (
    user_name TEXT PRIMARY KEY,
    processed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000Z', 'now'))
);

-- Indexes for the per-user and per-type access patterns
CREATE INDEX IF NOT EXISTS idx_media_data_user_name ON media_data(user_name);
CREATE INDEX IF NOT EXISTS idx_media_data_resource_type ON media_data(resource_type);

-- Identity columns never change once written
CREATE TRIGGER IF NOT EXISTS media_data_identity_immutable
BEFORE UPDATE OF id, resource_id, created_at ON media_data
WHEN NEW.id IS NOT OLD.id
    OR NEW.resource_id IS NOT OLD.resource_id
    OR NEW.created_at IS NOT OLD.created_at
BEGIN
    SELECT RAISE(ABORT, 'media_data identity columns are immutable');
END;

-- A checkpoint never moves backwards, whatever statement tries it
CREATE TRIGGER IF NOT EXISTS processed_users_monotonic
BEFORE UPDATE OF processed_at ON processed_users
WHEN NEW.processed_at < OLD.processed_at
BEGIN
    SELECT RAISE(IGNORE);
END;
"#;
