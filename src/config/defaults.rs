//! Default values for configuration

/// Default per-operation store timeout (milliseconds)
pub fn default_store_op_timeout_ms() -> u64 {
    5_000
}

/// Default SQLite busy timeout (milliseconds)
pub fn default_store_busy_timeout_ms() -> u64 {
    5_000
}

/// Default pool size
pub fn default_store_max_connections() -> u32 {
    5
}

/// Default number of attempts for a transient store failure
pub fn default_retry_max_attempts() -> u32 {
    4
}

/// Default first backoff delay (milliseconds)
pub fn default_retry_initial_backoff_ms() -> u64 {
    200
}

/// Default backoff ceiling (milliseconds)
pub fn default_retry_max_backoff_ms() -> u64 {
    5_000
}

/// Users to ingest, from `MEDIA_LEDGER_USERS` (comma separated)
pub fn default_ingest_users() -> Vec<String> {
    std::env::var("MEDIA_LEDGER_USERS")
        .map(|raw| parse_user_list(&raw))
        .unwrap_or_default()
}

/// Split a comma separated user list, dropping blanks
pub fn parse_user_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fetch limit for a user that has never been processed
pub fn default_new_user_limit() -> usize {
    20
}

/// Fetch limit for a user with a checkpoint
pub fn default_existing_user_limit() -> usize {
    5
}

/// Default number of user passes run at once
pub fn default_ingest_concurrency() -> usize {
    4
}

/// Default media feed URL for the HTTP source
pub fn default_source_url() -> String {
    std::env::var("MEDIA_LEDGER_FEED_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
}

/// Default HTTP source timeout in seconds
pub fn default_source_timeout() -> u64 {
    30
}

/// Default user agent
pub fn default_source_user_agent() -> String {
    format!("media-ledger/{}", env!("CARGO_PKG_VERSION"))
}
