//! Custom error types for media-ledger

use thiserror::Error;

/// Main error type for media-ledger operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or missing required field. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient connectivity loss, contention or an elapsed operation timeout.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A uniqueness conflict the store reported instead of resolving it.
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Write conflict unresolved after {attempts} attempts: {message}")]
    ConflictRetryExhausted { attempts: u32, message: String },

    #[error("Ingestion failed after {attempts} attempts: {source}")]
    IngestionFailed {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Media source error: {0}")]
    Source(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'media-ledger init' first")]
    NotInitialized,

    #[error("{failed} of {total} user passes failed")]
    PassesFailed { failed: usize, total: usize },
}

impl Error {
    /// Whether a retry of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::Conflict(_))
    }
}

// SQLite primary result codes for a held lock; extended codes keep them in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_lock_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Error::StoreUnavailable(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) if is_lock_contention(db.code().as_deref()) => {
                Error::StoreUnavailable(db.message().to_string())
            }
            _ => Error::Database(err),
        }
    }
}

/// Result type alias for media-ledger
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Database(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_lock_contention_codes() {
        assert!(is_lock_contention(Some("5")));
        assert!(is_lock_contention(Some("517")));
        assert!(is_lock_contention(Some("6")));
        assert!(!is_lock_contention(Some("2067")));
        assert!(!is_lock_contention(None));
    }

    #[test]
    fn test_validation_is_not_transient() {
        assert!(!Error::Validation("empty".to_string()).is_transient());
    }
}
