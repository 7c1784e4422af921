//! Configuration management for media-ledger
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store connection and timeout settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Backoff for transient store failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Ingestion pass settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Media feed settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on a single store call; elapsing counts as the store being unavailable
    #[serde(default = "default_store_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// How long SQLite waits on a held write lock before reporting BUSY
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Connection pool size
    #[serde(default = "default_store_max_connections")]
    pub max_connections: u32,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_retry_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// User names processed by `ingest` when none are given on the command line
    #[serde(default = "default_ingest_users")]
    pub users: Vec<String>,

    /// Resources fetched for a user without a checkpoint
    #[serde(default = "default_new_user_limit")]
    pub new_user_limit: usize,

    /// Resources fetched for a user with a checkpoint
    #[serde(default = "default_existing_user_limit")]
    pub existing_user_limit: usize,

    /// Maximum user passes in flight
    #[serde(default = "default_ingest_concurrency")]
    pub concurrency: usize,
}

/// Media source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// JSON export on disk
    #[default]
    File,
    /// HTTP media feed
    Http,
}

/// Media source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// JSON export path (file source). Relative paths resolve against the config directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Feed base URL (http source)
    #[serde(default = "default_source_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_source_user_agent")]
    pub user_agent: String,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for media-ledger data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: default_store_op_timeout_ms(),
            busy_timeout_ms: default_store_busy_timeout_ms(),
            max_connections: default_store_max_connections(),
        }
    }
}

impl StoreConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            initial_backoff_ms: default_retry_initial_backoff_ms(),
            max_backoff_ms: default_retry_max_backoff_ms(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            users: default_ingest_users(),
            new_user_limit: default_new_user_limit(),
            existing_user_limit: default_existing_user_limit(),
            concurrency: default_ingest_concurrency(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            path: None,
            url: default_source_url(),
            timeout_secs: default_source_timeout(),
            user_agent: default_source_user_agent(),
        }
    }
}

impl Config {
    /// Get the default base directory for media-ledger (~/.media-ledger)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".media-ledger")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("ledger.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("ledger.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Resolve a `--config` argument to `(base_dir, config_file)`.
    ///
    /// A `.toml` path names the file itself; any other path names its directory.
    pub fn resolve_location(path: Option<&Path>) -> (PathBuf, PathBuf) {
        match path {
            Some(file) if file.extension().is_some_and(|e| e == "toml") => {
                let base = file
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("."));
                (base, file.to_path_buf())
            }
            Some(dir) => (dir.to_path_buf(), dir.join("config.toml")),
            None => (Self::default_base_dir(), Self::default_config_path()),
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if media-ledger is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Resolve the file source path against the config directory
    pub fn source_path(&self) -> Option<PathBuf> {
        self.source.path.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.paths.base_dir.join(p)
            }
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.store.op_timeout_ms == 0 {
            return Err(Error::Config(
                "store.op_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(Error::Config(
                "store.max_connections must be > 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be >= 1".to_string(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::Config(
                "retry.initial_backoff_ms must be <= retry.max_backoff_ms".to_string(),
            ));
        }

        if self.ingest.new_user_limit == 0 || self.ingest.existing_user_limit == 0 {
            return Err(Error::Config(
                "ingest.new_user_limit and ingest.existing_user_limit must be > 0".to_string(),
            ));
        }

        if self.ingest.concurrency == 0 {
            return Err(Error::Config(
                "ingest.concurrency must be > 0".to_string(),
            ));
        }

        if self.source.kind == SourceKind::Http && self.source.timeout_secs == 0 {
            return Err(Error::Config(
                "source.timeout_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingest.new_user_limit, 20);
        assert_eq!(config.ingest.existing_user_limit, 5);
        assert_eq!(config.source.kind, SourceKind::File);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.ingest.users = vec!["alice".to_string(), "bob".to_string()];
        config.source.kind = SourceKind::Http;
        config.source.url = "http://feed.local".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(loaded.ingest.users, vec!["alice", "bob"]);
        assert_eq!(loaded.source.kind, SourceKind::Http);
        assert_eq!(loaded.source.url, "http://feed.local");
        assert_eq!(loaded.paths.db_file, tmp.path().join("ledger.db"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [ingest]
            users = ["carol"]
            "#,
        )
        .unwrap();
        assert_eq!(config.ingest.users, vec!["carol"]);
        assert_eq!(config.ingest.concurrency, default_ingest_concurrency());
        assert_eq!(config.store.op_timeout_ms, default_store_op_timeout_ms());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = 3;
        assert!(config.validate().is_ok());

        config.retry.initial_backoff_ms = config.retry.max_backoff_ms + 1;
        assert!(config.validate().is_err());
        config.retry.initial_backoff_ms = 10;

        config.store.op_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.store.op_timeout_ms = 100;

        config.ingest.existing_user_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_location_dir_and_file() {
        let tmp = TempDir::new().unwrap();

        let (base, file) = Config::resolve_location(Some(tmp.path()));
        assert_eq!(base, tmp.path());
        assert_eq!(file, tmp.path().join("config.toml"));

        let custom = tmp.path().join("ledger.toml");
        let (base, file) = Config::resolve_location(Some(&custom));
        assert_eq!(base, tmp.path());
        assert_eq!(file, custom);

        let (base, _) = Config::resolve_location(Some(Path::new("local.toml")));
        assert_eq!(base, PathBuf::from("."));
    }

    #[test]
    fn test_initialized_needs_config_and_db() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.save().unwrap();
        assert!(!config.is_initialized());

        std::fs::write(&config.paths.db_file, b"").unwrap();
        assert!(config.is_initialized());
    }

    #[test]
    fn test_parse_user_list() {
        assert_eq!(parse_user_list("alice, bob,,carol "), vec!["alice", "bob", "carol"]);
        assert!(parse_user_list(" , ").is_empty());
    }

    #[test]
    fn test_source_path_resolves_relative_to_base() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.source.path = Some(PathBuf::from("media_data.json"));
        assert_eq!(config.source_path(), Some(tmp.path().join("media_data.json")));
    }
}
