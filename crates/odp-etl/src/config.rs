//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Database Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/odp";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default dataset registry location.
pub const DEFAULT_DATASETS_FILE: &str = "datasets.yml";

/// Default HTTP timeout for a whole snapshot download (10 minutes).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 600;

/// Default number of raw rows per INSERT statement.
pub const DEFAULT_LOAD_BATCH_SIZE: usize = 1000;

/// Default number of history rows read per master index page.
pub const DEFAULT_INDEX_BATCH_SIZE: i64 = 5000;

/// Default number of datasets ingested at the same time by `run_many`.
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub datasets_file: PathBuf,
    pub fetch_timeout_secs: u64,
    pub load_batch_size: usize,
    pub index_batch_size: i64,
    pub max_concurrent_runs: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            datasets_file: PathBuf::from(DEFAULT_DATASETS_FILE),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            load_batch_size: DEFAULT_LOAD_BATCH_SIZE,
            index_batch_size: DEFAULT_INDEX_BATCH_SIZE,
            max_concurrent_runs: DEFAULT_MAX_CONCURRENT_RUNS,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            ingest: IngestConfig {
                datasets_file: std::env::var("ODP_DATASETS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATASETS_FILE)),
                fetch_timeout_secs: env_or("ODP_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS),
                load_batch_size: env_or("ODP_LOAD_BATCH_SIZE", DEFAULT_LOAD_BATCH_SIZE),
                index_batch_size: env_or("ODP_INDEX_BATCH_SIZE", DEFAULT_INDEX_BATCH_SIZE),
                max_concurrent_runs: env_or(
                    "ODP_MAX_CONCURRENT_RUNS",
                    DEFAULT_MAX_CONCURRENT_RUNS,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        self.ingest.validate()
    }
}

impl IngestConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("ODP_FETCH_TIMEOUT_SECS must be greater than 0");
        }
        if self.load_batch_size == 0 {
            anyhow::bail!("ODP_LOAD_BATCH_SIZE must be greater than 0");
        }
        if self.index_batch_size <= 0 {
            anyhow::bail!("ODP_INDEX_BATCH_SIZE must be greater than 0");
        }
        if self.max_concurrent_runs == 0 {
            anyhow::bail!("ODP_MAX_CONCURRENT_RUNS must be greater than 0");
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
