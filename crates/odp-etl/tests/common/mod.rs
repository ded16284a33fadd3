//! Common test utilities for odp-etl integration tests using testcontainers
//!
//! Each test gets its own PostgreSQL container with the workspace migrations
//! applied, plus small fixtures for building datasets and reading history back.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use odp_etl::config::IngestConfig;
use odp_etl::ingest::{
    ColumnSpec, ColumnType, DatasetSpec, GeometryMapping, IngestPipeline, StaticFetcher,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,odp_etl=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

/// PostgreSQL container options
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub version: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            version: "16-alpine".to_string(),
            max_connections: 8,
            acquire_timeout_secs: 30,
        }
    }
}

/// PostgreSQL test container with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        Self::start_with_options(PostgresOptions::default()).await
    }

    pub async fn start_with_options(options: PostgresOptions) -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag(&options.version)
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(Duration::from_secs(options.acquire_timeout_secs))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        odp_etl::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }
}

/// Database, in-memory fetcher and pipeline wired together
pub struct TestPipeline {
    pub pg: TestPostgres,
    pub fetcher: Arc<StaticFetcher>,
    pub pipeline: IngestPipeline,
}

impl TestPipeline {
    pub async fn start() -> Result<Self> {
        let config = IngestConfig {
            load_batch_size: 2,
            index_batch_size: 2,
            ..IngestConfig::default()
        };
        Self::start_with_options(PostgresOptions::default(), config).await
    }

    pub async fn start_with_options(options: PostgresOptions, config: IngestConfig) -> Result<Self> {
        let pg = TestPostgres::start_with_options(options).await?;
        let fetcher = Arc::new(StaticFetcher::new());
        let pipeline = IngestPipeline::new(pg.pool_clone(), fetcher.clone(), config);
        Ok(Self {
            pg,
            fetcher,
            pipeline,
        })
    }

    pub fn pool(&self) -> &PgPool {
        self.pg.pool()
    }
}

pub const ITEM_HEADER: &[&str] = &["ID", "A", "B", "Seen", "Lat", "Lon"];

/// `items`: text key, two tracked attributes, indexed by date and coordinates
pub fn items_dataset() -> DatasetSpec {
    DatasetSpec {
        name: "items".into(),
        human_name: None,
        source: "memory://items".into(),
        business_key: vec!["id".into()],
        columns: vec![
            ColumnSpec::new("id", ColumnType::Text),
            ColumnSpec::new("a", ColumnType::Integer),
            ColumnSpec::new("b", ColumnType::Text),
            ColumnSpec::new("seen", ColumnType::Timestamp),
            ColumnSpec::new("lat", ColumnType::Float),
            ColumnSpec::new("lon", ColumnType::Float),
        ],
        tracked: Some(vec!["a".into(), "b".into()]),
        observation_date: Some("seen".into()),
        geometry: Some(GeometryMapping::Coordinates {
            latitude: "lat".into(),
            longitude: "lon".into(),
        }),
        geotags: vec!["b".into()],
    }
}

/// One history version of an `items` key
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ItemVersion {
    pub row_id: i64,
    pub a: Option<i64>,
    pub b: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub current_flag: bool,
}

pub async fn item_versions(pool: &PgPool, id: &str) -> Vec<ItemVersion> {
    sqlx::query_as::<_, ItemVersion>(
        "SELECT row_id, a, b, start_date, end_date, current_flag \
         FROM history_items WHERE id = $1 ORDER BY start_date",
    )
    .bind(id)
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn all_versions(pool: &PgPool) -> Vec<ItemVersion> {
    sqlx::query_as::<_, ItemVersion>(
        "SELECT row_id, a, b, start_date, end_date, current_flag \
         FROM history_items ORDER BY row_id",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

pub async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(pool)
        .await
        .unwrap()
}
