//! ODP ETL Library
//!
//! Snapshot ingestion for open tabular datasets.
//!
//! # Overview
//!
//! Each registered dataset is periodically re-read in full and folded into a
//! versioned history table:
//!
//! ```text
//! fetch → load → dedupe → stage → diff → merge → index
//! ```
//!
//! - **Staging tables** (`raw_`, `dedup_`, `stg_`, `new_`, `chg_`) are rebuilt every run
//! - **History tables** (`history_<dataset>`) keep every version of every entity,
//!   with exactly one current row per business key
//! - **Master index** (`master_index`) holds one normalized, dataset-agnostic entry
//!   per merged version for spatial and temporal lookups
//! - **Run log** (`ingest_runs`) records the outcome of every run
//!
//! # Example
//!
//! ```no_run
//! use odp_etl::{config::Config, db, ingest::{DatasetRegistry, IngestPipeline}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let registry = DatasetRegistry::from_file(&config.ingest.datasets_file)?;
//!     let pipeline = IngestPipeline::with_csv_fetcher(pool, config.ingest.clone())?;
//!
//!     for report in pipeline.run_many(registry.datasets()).await {
//!         println!("{}", serde_json::to_string(&report)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;

// Re-export commonly used types
pub use error::{ErrorKind, IngestError, Result};
