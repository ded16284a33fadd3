//! Snapshot ingestion
//!
//! # Modules
//!
//! - **dataset**: dataset declarations and the YAML registry
//! - **tables**: per-dataset table names and SQL fragments
//! - **fetcher**: snapshot sources (CSV over HTTP/file, in-memory)
//! - **loader**, **dedup**, **stager**: staging tables for one run
//! - **history**: explicit provisioning of `history_<dataset>`
//! - **detector**, **merger**: change detection and history-preserving merge
//! - **master_index**: projection of new versions into `master_index`
//! - **lock**: per-dataset advisory lock
//! - **runs**: `ingest_runs` bookkeeping and run reports
//! - **pipeline**: the orchestrator tying the stages together

pub mod dataset;
pub mod dedup;
pub mod detector;
pub mod fetcher;
pub mod history;
pub mod loader;
pub mod lock;
pub mod master_index;
pub mod merger;
pub mod pipeline;
pub mod runs;
pub mod stager;
pub mod tables;

pub use dataset::{ColumnSpec, ColumnType, DatasetRegistry, DatasetSpec, GeometryMapping};
pub use detector::ChangeSummary;
pub use fetcher::{CsvFetcher, RowStream, SnapshotFetcher, StaticFetcher};
pub use lock::DatasetLock;
pub use pipeline::{IngestPipeline, Stage};
pub use runs::{RunCounts, RunReport, RunStatus};
