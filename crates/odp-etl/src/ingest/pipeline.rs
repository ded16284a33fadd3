//! Ingestion pipeline
//!
//! Runs the stages for one dataset in order on one locked connection:
//!
//! 1. verify (or create) the history table
//! 2. fetch + load the raw snapshot
//! 3. deduplicate
//! 4. stage
//! 5. detect changes
//! 6. merge into history and index the new versions, in one transaction
//!
//! Stages 1 to 5 only touch disposable staging tables, so any failure before
//! step 6 leaves history and the master index exactly as they were.

use chrono::{DateTime, SubsecRound, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgConnection, PgPool};
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

use super::dataset::DatasetSpec;
use super::fetcher::{CsvFetcher, SnapshotFetcher};
use super::lock::DatasetLock;
use super::runs::{self, RunCounts, RunReport, RunStatus};
use super::{dedup, detector, history, loader, master_index, merger, stager};
use crate::config::IngestConfig;
use crate::db::table_exists;
use crate::error::{IngestError, Result};

/// First stage a run executes; earlier stages' tables are reused as they are
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Dedupe,
    Stage,
    Detect,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Dedupe => "dedupe",
            Stage::Stage => "stage",
            Stage::Detect => "detect",
        }
    }
}

struct RunContext {
    run_id: Uuid,
    counts: RunCounts,
    run_timestamp: Option<DateTime<Utc>>,
    logged: bool,
}

pub struct IngestPipeline {
    pool: PgPool,
    fetcher: Arc<dyn SnapshotFetcher>,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(pool: PgPool, fetcher: Arc<dyn SnapshotFetcher>, config: IngestConfig) -> Self {
        Self {
            pool,
            fetcher,
            config,
        }
    }

    /// Pipeline reading CSV snapshots over HTTP or from disk
    pub fn with_csv_fetcher(pool: PgPool, config: IngestConfig) -> Result<Self> {
        let fetcher = CsvFetcher::new(config.fetch_timeout())?;
        Ok(Self::new(pool, Arc::new(fetcher), config))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Ingest the current snapshot of `dataset`
    ///
    /// Never returns an error: every failure is folded into the report.
    pub async fn run(&self, dataset: &DatasetSpec) -> RunReport {
        self.execute(dataset, Stage::Fetch).await
    }

    /// Finish a run from tables left by an earlier attempt, starting at `from`
    pub async fn rederive(&self, dataset: &DatasetSpec, from: Stage) -> RunReport {
        self.execute(dataset, from).await
    }

    /// Run several datasets, at most `max_concurrent_runs` at a time
    pub async fn run_many(&self, datasets: &[DatasetSpec]) -> Vec<RunReport> {
        stream::iter(datasets)
            .map(|dataset| self.run(dataset))
            .buffer_unordered(self.config.max_concurrent_runs)
            .collect()
            .await
    }

    /// Create or verify the history table of `dataset`
    pub async fn provision(&self, dataset: &DatasetSpec) -> Result<()> {
        dataset.validate()?;
        let mut lock = DatasetLock::acquire(&self.pool, &dataset.name).await?;
        let result = history::provision(lock.conn(), dataset).await;
        release(lock).await;
        result
    }

    /// Drop the disposable staging tables of `dataset`; returns the dropped names
    #[instrument(skip(self, dataset), fields(dataset = %dataset.name))]
    pub async fn reset(&self, dataset: &DatasetSpec) -> Result<Vec<String>> {
        dataset.validate()?;
        let mut lock = DatasetLock::acquire(&self.pool, &dataset.name).await?;
        let result = drop_staging(lock.conn(), dataset).await;
        release(lock).await;

        if let Ok(dropped) = &result {
            info!(tables = ?dropped, "Staging tables dropped");
        }
        result
    }

    async fn execute(&self, dataset: &DatasetSpec, from: Stage) -> RunReport {
        let started_at = Utc::now();
        let mut ctx = RunContext {
            run_id: Uuid::new_v4(),
            counts: RunCounts::default(),
            run_timestamp: None,
            logged: false,
        };

        let span = tracing::info_span!("ingest", dataset = %dataset.name, run_id = %ctx.run_id);
        let outcome = self
            .execute_locked(dataset, from, &mut ctx)
            .instrument(span)
            .await;

        let (status, message, error_kind) = match &outcome {
            Ok(()) => (
                RunStatus::Ok,
                format!(
                    "{} new, {} changed, {} unchanged",
                    ctx.counts.new_keys, ctx.counts.changed_keys, ctx.counts.unchanged_keys
                ),
                None,
            ),
            Err(err) => (RunStatus::Error, err.to_string(), Some(err.kind())),
        };

        let report = RunReport {
            run_id: ctx.run_id,
            dataset: dataset.name.clone(),
            status,
            message,
            error_kind,
            run_timestamp: ctx.run_timestamp,
            started_at,
            finished_at: Utc::now(),
            counts: ctx.counts,
        };

        match &outcome {
            Ok(()) => info!(
                dataset = %report.dataset,
                run_id = %report.run_id,
                new_keys = report.counts.new_keys,
                changed_keys = report.counts.changed_keys,
                unchanged_keys = report.counts.unchanged_keys,
                "Ingestion run succeeded"
            ),
            Err(err) => error!(
                dataset = %report.dataset,
                run_id = %report.run_id,
                error_kind = %err.kind(),
                error = %err,
                "Ingestion run failed"
            ),
        }

        if ctx.logged {
            if let Err(err) = runs::finish_run(&self.pool, &report).await {
                warn!(run_id = %report.run_id, error = %err, "Failed to record run outcome");
            }
        }

        report
    }

    async fn execute_locked(
        &self,
        dataset: &DatasetSpec,
        from: Stage,
        ctx: &mut RunContext,
    ) -> Result<()> {
        dataset.validate()?;

        let mut lock = DatasetLock::acquire(&self.pool, &dataset.name).await?;
        if let Err(err) = self.log_start(lock.conn(), dataset, ctx).await {
            release(lock).await;
            return Err(err);
        }

        let result = self.run_stages(lock.conn(), dataset, from, ctx).await;
        release(lock).await;
        result
    }

    /// Record the run on the locked connection, closing out any orphaned earlier run
    async fn log_start(
        &self,
        conn: &mut PgConnection,
        dataset: &DatasetSpec,
        ctx: &mut RunContext,
    ) -> Result<()> {
        let abandoned = runs::abandon_stale_runs(&mut *conn, &dataset.name).await?;
        if abandoned > 0 {
            warn!(abandoned, "Marked interrupted runs as failed");
        }
        runs::start_run(&mut *conn, ctx.run_id, &dataset.name).await?;
        ctx.logged = true;
        Ok(())
    }

    async fn run_stages(
        &self,
        conn: &mut PgConnection,
        dataset: &DatasetSpec,
        from: Stage,
        ctx: &mut RunContext,
    ) -> Result<()> {
        info!(from = from.as_str(), "Step 1/6: Verifying history table");
        history::provision(conn, dataset).await?;

        if from <= Stage::Fetch {
            info!("Step 2/6: Fetching and loading snapshot");
            let rows = self.fetcher.fetch(dataset).await?;
            let load = loader::load_raw(conn, dataset, rows, self.config.load_batch_size).await?;
            ctx.counts.rows_loaded = load.rows_loaded;
        } else {
            let raw = dataset.tables().raw;
            if table_exists(conn, &raw).await? {
                ctx.counts.rows_loaded = crate::db::count_rows(conn, &raw).await?;
            }
        }

        if from <= Stage::Dedupe {
            info!("Step 3/6: Deduplicating");
            let dedup = dedup::deduplicate(conn, dataset).await?;
            ctx.counts.duplicates_discarded = dedup.duplicates_discarded;
            ctx.counts.rows_missing_key = dedup.rows_missing_key;
        }

        if from <= Stage::Stage {
            info!("Step 4/6: Staging");
            stager::stage(conn, dataset).await?;
        }

        info!("Step 5/6: Detecting changes");
        let summary = detector::detect_changes(conn, dataset).await?;
        ctx.counts.staged_keys = summary.staged_keys;
        ctx.counts.new_keys = summary.new_keys;
        ctx.counts.changed_keys = summary.changed_keys;
        ctx.counts.unchanged_keys = summary.unchanged_keys;

        info!("Step 6/6: Merging history and indexing new versions");
        let run_timestamp = Utc::now().trunc_subsecs(6);
        ctx.run_timestamp = Some(run_timestamp);

        let mut tx = conn.begin().await?;
        merger::merge(&mut tx, dataset, run_timestamp, &summary).await?;
        let indexed =
            master_index::index_run(&mut tx, dataset, run_timestamp, self.config.index_batch_size)
                .await?;
        tx.commit()
            .await
            .map_err(|e| merger::classify_merge_error(&dataset.name, e))?;
        ctx.counts.index_entries = indexed;

        Ok(())
    }
}

async fn release(lock: DatasetLock) {
    if let Err(err) = lock.release().await {
        warn!(error = %err, "Failed to release dataset lock; its connection will be closed");
    }
}

async fn drop_staging(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<Vec<String>> {
    let tables = dataset.tables();
    let mut dropped = Vec::new();
    for table in tables.staging() {
        if table_exists(conn, table).await? {
            sqlx::query(&format!(
                "DROP TABLE {}",
                odp_common::naming::quote_ident(table)
            ))
            .execute(&mut *conn)
            .await?;
            dropped.push(table.to_string());
        }
    }
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Fetch < Stage::Dedupe);
        assert!(Stage::Dedupe < Stage::Stage);
        assert!(Stage::Stage < Stage::Detect);
    }

    #[test]
    fn test_stage_serde_names() {
        let stage: Stage = serde_json::from_str("\"dedupe\"").unwrap();
        assert_eq!(stage, Stage::Dedupe);
        assert_eq!(Stage::Detect.as_str(), "detect");
    }
}
