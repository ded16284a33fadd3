//! Run log
//!
//! Every run that gets past lock acquisition leaves one row in `ingest_runs`.
//! The log is bookkeeping for operators and for the stager's "has this dataset
//! ever been ingested" check; it never feeds history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, PgPool, Postgres};
use uuid::Uuid;

use crate::error::{ErrorKind, Result};

pub const STALE_RUN_MESSAGE: &str = "run ended without recording an outcome";

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

/// Counters accumulated across the stages of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub rows_loaded: i64,
    pub duplicates_discarded: i64,
    pub rows_missing_key: i64,
    pub staged_keys: i64,
    pub new_keys: i64,
    pub changed_keys: i64,
    pub unchanged_keys: i64,
    pub index_entries: i64,
}

/// Terminal outcome of one run, handed back to whoever triggered it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub dataset: String,
    pub status: RunStatus,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
    pub run_timestamp: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: RunCounts,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }
}

/// A row of `ingest_runs`
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub dataset_name: String,
    pub status: String,
    pub run_timestamp: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub new_keys: i64,
    pub changed_keys: i64,
    pub unchanged_keys: i64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

/// Log a new run as `running`; callers hold the dataset lock and pass its connection
pub async fn start_run<'e, E>(executor: E, run_id: Uuid, dataset: &str) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO ingest_runs (id, dataset_name, status, started_at)
        VALUES ($1, $2, $3, NOW())
        "#,
    )
    .bind(run_id)
    .bind(dataset)
    .bind(RunStatus::Running.as_str())
    .execute(executor)
    .await?;

    Ok(())
}

/// Close out `running` rows left by runs that died before recording an outcome
///
/// Only valid under the dataset lock: no live run of `dataset` can exist then.
pub async fn abandon_stale_runs<'e, E>(executor: E, dataset: &str) -> Result<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE ingest_runs
        SET status = $2, finished_at = NOW(), error_message = $4
        WHERE dataset_name = $1 AND status = $3
        "#,
    )
    .bind(dataset)
    .bind(RunStatus::Error.as_str())
    .bind(RunStatus::Running.as_str())
    .bind(STALE_RUN_MESSAGE)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Record the terminal state of a run from its report
pub async fn finish_run(pool: &PgPool, report: &RunReport) -> Result<()> {
    let c = &report.counts;
    sqlx::query(
        r#"
        UPDATE ingest_runs
        SET status = $2, run_timestamp = $3, finished_at = $4,
            rows_loaded = $5, duplicates_discarded = $6, rows_missing_key = $7,
            staged_keys = $8, new_keys = $9, changed_keys = $10, unchanged_keys = $11,
            index_entries = $12, error_kind = $13, error_message = $14
        WHERE id = $1
        "#,
    )
    .bind(report.run_id)
    .bind(report.status.as_str())
    .bind(report.run_timestamp)
    .bind(report.finished_at)
    .bind(c.rows_loaded)
    .bind(c.duplicates_discarded)
    .bind(c.rows_missing_key)
    .bind(c.staged_keys)
    .bind(c.new_keys)
    .bind(c.changed_keys)
    .bind(c.unchanged_keys)
    .bind(c.index_entries)
    .bind(report.error_kind.map(|k| k.as_str()))
    .bind(report.error_kind.map(|_| report.message.as_str()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn has_successful_run<'e, E>(executor: E, dataset: &str) -> Result<bool>
where
    E: Executor<'e, Database = Postgres>,
{
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM ingest_runs WHERE dataset_name = $1 AND status = $2)",
    )
    .bind(dataset)
    .bind(RunStatus::Ok.as_str())
    .fetch_one(executor)
    .await?;

    Ok(found)
}

/// Most recent run of every dataset that has one
pub async fn latest_runs(pool: &PgPool) -> Result<Vec<RunRecord>> {
    let records = sqlx::query_as::<_, RunRecord>(
        r#"
        SELECT DISTINCT ON (dataset_name)
            id, dataset_name, status, run_timestamp, started_at, finished_at,
            new_keys, changed_keys, unchanged_keys, error_kind, error_message
        FROM ingest_runs
        ORDER BY dataset_name, started_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(records)
}
