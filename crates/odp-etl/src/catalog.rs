//! Read-only catalog queries
//!
//! Coarse metadata for collaborators that list what has been ingested.

use chrono::{DateTime, NaiveDateTime, Utc};
use odp_common::naming::{humanize, quote_ident};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::db::table_exists;
use crate::error::Result;
use crate::ingest::DatasetSpec;

/// A dataset present in the master index
#[derive(Debug, Clone, Serialize)]
pub struct IndexedDataset {
    pub machine_name: String,
    pub human_name: String,
    pub entries: i64,
    pub obs_from: Option<NaiveDateTime>,
    pub obs_to: Option<NaiveDateTime>,
}

#[derive(FromRow)]
struct IndexedRow {
    dataset_name: String,
    entries: i64,
    obs_from: Option<NaiveDateTime>,
    obs_to: Option<NaiveDateTime>,
}

/// Size of one dataset's history
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct HistoryStats {
    pub current_rows: i64,
    pub total_versions: i64,
    pub last_version_at: Option<DateTime<Utc>>,
}

/// Distinct datasets in the master index with their observed date range
pub async fn indexed_datasets(pool: &PgPool) -> Result<Vec<IndexedDataset>> {
    let rows = sqlx::query_as::<_, IndexedRow>(
        r#"
        SELECT dataset_name::text AS dataset_name,
               COUNT(*) AS entries,
               MIN(obs_date) AS obs_from,
               MAX(obs_date) AS obs_to
        FROM master_index
        GROUP BY dataset_name
        ORDER BY dataset_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| IndexedDataset {
            human_name: humanize(&row.dataset_name),
            machine_name: row.dataset_name,
            entries: row.entries,
            obs_from: row.obs_from,
            obs_to: row.obs_to,
        })
        .collect())
}

/// History size of `dataset`, or `None` before it has been provisioned
pub async fn history_stats(pool: &PgPool, dataset: &DatasetSpec) -> Result<Option<HistoryStats>> {
    let table = dataset.tables().history;
    let mut conn = pool.acquire().await?;
    if !table_exists(&mut conn, &table).await? {
        return Ok(None);
    }

    let stats = sqlx::query_as::<_, HistoryStats>(&format!(
        "SELECT COUNT(*) FILTER (WHERE current_flag) AS current_rows, \
                COUNT(*) AS total_versions, \
                MAX(start_date) AS last_version_at \
         FROM {}",
        quote_ident(&table)
    ))
    .fetch_one(&mut *conn)
    .await?;

    Ok(Some(stats))
}
