//! Raw table loading
//!
//! Rows are written verbatim as text into `raw_<dataset>`, numbered 1, 2, 3...
//! in stream order. The table is dropped and recreated on every run.

use futures::StreamExt;
use odp_common::naming::quote_ident;
use serde::Serialize;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::{debug, info, instrument};

use super::dataset::DatasetSpec;
use super::fetcher::{Row, RowStream};
use super::tables::column_list;
use crate::error::{IngestError, Result};

/// PostgreSQL accepts at most this many bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub rows_loaded: i64,
}

/// Rows per INSERT given the configured batch size and the column count
pub fn effective_batch_size(configured: usize, column_count: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / (column_count + 1);
    configured.min(by_params).max(1)
}

/// Recreate `raw_<dataset>` with every declared column as TEXT
pub async fn create_raw_table(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<()> {
    let raw = dataset.tables().raw;
    let columns = dataset
        .columns
        .iter()
        .map(|c| format!("{} TEXT", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(&raw)))
        .execute(&mut *conn)
        .await
        .map_err(|e| IngestError::load(&raw, e))?;

    sqlx::query(&format!(
        "CREATE TABLE {} (ingestion_id BIGINT PRIMARY KEY, {})",
        quote_ident(&raw),
        columns
    ))
    .execute(&mut *conn)
    .await
    .map_err(|e| IngestError::load(&raw, e))?;

    Ok(())
}

#[instrument(skip(conn, dataset, rows), fields(dataset = %dataset.name))]
pub async fn load_raw(
    conn: &mut PgConnection,
    dataset: &DatasetSpec,
    mut rows: RowStream,
    batch_size: usize,
) -> Result<LoadStats> {
    create_raw_table(conn, dataset).await?;

    let width = dataset.columns.len();
    let batch_size = effective_batch_size(batch_size, width);
    let mut batch: Vec<(i64, Row)> = Vec::with_capacity(batch_size);
    let mut next_id: i64 = 1;

    while let Some(row) = rows.next().await {
        let row = row?;
        if row.len() != width {
            return Err(IngestError::SourceFormat(format!(
                "{}: row {} has {} cells, expected {}",
                dataset.name,
                next_id,
                row.len(),
                width
            )));
        }

        batch.push((next_id, row));
        next_id += 1;

        if batch.len() >= batch_size {
            insert_batch(conn, dataset, &mut batch).await?;
        }
    }

    if !batch.is_empty() {
        insert_batch(conn, dataset, &mut batch).await?;
    }

    let stats = LoadStats {
        rows_loaded: next_id - 1,
    };
    info!(rows_loaded = stats.rows_loaded, "Raw snapshot loaded");
    Ok(stats)
}

async fn insert_batch(
    conn: &mut PgConnection,
    dataset: &DatasetSpec,
    batch: &mut Vec<(i64, Row)>,
) -> Result<()> {
    let raw = dataset.tables().raw;
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} (ingestion_id, {}) ",
        quote_ident(&raw),
        column_list(&dataset.columns)
    ));

    let count = batch.len();
    builder.push_values(batch.drain(..), |mut b, (id, row)| {
        b.push_bind(id);
        for cell in row {
            b.push_bind(cell);
        }
    });

    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| IngestError::load(&raw, e))?;

    debug!(rows = count, "Inserted raw batch");
    Ok(())
}
