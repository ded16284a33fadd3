//! Staging
//!
//! Materializes `stg_<dataset>`: one typed row per business key, taken from the
//! winning raw row, without the ingestion id.

use odp_common::naming::quote_ident;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::{info, instrument};

use super::dataset::DatasetSpec;
use super::{history, runs};
use super::tables::{cast_expr, column_definitions, column_list};
use crate::db::{count_rows, table_exists};
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub staged_keys: i64,
}

#[instrument(skip(conn, dataset), fields(dataset = %dataset.name))]
pub async fn stage(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<StageStats> {
    let tables = dataset.tables();
    if !table_exists(conn, &tables.raw).await? {
        return Err(IngestError::missing_input(&tables.raw, "load"));
    }
    if !table_exists(conn, &tables.dedup).await? {
        return Err(IngestError::missing_input(&tables.dedup, "dedupe"));
    }

    let staged = quote_ident(&tables.staged);
    let keys = dataset.key_columns();

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", staged))
        .execute(&mut *conn)
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE {} ({}, PRIMARY KEY ({}))",
        staged,
        column_definitions(&dataset.columns),
        column_list(keys.iter().copied())
    ))
    .execute(&mut *conn)
    .await?;

    let select = dataset
        .columns
        .iter()
        .map(|c| {
            if dataset.is_key_column(&c.name) {
                format!("d.{}", quote_ident(&c.name))
            } else {
                cast_expr("r", c)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let typed_raw_keys = keys
        .iter()
        .map(|k| format!("d.{} = {}", quote_ident(&k.name), cast_expr("r", k)))
        .collect::<Vec<_>>()
        .join(" AND ");

    sqlx::query(&format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} r JOIN {} d \
         ON d.ingestion_id = r.ingestion_id AND {}",
        staged,
        column_list(&dataset.columns),
        select,
        quote_ident(&tables.raw),
        quote_ident(&tables.dedup),
        typed_raw_keys
    ))
    .execute(&mut *conn)
    .await?;

    let staged_keys = count_rows(conn, &tables.staged).await?;

    if staged_keys == 0 && !previously_ingested(conn, dataset).await? {
        return Err(IngestError::Stage(format!(
            "{}: snapshot staged zero rows and the dataset has never been ingested successfully",
            dataset.name
        )));
    }

    info!(staged_keys, "Staging complete");
    Ok(StageStats { staged_keys })
}

/// A merged version counts even when its run never got recorded as `ok`
async fn previously_ingested(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<bool> {
    if runs::has_successful_run(&mut *conn, &dataset.name).await? {
        return Ok(true);
    }
    history::has_versions(conn, dataset).await
}
