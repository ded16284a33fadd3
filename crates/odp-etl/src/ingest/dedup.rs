//! Deduplication
//!
//! Picks one winning raw row per business key: the highest ingestion id, i.e. the
//! row that came last in the snapshot. Conflicting earlier rows are discarded.

use odp_common::naming::quote_ident;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};

use super::dataset::DatasetSpec;
use super::tables::{cast_expr, column_list};
use crate::db::{count_rows, table_exists};
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub distinct_keys: i64,
    pub duplicates_discarded: i64,
    /// Rows whose typed business key has a NULL part
    pub rows_missing_key: i64,
}

/// Build `dedup_<dataset>` from `raw_<dataset>`
#[instrument(skip(conn, dataset), fields(dataset = %dataset.name))]
pub async fn deduplicate(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<DedupStats> {
    let tables = dataset.tables();
    if !table_exists(conn, &tables.raw).await? {
        return Err(IngestError::missing_input(&tables.raw, "load"));
    }

    let keys = dataset.key_columns();
    let key_exprs: Vec<String> = keys.iter().map(|k| cast_expr("r", k)).collect();
    let select_keys = key_exprs
        .iter()
        .zip(&keys)
        .map(|(expr, k)| format!("{} AS {}", expr, quote_ident(&k.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let key_present = key_exprs
        .iter()
        .map(|expr| format!("{} IS NOT NULL", expr))
        .collect::<Vec<_>>()
        .join(" AND ");
    let group_by = (1..=keys.len())
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let dedup = quote_ident(&tables.dedup);
    let raw = quote_ident(&tables.raw);

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", dedup))
        .execute(&mut *conn)
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE {dedup} AS \
         SELECT {select_keys}, MAX(r.ingestion_id) AS ingestion_id \
         FROM {raw} r WHERE {key_present} GROUP BY {group_by}"
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "ALTER TABLE {} ADD PRIMARY KEY (ingestion_id), ADD UNIQUE ({})",
        dedup,
        column_list(keys.iter().copied())
    ))
    .execute(&mut *conn)
    .await?;

    let total = count_rows(conn, &tables.raw).await?;
    let distinct_keys = count_rows(conn, &tables.dedup).await?;
    let rows_missing_key = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {raw} r WHERE NOT ({key_present})"
    ))
    .fetch_one(&mut *conn)
    .await?;

    let stats = DedupStats {
        distinct_keys,
        duplicates_discarded: total - rows_missing_key - distinct_keys,
        rows_missing_key,
    };

    if stats.duplicates_discarded > 0 {
        warn!(
            duplicates_discarded = stats.duplicates_discarded,
            "Duplicate business keys in snapshot; kept the last row for each key"
        );
    }
    if stats.rows_missing_key > 0 {
        warn!(
            rows_missing_key = stats.rows_missing_key,
            "Rows without a usable business key were skipped"
        );
    }
    info!(distinct_keys = stats.distinct_keys, "Deduplication complete");

    Ok(stats)
}
