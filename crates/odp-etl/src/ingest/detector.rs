//! Change detection
//!
//! Splits the staged keys into three disjoint groups against history:
//! never seen before (`new_<dataset>`), seen with a current version that differs
//! in a tracked column (`chg_<dataset>`), and unchanged (not materialized).

use odp_common::naming::quote_ident;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::{info, instrument};

use super::dataset::DatasetSpec;
use super::tables::{change_predicate, column_list, key_join, qualified_list};
use crate::db::{count_rows, table_exists};
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub staged_keys: i64,
    pub new_keys: i64,
    pub changed_keys: i64,
    pub unchanged_keys: i64,
}

#[instrument(skip(conn, dataset), fields(dataset = %dataset.name))]
pub async fn detect_changes(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<ChangeSummary> {
    let tables = dataset.tables();
    if !table_exists(conn, &tables.staged).await? {
        return Err(IngestError::missing_input(&tables.staged, "stage"));
    }
    if !table_exists(conn, &tables.history).await? {
        return Err(IngestError::missing_input(&tables.history, "provision"));
    }

    let keys = dataset.key_columns();
    let key_cols = column_list(keys.iter().copied());
    let staged_keys = qualified_list("s", keys.iter().copied());
    let staged = quote_ident(&tables.staged);
    let history = quote_ident(&tables.history);
    let new_keys = quote_ident(&tables.new_keys);
    let changed_keys = quote_ident(&tables.changed_keys);
    let join = key_join("h", "s", keys.iter().copied());

    for table in [&new_keys, &changed_keys] {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&mut *conn)
            .await?;
    }

    // A key that ever had a version is never new again, current or not.
    sqlx::query(&format!(
        "CREATE TABLE {new_keys} AS SELECT {staged_keys} FROM {staged} s \
         WHERE NOT EXISTS (SELECT 1 FROM {history} h WHERE {join})"
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE {changed_keys} AS SELECT {staged_keys} FROM {staged} s \
         JOIN {history} h ON {join} AND h.current_flag \
         WHERE {predicate}",
        predicate = change_predicate("s", "h", dataset.tracked_columns())
    ))
    .execute(&mut *conn)
    .await?;

    for table in [&new_keys, &changed_keys] {
        sqlx::query(&format!("ALTER TABLE {} ADD PRIMARY KEY ({})", table, key_cols))
            .execute(&mut *conn)
            .await?;
    }

    let staged_count = count_rows(conn, &tables.staged).await?;
    let new_count = count_rows(conn, &tables.new_keys).await?;
    let changed_count = count_rows(conn, &tables.changed_keys).await?;

    let summary = ChangeSummary {
        staged_keys: staged_count,
        new_keys: new_count,
        changed_keys: changed_count,
        unchanged_keys: staged_count - new_count - changed_count,
    };

    info!(
        new_keys = summary.new_keys,
        changed_keys = summary.changed_keys,
        unchanged_keys = summary.unchanged_keys,
        "Change detection complete"
    );
    Ok(summary)
}
