//! History merge
//!
//! Runs inside the caller's transaction. New keys get their first version;
//! changed keys have their current version closed and a new one opened, all
//! stamped with the same run timestamp. Any sign that a touched key would not
//! end with exactly one current version aborts the merge.

use chrono::{DateTime, Utc};
use odp_common::naming::quote_ident;
use serde::Serialize;
use sqlx::PgConnection;
use tracing::{info, instrument};

use super::dataset::DatasetSpec;
use super::detector::ChangeSummary;
use super::tables::{column_list, key_join, qualified_list};
use crate::error::{IngestError, Result};

/// SQLSTATEs that mean history itself refused the write
const CONFLICT_SQLSTATES: &[&str] = &[
    "23505", // unique_violation: second current row or duplicate version
    "23514", // check_violation: current_flag/end_date mismatch
    "P0001", // raise_exception: closed version modified
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub closed: i64,
    pub inserted: i64,
}

/// Translate a storage error raised while writing history
pub fn classify_merge_error(dataset: &str, err: sqlx::Error) -> IngestError {
    if let sqlx::Error::Database(db) = &err {
        if db
            .code()
            .is_some_and(|code| CONFLICT_SQLSTATES.contains(&&*code))
        {
            return IngestError::MergeConflict(format!(
                "{}: history rejected the write: {}",
                dataset,
                db.message()
            ));
        }
    }
    IngestError::Database(err)
}

#[instrument(skip(tx, dataset, run_timestamp, summary), fields(dataset = %dataset.name, run_timestamp = %run_timestamp))]
pub async fn merge(
    tx: &mut PgConnection,
    dataset: &DatasetSpec,
    run_timestamp: DateTime<Utc>,
    summary: &ChangeSummary,
) -> Result<MergeStats> {
    let tables = dataset.tables();
    let history = quote_ident(&tables.history);
    let staged = quote_ident(&tables.staged);
    let new_keys = quote_ident(&tables.new_keys);
    let changed_keys = quote_ident(&tables.changed_keys);
    let keys = dataset.key_columns();
    let conflict = |msg: String| IngestError::MergeConflict(format!("{}: {}", dataset.name, msg));

    let latest: Option<DateTime<Utc>> =
        sqlx::query_scalar(&format!("SELECT MAX(start_date) FROM {}", history))
            .fetch_one(&mut *tx)
            .await?;
    if let Some(latest) = latest {
        if latest >= run_timestamp {
            return Err(conflict(format!(
                "run timestamp {} is not after the latest version at {}",
                run_timestamp, latest
            )));
        }
    }

    let closed = sqlx::query(&format!(
        "UPDATE {history} h SET end_date = $1, current_flag = FALSE \
         FROM {changed_keys} c WHERE {join} AND h.current_flag",
        join = key_join("h", "c", keys.iter().copied())
    ))
    .bind(run_timestamp)
    .execute(&mut *tx)
    .await
    .map_err(|e| classify_merge_error(&dataset.name, e))?
    .rows_affected() as i64;

    if closed != summary.changed_keys {
        return Err(conflict(format!(
            "closed {} current versions, expected {}",
            closed, summary.changed_keys
        )));
    }

    let columns = column_list(&dataset.columns);
    let inserted = sqlx::query(&format!(
        "INSERT INTO {history} ({columns}, start_date, end_date, current_flag) \
         SELECT {staged_columns}, $1, NULL, TRUE FROM {staged} s \
         WHERE EXISTS (SELECT 1 FROM {new_keys} n WHERE {new_join}) \
            OR EXISTS (SELECT 1 FROM {changed_keys} c WHERE {changed_join}) \
         ORDER BY {order}",
        staged_columns = qualified_list("s", &dataset.columns),
        new_join = key_join("n", "s", keys.iter().copied()),
        changed_join = key_join("c", "s", keys.iter().copied()),
        order = qualified_list("s", keys.iter().copied()),
    ))
    .bind(run_timestamp)
    .execute(&mut *tx)
    .await
    .map_err(|e| classify_merge_error(&dataset.name, e))?
    .rows_affected() as i64;

    let expected = summary.new_keys + summary.changed_keys;
    if inserted != expected {
        return Err(conflict(format!(
            "inserted {} versions, expected {}",
            inserted, expected
        )));
    }

    let key_cols = column_list(keys.iter().copied());
    let broken: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM (\
            SELECT {touched_keys} FROM (\
                SELECT {key_cols} FROM {new_keys} UNION ALL SELECT {key_cols} FROM {changed_keys}\
            ) t LEFT JOIN {history} h ON {join} AND h.current_flag \
            GROUP BY {touched_keys} HAVING COUNT(h.row_id) <> 1\
         ) broken",
        touched_keys = qualified_list("t", keys.iter().copied()),
        join = key_join("h", "t", keys.iter().copied()),
    ))
    .fetch_one(&mut *tx)
    .await?;

    if broken > 0 {
        return Err(conflict(format!(
            "{} touched keys would not have exactly one current version",
            broken
        )));
    }

    let stats = MergeStats { closed, inserted };
    info!(closed = stats.closed, inserted = stats.inserted, "History merged");
    Ok(stats)
}
