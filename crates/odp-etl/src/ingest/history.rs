//! History table provisioning
//!
//! `history_<dataset>` is the only permanent per-dataset table. It is created
//! explicitly from the registry declaration and verified against it before a
//! merge; the pipeline never alters an existing history table.

use odp_common::naming::quote_ident;
use sqlx::PgConnection;
use std::collections::BTreeMap;
use tracing::{info, instrument};

use super::dataset::DatasetSpec;
use super::tables::{column_definitions, column_list};
use crate::db::table_exists;
use crate::error::{IngestError, Result};

/// Columns every history table carries besides the declared ones
const BOOKKEEPING_COLUMNS: &[(&str, &str)] = &[
    ("row_id", "bigint"),
    ("start_date", "timestamp with time zone"),
    ("end_date", "timestamp with time zone"),
    ("current_flag", "boolean"),
];

/// Whether any version of `dataset` has ever been merged
pub async fn has_versions(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<bool> {
    let history = dataset.tables().history;
    if !table_exists(conn, &history).await? {
        return Ok(false);
    }

    let found = sqlx::query_scalar::<_, bool>(&format!(
        "SELECT EXISTS (SELECT 1 FROM {})",
        quote_ident(&history)
    ))
    .fetch_one(&mut *conn)
    .await?;

    Ok(found)
}

/// Create the history table, its current-key index and its immutability trigger
///
/// Safe to call repeatedly. An existing table whose columns do not match the
/// declaration is reported as a configuration error, never altered.
#[instrument(skip(conn, dataset), fields(dataset = %dataset.name))]
pub async fn provision(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<()> {
    let table = dataset.tables().history;
    let history = quote_ident(&table);
    let keys = column_list(dataset.key_columns());
    let existed = table_exists(conn, &table).await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {history} (\
            row_id BIGSERIAL PRIMARY KEY, \
            {columns}, \
            start_date TIMESTAMPTZ NOT NULL, \
            end_date TIMESTAMPTZ, \
            current_flag BOOLEAN NOT NULL DEFAULT TRUE, \
            CONSTRAINT {version_key} UNIQUE ({keys}, start_date), \
            CONSTRAINT {current_check} CHECK (\
                (current_flag AND end_date IS NULL) OR (NOT current_flag AND end_date IS NOT NULL)))",
        columns = column_definitions(&dataset.columns),
        version_key = quote_ident(&format!("{}_version_key", table)),
        current_check = quote_ident(&format!("{}_current_check", table)),
    ))
    .execute(&mut *conn)
    .await?;

    verify(conn, dataset).await?;

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({}) WHERE current_flag",
        quote_ident(&format!("{}_current_key", table)),
        history,
        keys
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!(
        "CREATE OR REPLACE TRIGGER {} BEFORE UPDATE OR DELETE ON {} \
         FOR EACH ROW EXECUTE FUNCTION odp_protect_closed_versions()",
        quote_ident(&format!("{}_immutable", table)),
        history
    ))
    .execute(&mut *conn)
    .await?;

    if existed {
        info!(table = %table, "History table verified");
    } else {
        info!(table = %table, "History table created");
    }
    Ok(())
}

/// Compare the live column set of the history table with the declaration
pub async fn verify(conn: &mut PgConnection, dataset: &DatasetSpec) -> Result<()> {
    let table = dataset.tables().history;
    if !table_exists(conn, &table).await? {
        return Err(IngestError::missing_input(&table, "provision"));
    }

    let actual: BTreeMap<String, String> = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT column_name::text, data_type::text
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        "#,
    )
    .bind(&table)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    let problems = schema_differences(&expected_columns(dataset), &actual);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(IngestError::Configuration(format!(
            "{} does not match the declaration of {}: {}",
            table,
            dataset.name,
            problems.join("; ")
        )))
    }
}

fn expected_columns(dataset: &DatasetSpec) -> BTreeMap<String, String> {
    dataset
        .columns
        .iter()
        .map(|c| (c.name.clone(), c.ty.information_schema_type().to_string()))
        .chain(
            BOOKKEEPING_COLUMNS
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string())),
        )
        .collect()
}

fn schema_differences(
    expected: &BTreeMap<String, String>,
    actual: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut problems = Vec::new();
    for (name, ty) in expected {
        match actual.get(name) {
            None => problems.push(format!("column {} is missing", name)),
            Some(found) if found != ty => {
                problems.push(format!("column {} is {}, declared {}", name, found, ty))
            },
            Some(_) => {},
        }
    }
    for name in actual.keys() {
        if !expected.contains_key(name) {
            problems.push(format!("column {} is not declared", name));
        }
    }
    problems
}
