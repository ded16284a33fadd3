//! Table names and SQL fragments derived from a dataset declaration
//!
//! All identifiers come from a validated [`DatasetSpec`](super::DatasetSpec) and are
//! still quoted when spliced into statements.

use super::dataset::ColumnSpec;
use odp_common::naming::quote_ident;

/// Names of the tables owned by one dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetTables {
    pub raw: String,
    pub dedup: String,
    pub staged: String,
    pub new_keys: String,
    pub changed_keys: String,
    pub history: String,
}

impl DatasetTables {
    pub fn new(dataset: &str) -> Self {
        Self {
            raw: format!("raw_{}", dataset),
            dedup: format!("dedup_{}", dataset),
            staged: format!("stg_{}", dataset),
            new_keys: format!("new_{}", dataset),
            changed_keys: format!("chg_{}", dataset),
            history: format!("history_{}", dataset),
        }
    }

    /// Run-scoped tables, safe to drop at any time
    pub fn staging(&self) -> [&str; 5] {
        [
            &self.raw,
            &self.dedup,
            &self.staged,
            &self.new_keys,
            &self.changed_keys,
        ]
    }
}

/// `"a", "b"`
pub fn column_list<'a>(columns: impl IntoIterator<Item = &'a ColumnSpec>) -> String {
    columns
        .into_iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `alias."a", alias."b"`
pub fn qualified_list<'a>(alias: &str, columns: impl IntoIterator<Item = &'a ColumnSpec>) -> String {
    columns
        .into_iter()
        .map(|c| format!("{}.{}", alias, quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"a" BIGINT, "b" TEXT`
pub fn column_definitions<'a>(columns: impl IntoIterator<Item = &'a ColumnSpec>) -> String {
    columns
        .into_iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.ty.sql_type()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convert a raw text column to its declared type
pub fn cast_expr(alias: &str, column: &ColumnSpec) -> String {
    let source = format!("{}.{}", alias, quote_ident(&column.name));
    match column.ty.cast_function() {
        Some(function) => format!("{}({})", function, source),
        None => source,
    }
}

/// `l."a" = r."a" AND l."b" = r."b"`
pub fn key_join<'a>(
    left: &str,
    right: &str,
    keys: impl IntoIterator<Item = &'a ColumnSpec>,
) -> String {
    keys.into_iter()
        .map(|k| {
            let name = quote_ident(&k.name);
            format!("{}.{} = {}.{}", left, name, right, name)
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Null-aware "differs" predicate over the tracked columns
///
/// Two values are equal when both are NULL or both are non-NULL and identical,
/// which is exactly `IS NOT DISTINCT FROM`.
pub fn change_predicate<'a>(
    staged: &str,
    history: &str,
    tracked: impl IntoIterator<Item = &'a ColumnSpec>,
) -> String {
    let clauses: Vec<String> = tracked
        .into_iter()
        .map(|c| {
            let name = quote_ident(&c.name);
            format!("{}.{} IS DISTINCT FROM {}.{}", staged, name, history, name)
        })
        .collect();

    if clauses.is_empty() {
        "FALSE".to_string()
    } else {
        format!("({})", clauses.join(" OR "))
    }
}
