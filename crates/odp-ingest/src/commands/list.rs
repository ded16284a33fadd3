//! `odp-ingest list`

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use odp_etl::catalog::{self, HistoryStats};
use odp_etl::ingest::runs::{self, RunRecord};
use odp_etl::ingest::DatasetRegistry;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;

use super::Outcome;

#[derive(Debug, Serialize)]
struct DatasetStatus<'a> {
    dataset: &'a str,
    human_name: String,
    history: Option<HistoryStats>,
    index_entries: i64,
    last_run: Option<RunRecord>,
}

/// Registered datasets with history size, index size and their latest run
pub async fn list(pool: &PgPool, registry: &DatasetRegistry, json: bool) -> Result<Outcome> {
    let mut latest: HashMap<String, RunRecord> = runs::latest_runs(pool)
        .await?
        .into_iter()
        .map(|r| (r.dataset_name.clone(), r))
        .collect();
    let indexed: HashMap<String, i64> = catalog::indexed_datasets(pool)
        .await?
        .into_iter()
        .map(|d| (d.machine_name, d.entries))
        .collect();

    let mut statuses = Vec::with_capacity(registry.len());
    for dataset in registry.datasets() {
        statuses.push(DatasetStatus {
            dataset: &dataset.name,
            human_name: dataset.display_name(),
            history: catalog::history_stats(pool, dataset).await?,
            index_entries: indexed.get(&dataset.name).copied().unwrap_or(0),
            last_run: latest.remove(&dataset.name),
        });
    }

    if json {
        for status in &statuses {
            println!("{}", serde_json::to_string(status)?);
        }
        return Ok(Outcome::Success);
    }

    if statuses.is_empty() {
        println!("No datasets registered.");
        return Ok(Outcome::Success);
    }

    println!("{}", render_table(&statuses));
    Ok(Outcome::Success)
}

fn render_table(statuses: &[DatasetStatus<'_>]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Dataset", "Name", "Current", "Versions", "Indexed", "Last run", "Status",
        ]);

    for status in statuses {
        let (current, versions) = match &status.history {
            Some(h) => (h.current_rows.to_string(), h.total_versions.to_string()),
            None => ("-".to_string(), "-".to_string()),
        };
        let (last_run, run_status) = match &status.last_run {
            Some(run) => {
                let color = match run.status.as_str() {
                    "ok" => Color::Green,
                    "error" => Color::Red,
                    _ => Color::Yellow,
                };
                let label = match &run.error_kind {
                    Some(kind) => format!("{} ({})", run.status, kind),
                    None => run.status.clone(),
                };
                (
                    Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S")),
                    Cell::new(label).fg(color),
                )
            },
            None => (Cell::new("never"), Cell::new("-")),
        };

        table.add_row(vec![
            Cell::new(status.dataset),
            Cell::new(&status.human_name),
            Cell::new(current),
            Cell::new(versions),
            Cell::new(status.index_entries),
            last_run,
            run_status,
        ]);
    }

    table
}
