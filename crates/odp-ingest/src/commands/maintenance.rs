//! `odp-ingest reset` and `provision`

use anyhow::{Context, Result};
use colored::Colorize;
use odp_etl::ingest::{DatasetRegistry, IngestPipeline};

use super::Outcome;

/// Drop a dataset's staging tables
pub async fn reset(
    pipeline: &IngestPipeline,
    registry: &DatasetRegistry,
    dataset: &str,
    json: bool,
) -> Result<Outcome> {
    let dataset = registry.get(dataset)?;
    let dropped = pipeline
        .reset(dataset)
        .await
        .with_context(|| format!("Failed to reset {}", dataset.name))?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "dataset": dataset.name, "dropped": dropped })
        );
    } else if dropped.is_empty() {
        println!("{}: no staging tables to drop", dataset.name);
    } else {
        println!("{}: dropped {}", dataset.name.bold(), dropped.join(", "));
    }

    Ok(Outcome::Success)
}

/// Create or verify the history table of one or every dataset
///
/// Keeps going after a failure so one bad declaration does not hide the others.
pub async fn provision(
    pipeline: &IngestPipeline,
    registry: &DatasetRegistry,
    dataset: Option<&str>,
    json: bool,
) -> Result<Outcome> {
    let targets = match dataset {
        Some(name) => vec![registry.get(name)?],
        None => registry.datasets().iter().collect(),
    };

    let mut all_ok = true;
    for dataset in targets {
        let result = pipeline.provision(dataset).await;
        let table = dataset.tables().history;

        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dataset": dataset.name,
                    "table": table,
                    "ok": result.is_ok(),
                    "error_kind": result.as_ref().err().map(|e| e.kind()),
                    "message": result.as_ref().err().map(|e| e.to_string()),
                })
            );
        } else {
            match &result {
                Ok(()) => println!("{} {}", "✓".green(), table),
                Err(err) => println!("{} {}: {}", "✗".red(), table, err),
            }
        }

        all_ok &= result.is_ok();
    }

    Ok(Outcome::from_success(all_ok))
}
