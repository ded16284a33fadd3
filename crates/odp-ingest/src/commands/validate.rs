//! `odp-ingest validate`

use anyhow::{Context, Result};
use colored::Colorize;
use odp_etl::ingest::DatasetRegistry;
use std::path::Path;

use super::Outcome;

/// Load and validate the registry without connecting to the database
pub fn validate(path: &Path, json: bool) -> Result<Outcome> {
    let registry = match DatasetRegistry::from_file(path) {
        Ok(registry) => registry,
        Err(err) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "valid": false, "error": err.to_string() })
                );
            } else {
                println!("{} {}: {}", "✗".red(), path.display(), err);
            }
            return Ok(Outcome::Failed);
        },
    };

    if json {
        let names: Vec<&str> = registry.datasets().iter().map(|d| d.name.as_str()).collect();
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({ "valid": true, "datasets": names }))
                .context("Failed to encode result")?
        );
        return Ok(Outcome::Success);
    }

    println!(
        "{} {}: {} dataset(s)",
        "✓".green(),
        path.display(),
        registry.len()
    );
    for dataset in registry.datasets() {
        println!(
            "  {} ({}), key: {}, {} column(s), {} tracked",
            dataset.name.bold(),
            dataset.display_name(),
            dataset.business_key.join(", "),
            dataset.columns.len(),
            dataset.tracked_columns().len()
        );
    }

    Ok(Outcome::Success)
}
