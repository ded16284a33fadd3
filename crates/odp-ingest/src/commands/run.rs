//! `odp-ingest run`, `run-all` and `rederive`

use anyhow::Result;
use odp_etl::ingest::{DatasetRegistry, IngestPipeline, Stage};
use tracing::info;

use super::report::print_report;
use super::Outcome;

/// Ingest one dataset
pub async fn run(
    pipeline: &IngestPipeline,
    registry: &DatasetRegistry,
    dataset: &str,
    json: bool,
) -> Result<Outcome> {
    let dataset = registry.get(dataset)?;
    let report = pipeline.run(dataset).await;
    print_report(&report, json)?;
    Ok(Outcome::from_success(report.is_ok()))
}

/// Ingest every registered dataset; fails if any run failed
pub async fn run_all(
    pipeline: &IngestPipeline,
    registry: &DatasetRegistry,
    json: bool,
) -> Result<Outcome> {
    info!(datasets = registry.len(), "Ingesting all registered datasets");
    let reports = pipeline.run_many(registry.datasets()).await;

    let mut failed = 0;
    for report in &reports {
        print_report(report, json)?;
        if !report.is_ok() {
            failed += 1;
        }
    }

    info!(total = reports.len(), failed, "All runs finished");
    Ok(Outcome::from_success(failed == 0))
}

pub async fn rederive(
    pipeline: &IngestPipeline,
    registry: &DatasetRegistry,
    dataset: &str,
    from: Stage,
    json: bool,
) -> Result<Outcome> {
    let dataset = registry.get(dataset)?;
    let report = pipeline.rederive(dataset, from).await;
    print_report(&report, json)?;
    Ok(Outcome::from_success(report.is_ok()))
}
