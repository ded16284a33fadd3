//! ODP Ingest - snapshot ingestion CLI

use anyhow::{Context, Result};
use clap::Parser;
use odp_common::logging::{init_logging, LogConfig, LogLevel};
use odp_etl::config::Config;
use odp_etl::db;
use odp_etl::ingest::{DatasetRegistry, IngestPipeline};
use odp_ingest::commands::{self, Outcome};
use odp_ingest::{Cli, Commands};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = match LogConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring invalid LOG_* settings: {}", e);
            LogConfig::default()
        },
    };
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    // The CLI keeps working without logging
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    match execute(&cli).await {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        },
    }
}

async fn execute(cli: &Cli) -> Result<Outcome> {
    let config = Config::load().context("Invalid configuration")?;
    let datasets_file = cli
        .datasets
        .clone()
        .unwrap_or_else(|| config.ingest.datasets_file.clone());

    if !cli.command.needs_database() {
        return commands::validate::validate(&datasets_file, cli.json);
    }

    let registry = DatasetRegistry::from_file(&datasets_file)?;
    info!(
        datasets = registry.len(),
        file = %datasets_file.display(),
        "Dataset registry loaded"
    );

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool).await?;

    let pipeline = IngestPipeline::with_csv_fetcher(pool, config.ingest.clone())?;

    match &cli.command {
        Commands::Run { dataset } => {
            commands::run::run(&pipeline, &registry, dataset, cli.json).await
        },
        Commands::RunAll => commands::run::run_all(&pipeline, &registry, cli.json).await,
        Commands::Rederive { dataset, from } => {
            commands::run::rederive(&pipeline, &registry, dataset, (*from).into(), cli.json).await
        },
        Commands::Reset { dataset } => {
            commands::maintenance::reset(&pipeline, &registry, dataset, cli.json).await
        },
        Commands::Provision { dataset } => {
            commands::maintenance::provision(&pipeline, &registry, dataset.as_deref(), cli.json)
                .await
        },
        Commands::List => commands::list::list(pipeline.pool(), &registry, cli.json).await,
        Commands::Validate => commands::validate::validate(&datasets_file, cli.json),
    }
}
