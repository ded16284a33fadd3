//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};
use odp_etl::ingest::Stage;
use std::path::PathBuf;

/// ODP - snapshot ingestion for open tabular datasets
#[derive(Parser, Debug)]
#[command(name = "odp-ingest")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Dataset registry file
    #[arg(long, env = "ODP_DATASETS_FILE", global = true)]
    pub datasets: Option<PathBuf>,

    /// Print run reports as JSON lines on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the current snapshot of one dataset
    Run {
        /// Dataset machine name
        dataset: String,
    },

    /// Ingest every registered dataset
    RunAll,

    /// Finish a run from the staging tables of an earlier attempt
    Rederive {
        /// Dataset machine name
        dataset: String,

        /// First stage to execute
        #[arg(long, value_enum, default_value_t = StageArg::Dedupe)]
        from: StageArg,
    },

    /// Drop the staging tables of a dataset
    Reset {
        /// Dataset machine name
        dataset: String,
    },

    /// Create or verify history tables
    Provision {
        /// Dataset machine name; every registered dataset when omitted
        dataset: Option<String>,
    },

    /// List registered datasets with their last run
    List,

    /// Check the dataset registry and exit
    Validate,
}

impl Commands {
    /// Whether the command needs a database connection
    pub fn needs_database(&self) -> bool {
        !matches!(self, Commands::Validate)
    }
}

/// First stage of a rederive
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageArg {
    Fetch,
    Dedupe,
    Stage,
    Detect,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Fetch => Stage::Fetch,
            StageArg::Dedupe => Stage::Dedupe,
            StageArg::Stage => Stage::Stage,
            StageArg::Detect => Stage::Detect,
        }
    }
}
