//! Build automation tasks for ODP
//!
//! - Generating the `odp-ingest` CLI reference from its clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for ODP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<odp_ingest::Cli>();

    let content = format!(
        r#"# odp-ingest CLI Reference

Auto-generated from the CLI source code. Last updated: {}.

## Overview

`odp-ingest` re-reads full snapshots of registered open datasets and folds them
into versioned history tables (`history_<dataset>`), keeping one current row per
business key and indexing every new version in `master_index`.

## Quick Start

```bash
# Check the registry
odp-ingest validate --datasets datasets.yml

# Create history tables up front
odp-ingest provision

# Ingest one dataset, or all of them
odp-ingest run chicago_crimes_all
odp-ingest run-all --json

# Finish a failed run from its retained staging tables
odp-ingest rederive chicago_crimes_all --from detect
```

## Commands

{}

## Environment Variables

- `DATABASE_URL` - PostgreSQL connection string (default: `postgresql://localhost/odp`)
- `ODP_DATASETS_FILE` - Dataset registry (default: `datasets.yml`)
- `ODP_FETCH_TIMEOUT_SECS`, `ODP_LOAD_BATCH_SIZE`, `ODP_INDEX_BATCH_SIZE`, `ODP_MAX_CONCURRENT_RUNS`
- `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR`, `LOG_FILTER` - Logging

## Exit Codes

- `0` - every run succeeded
- `1` - at least one run failed (see its report)
- `2` - configuration, registry or database setup error

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
