//! ODP Ingest
//!
//! Command-line front end for the snapshot ingestion pipeline in `odp-etl`.
//!
//! # Commands
//!
//! - **run / run-all**: ingest the current snapshot of one or every dataset
//! - **rederive**: finish a run from staging tables left by an earlier attempt
//! - **reset**: drop a dataset's staging tables
//! - **provision**: create or verify history tables
//! - **list**: registered datasets with their last run and history size
//! - **validate**: check the dataset registry without touching the database

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, StageArg};
