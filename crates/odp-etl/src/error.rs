//! Ingestion error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure of one pipeline stage or of the run as a whole
#[derive(Error, Debug)]
pub enum IngestError {
    /// Network or transport failure while reading the source
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source could not be parsed against the declared columns
    #[error("Source format error: {0}")]
    SourceFormat(String),

    #[error("Failed to load raw table {table}: {message}")]
    Load { table: String, message: String },

    #[error("Stage error: {0}")]
    Stage(String),

    /// Writing history would break the one-current-row-per-key rule
    #[error("Merge conflict: {0}")]
    MergeConflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A stage was invoked before the stage producing its input
    #[error("Missing input table {table}; run the {producer} stage first")]
    MissingInput {
        table: String,
        producer: &'static str,
    },

    #[error("Dataset '{0}' is already being ingested by another run")]
    AlreadyRunning(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IngestError {
    pub fn load(table: impl Into<String>, err: sqlx::Error) -> Self {
        Self::Load {
            table: table.into(),
            message: err.to_string(),
        }
    }

    pub fn missing_input(table: impl Into<String>, producer: &'static str) -> Self {
        Self::MissingInput {
            table: table.into(),
            producer,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            IngestError::SourceFormat(_) => ErrorKind::SourceFormatError,
            IngestError::Load { .. } => ErrorKind::LoadError,
            IngestError::Stage(_) => ErrorKind::StageError,
            IngestError::MergeConflict(_) => ErrorKind::MergeConflict,
            IngestError::Configuration(_) => ErrorKind::ConfigurationError,
            IngestError::MissingInput { .. } => ErrorKind::MissingInput,
            IngestError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            IngestError::Database(_) => ErrorKind::DatabaseError,
        }
    }

    /// Whether retrying the whole run later may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SourceUnavailable
                | ErrorKind::SourceFormatError
                | ErrorKind::LoadError
                | ErrorKind::StageError
                | ErrorKind::AlreadyRunning
                | ErrorKind::DatabaseError
        )
    }
}

impl From<odp_common::OdpError> for IngestError {
    fn from(err: odp_common::OdpError) -> Self {
        IngestError::Configuration(err.to_string())
    }
}

/// Serializable error category carried by run reports and the run log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    SourceFormatError,
    LoadError,
    StageError,
    MergeConflict,
    ConfigurationError,
    MissingInput,
    AlreadyRunning,
    DatabaseError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::SourceFormatError => "source_format_error",
            ErrorKind::LoadError => "load_error",
            ErrorKind::StageError => "stage_error",
            ErrorKind::MergeConflict => "merge_conflict",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::MissingInput => "missing_input",
            ErrorKind::AlreadyRunning => "already_running",
            ErrorKind::DatabaseError => "database_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
