//! Error types for ODP

use thiserror::Error;

/// Result type alias for ODP operations
pub type Result<T> = std::result::Result<T, OdpError>;

/// Main error type for ODP shared helpers
#[derive(Error, Debug)]
pub enum OdpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OdpError {
    /// Create an invalid identifier error
    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
