//! ODP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the ODP workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Naming**: SQL identifier validation/quoting and source header slugs
//!
//! # Example
//!
//! ```no_run
//! use odp_common::naming::{quote_ident, validate_identifier};
//!
//! fn history_table(dataset: &str) -> odp_common::Result<String> {
//!     validate_identifier(dataset)?;
//!     Ok(quote_ident(&format!("history_{}", dataset)))
//! }
//! ```

pub mod error;
pub mod logging;
pub mod naming;

// Re-export commonly used types
pub use error::{OdpError, Result};
