//! SQL identifier and source header naming helpers
//!
//! Every table and column name that reaches a SQL statement is built from
//! registry data, so it goes through [`validate_identifier`] once at load time
//! and through [`quote_ident`] whenever it is spliced into SQL text.

use crate::error::{OdpError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap()
    })
}

/// Check that `name` is a lowercase, unquoted-safe SQL identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(OdpError::invalid_identifier(name, "identifier cannot be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(OdpError::invalid_identifier(
            name,
            format!("identifier exceeds {} bytes", MAX_IDENTIFIER_LEN),
        ));
    }
    if !identifier_pattern().is_match(name) {
        return Err(OdpError::invalid_identifier(
            name,
            "only lowercase letters, digits and '_' are allowed, and it cannot start with a digit",
        ));
    }
    Ok(())
}

/// Double-quote an identifier for use in SQL text.
///
/// Embedded double quotes are doubled, so the result is always a single
/// identifier token even for names that skipped validation.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Normalize a source header into the form used to match declared columns.
///
/// `"Case Number"` and `"case-number"` both become `"case_number"`.
pub fn slugify(header: &str) -> String {
    let mut slug = String::with_capacity(header.len());
    let mut pending_sep = false;

    for ch in header.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    slug
}

/// Turn a machine name into a display name: `chicago_crimes_all` → `Chicago Crimes All`.
pub fn humanize(machine_name: &str) -> String {
    machine_name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
