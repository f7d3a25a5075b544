//! SQL identifier guard utilities.
//!
//! Table and column names come straight from caller records, so every name
//! that reaches generated DDL/DML is validated here and then quoted.

use std::error::Error;
use std::fmt;

/// Bracket delimiters; everything else survives double-quoting.
const FORBIDDEN_CHARS: &[char] = &['[', ']'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentError {
    name: String,
    message: String,
}

impl IdentError {
    fn new(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// The rejected identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for IdentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid identifier {:?}: {}", self.name, self.message)
    }
}

impl Error for IdentError {}

/// Validate that `name` can be used verbatim as a column name.
pub fn validate_ident(name: &str) -> Result<(), IdentError> {
    if name.is_empty() {
        return Err(IdentError::new(name, "identifier is empty"));
    }
    if name.trim().is_empty() {
        return Err(IdentError::new(name, "identifier is blank"));
    }
    for ch in name.chars() {
        if FORBIDDEN_CHARS.contains(&ch) {
            return Err(IdentError::new(
                name,
                format!("identifier contains reserved character {:?}", ch),
            ));
        }
        if ch.is_control() {
            return Err(IdentError::new(
                name,
                "identifier contains a control character",
            ));
        }
    }
    Ok(())
}

/// Validate a table name. SQLite reserves the `sqlite_` prefix for its own
/// schema objects.
pub fn validate_table_ident(name: &str) -> Result<(), IdentError> {
    validate_ident(name)?;
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(IdentError::new(
            name,
            "table names beginning with sqlite_ are reserved",
        ));
    }
    Ok(())
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push('"');
    for ch in name.chars() {
        if ch == '"' {
            escaped.push('"');
        }
        escaped.push(ch);
    }
    escaped.push('"');
    escaped
}

/// Validate then quote.
pub fn checked_ident(name: &str) -> Result<String, IdentError> {
    validate_ident(name)?;
    Ok(quote_ident(name))
}
