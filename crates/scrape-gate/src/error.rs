//! Error types for the scrape gate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while configuring the gate or analyzing its logs.
///
/// Request evaluation itself never fails: malformed input is resolved as a
/// verdict and throttling is a decision, not an error.
#[derive(Debug, Error)]
pub enum GateError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rule table entry could not be compiled.
    #[error("Invalid rule {rule:?}: {reason}")]
    InvalidRule {
        /// The offending rule text.
        rule: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Log file to analyze does not exist.
    #[error("Log file not found: {}", path.display())]
    LogNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gate operations.
pub type GateResult<T> = Result<T, GateError>;
