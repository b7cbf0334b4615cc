//! CLI error types.

use std::fmt;

use scrape_gate::GateError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Log analysis failed.
    Gate(GateError),
    /// Output formatting error.
    Format(String),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gate(e) => write!(f, "analysis error: {e}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gate(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Format(_) => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<GateError> for CliError {
    fn from(err: GateError) -> Self {
        Self::Gate(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_format() {
        let err = CliError::Format("bad utf-8".into());
        assert_eq!(err.to_string(), "format error: bad utf-8");
    }

    #[test]
    fn cli_error_from_gate_error() {
        let err = CliError::from(GateError::Config("bad".into()));
        assert!(matches!(err, CliError::Gate(_)));
        assert_eq!(err.to_string(), "analysis error: Configuration error: bad");
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
