//! Error types for the controller.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("failed to write '{path}': {reason}")]
    FileWriteFailed { path: PathBuf, reason: String },

    #[error("manifest directory does not exist: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("YAML parse error in '{path}': {reason}")]
    YamlParseFailed { path: PathBuf, reason: String },

    #[error("invalid controller config: {reason}")]
    InvalidConfig { reason: String },

    #[error("unknown record '{name}'")]
    UnknownRecord { name: String },

    #[error("reconciliation loop stopped: {reason}")]
    LoopFailed { reason: String },

    #[error(transparent)]
    Reconcile(#[from] discord_reconciler::Error),
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a file write error.
    pub fn file_write_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a YAML parse error.
    pub fn yaml_parse_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::YamlParseFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Errors that retrying the same record will not fix.
    pub const fn is_terminal(&self) -> bool {
        match self {
            Self::Reconcile(e) => e.is_terminal(),
            Self::UnknownRecord { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::file_read_failed("/tmp/role.yaml", "permission denied");
        assert!(err.to_string().contains("/tmp/role.yaml"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_wrong_kind_stays_terminal_through_wrapper() {
        let err = Error::from(discord_reconciler::Error::wrong_kind("Role", "Channel"));
        assert!(err.is_terminal());
        assert_eq!(err.to_string(), "expected a Role resource, got Channel");
    }

    #[test]
    fn test_io_errors_are_retryable() {
        assert!(!Error::file_write_failed("/x", "disk full").is_terminal());
    }
}
