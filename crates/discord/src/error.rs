//! Error types for the Discord client.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for Discord API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the Discord REST API.
#[derive(Error, Debug)]
pub enum Error {
    /// The addressed object does not exist (HTTP 404).
    #[error("not found: {path}")]
    NotFound { path: String },

    /// The bot token was rejected (HTTP 401).
    #[error("unauthorized: the bot token was rejected")]
    Unauthorized,

    /// Still rate limited after exhausting retries (HTTP 429).
    #[error("rate limited on {path}, retry after {retry_after_ms}ms")]
    RateLimited { path: String, retry_after_ms: u64 },

    /// Any other non-success response.
    #[error("Discord API returned {status} for {path}: {message} (code {code})")]
    Api {
        status: StatusCode,
        path: String,
        code: u64,
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a config error.
    pub fn config_error(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
        }
    }

    /// Check whether the remote object is gone.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is worth retrying later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http(_) => true,
            Self::Api { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_classified() {
        let err = Error::not_found("/guilds/1/roles/2");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("/guilds/1/roles/2"));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = Error::Api {
            status: StatusCode::BAD_GATEWAY,
            path: "/guilds/1".to_string(),
            code: 0,
            message: "upstream".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = Error::Api {
            status: StatusCode::FORBIDDEN,
            path: "/guilds/1/roles".to_string(),
            code: 50013,
            message: "Missing Permissions".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("50013"));
    }
}
