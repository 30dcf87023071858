//! Error types for the reconciler crate.

use std::fmt;

use thiserror::Error;

use crate::client::RemoteError;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The driver-facing operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Observe,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Observe => "observe",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// The step of connection setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectStage {
    /// Resolving the provider config the record points at.
    ResolveProviderConfig,
    /// Pulling the bearer token out of the referenced credential source.
    ExtractCredentials,
    /// Building an API client around the token.
    BuildClient,
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolveProviderConfig => "resolve provider config",
            Self::ExtractCredentials => "extract credentials",
            Self::BuildClient => "build client",
        };
        f.write_str(name)
    }
}

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// The record is not of the kind this reconciler manages.
    #[error("expected a {expected} resource, got {found}")]
    WrongKind {
        expected: &'static str,
        found: String,
    },

    /// Configuration, credentials or client could not be resolved.
    #[error("cannot connect ({stage}): {reason}")]
    ConfigResolution { stage: ConnectStage, reason: String },

    /// The desired state cannot address a remote entity.
    #[error("invalid spec for '{resource}': {reason}")]
    InvalidSpec { resource: String, reason: String },

    /// An operation that needs the external name was called without one.
    #[error("cannot {operation} '{resource}': no external name is bound")]
    MissingBinding {
        operation: Operation,
        resource: String,
    },

    /// The remote API call failed.
    #[error("cannot {operation} '{resource}': {source}")]
    Remote {
        operation: Operation,
        resource: String,
        source: RemoteError,
    },

    /// The caller cancelled the pass.
    #[error("{operation} of '{resource}' was cancelled")]
    Cancelled {
        operation: Operation,
        resource: String,
    },

    /// The caller's deadline passed before the remote call finished.
    #[error("{operation} of '{resource}' exceeded its deadline")]
    DeadlineExceeded {
        operation: Operation,
        resource: String,
    },
}

impl Error {
    /// Create a wrong kind error.
    pub fn wrong_kind(expected: &'static str, found: impl Into<String>) -> Self {
        Self::WrongKind {
            expected,
            found: found.into(),
        }
    }

    /// Create a config resolution error.
    pub fn config_resolution(stage: ConnectStage, reason: impl Into<String>) -> Self {
        Self::ConfigResolution {
            stage,
            reason: reason.into(),
        }
    }

    /// Create an invalid spec error.
    pub fn invalid_spec(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing binding error.
    pub fn missing_binding(operation: Operation, resource: impl Into<String>) -> Self {
        Self::MissingBinding {
            operation,
            resource: resource.into(),
        }
    }

    /// Create a remote error.
    pub fn remote(operation: Operation, resource: impl Into<String>, source: RemoteError) -> Self {
        Self::Remote {
            operation,
            resource: resource.into(),
            source,
        }
    }

    /// Errors the driver must not retry: they only go away when the
    /// record or the wiring changes.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WrongKind { .. } | Self::InvalidSpec { .. } | Self::MissingBinding { .. }
        )
    }

    /// Short machine-readable reason, used on status conditions.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::WrongKind { .. } => "WrongKind",
            Self::ConfigResolution { .. } => "ConfigResolutionError",
            Self::InvalidSpec { .. } => "InvalidSpec",
            Self::MissingBinding { .. } => "MissingExternalName",
            Self::Remote { .. } => "RemoteAPIError",
            Self::Cancelled { .. } => "Cancelled",
            Self::DeadlineExceeded { .. } => "DeadlineExceeded",
        }
    }
}
