//! Error taxonomy for fileset operations.
//!
//! Every failure aborts the operation that raised it. The reconciler turns a
//! [`SyncError`] into a host-visible diagnostic via [`SyncError::summary`].

use std::time::Duration;

use thiserror::Error;

/// Errors returned by an [`ObjectStore`](crate::contract::ObjectStore) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Access denied to s3://{bucket}/{key}: {message}")]
    AccessDenied {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    #[error("{message}")]
    Other { message: String },
}

/// Errors surfaced by the fileset pipeline and the lifecycle reconciler.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The match pattern resolved to zero files.
    #[error("Could not find any files that match the glob pattern `{pattern}`")]
    NoMatch { pattern: String },

    #[error("Invalid glob pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to read local file `{path}`: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload `{key}`: {source}")]
    Publish {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Object `{key}` was not readable after waiting {waited:?}")]
    ConfirmationTimeout { key: String, waited: Duration },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed desired or prior state handed over by the host.
    #[error("Malformed host payload: {0}")]
    HostProtocol(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation deadline exceeded")]
    DeadlineExceeded,

    #[error("Background worker failed: {0}")]
    Worker(String),
}

impl SyncError {
    /// Short diagnostic heading shown to the host user.
    pub fn summary(&self) -> &'static str {
        match self {
            SyncError::NoMatch { .. }
            | SyncError::InvalidPattern { .. }
            | SyncError::FileRead { .. } => "Local files error",
            SyncError::Publish { .. } | SyncError::ConfirmationTimeout { .. } => "Upload error",
            SyncError::InvalidConfiguration(_) => "Invalid configuration",
            SyncError::HostProtocol(_) => "Host protocol error",
            SyncError::Cancelled | SyncError::DeadlineExceeded => "Operation cancelled",
            SyncError::Worker(_) => "Internal error",
        }
    }

    /// Whether the failure stems from user configuration rather than a fault.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SyncError::NoMatch { .. }
                | SyncError::InvalidPattern { .. }
                | SyncError::InvalidConfiguration(_)
        )
    }
}
