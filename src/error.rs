//! Error types for the HNAS reconciler
//!
//! Every fallible core operation returns [`Result`]. Logical conflicts and
//! partial failures are not errors: they travel in
//! [`Outcome`](crate::reconcile::Outcome) so the caller can pick a policy.

use thiserror::Error;

/// Unified error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Capacity parse error: {0}")]
    CapacityParse(String),

    // =========================================================================
    // Remote API Errors
    // =========================================================================
    #[error("{status} {reason} - {detail}")]
    RemoteCall {
        method: String,
        url: String,
        status: u16,
        reason: String,
        detail: String,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Waited {attempts} attempts for {resource_id} status to be {required_status} - giving up")]
    Timeout {
        resource_id: String,
        required_status: String,
        attempts: u32,
    },

    #[error("{kind} not found: {name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("system drive '{drive_id}' {reason}")]
    DriveUnavailable { drive_id: u64, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input, detected before or instead of a remote call
    Configuration,
    /// The remote system refused or failed a call
    Remote,
    /// A bounded wait ran out of attempts
    Timeout,
    /// Local failures (IO, decoding)
    Internal,
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration(_) | Error::CapacityParse(_) | Error::Yaml(_) => {
                ErrorCategory::Configuration
            }

            Error::RemoteCall { .. }
            | Error::Transport(_)
            | Error::ResourceNotFound { .. }
            | Error::DriveUnavailable { .. } => ErrorCategory::Remote,

            Error::Timeout { .. } => ErrorCategory::Timeout,

            Error::JsonParse(_) | Error::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Remote => 3,
            ErrorCategory::Timeout => 4,
            ErrorCategory::Internal => 1,
        }
    }

    /// HTTP status of a failed remote call, if this is one
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Error::RemoteCall { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Error::Configuration(format!("Missing '{}' parameter", field))
    }
}

/// Result type alias for the reconciler
pub type Result<T> = std::result::Result<T, Error>;
