//! Reconciliation Operations
//!
//! One state machine per resource type. Each `ensure_present` / `ensure_absent`
//! compares desired with observed state and issues the minimal set of mutating
//! calls, returning an [`Outcome`].
//!
//! Errors from the REST layer are propagated unchanged. A resource that exists
//! with incompatible identity-defining attributes is not an error: it comes
//! back as an [`Outcome`] carrying [`Failure::Conflict`], and a multi-step
//! operation that was partly refused carries [`Failure::Partial`].

pub mod filesystem;
pub mod poll;
pub mod share;
pub mod storage_pool;
pub mod virtual_server;
pub mod virtual_volume;

pub use filesystem::{BlockSize, CapacityUnit, FilesystemRequest, FilesystemStatus, ResourceRef};
pub use poll::{wait_for_filesystem_status, PollResult};
pub use share::{ShareAbsentRequest, ShareRequest};
pub use storage_pool::{StoragePoolRequest, DEFAULT_CHUNK_SIZE, MIN_SYSTEM_DRIVES};
pub use virtual_server::{AddressDetail, VirtualServerRequest, VirtualServerStatus};
pub use virtual_volume::{VirtualVolumeAbsentRequest, VirtualVolumeRequest};

use serde::Serialize;

/// Why a reconciliation did not reach the desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Failure {
    /// The resource exists with attributes that must not be changed automatically
    Conflict(String),
    /// Some steps were applied, one was refused
    Partial(String),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Conflict(reason) => write!(f, "conflict: {}", reason),
            Failure::Partial(reason) => write!(f, "partial failure: {}", reason),
        }
    }
}

/// Result of one reconciliation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    /// Whether any mutating call was issued
    pub changed: bool,
    /// Final record, when there is one to report
    pub record: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl<T> Outcome<T> {
    /// Desired state reached
    pub fn done(changed: bool, record: Option<T>) -> Self {
        Self {
            changed,
            record,
            failure: None,
        }
    }

    /// Nothing to do for an absent resource
    pub fn unchanged_absent() -> Self {
        Self::done(false, None)
    }

    /// Existing resource is incompatible with the request; nothing was modified
    pub fn conflict(record: Option<T>, reason: impl Into<String>) -> Self {
        Self {
            changed: false,
            record,
            failure: Some(Failure::Conflict(reason.into())),
        }
    }

    /// Some steps applied, at least one refused
    pub fn partial(changed: bool, record: Option<T>, reason: impl Into<String>) -> Self {
        Self {
            changed,
            record,
            failure: Some(Failure::Partial(reason.into())),
        }
    }

    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    /// Convert the record, keeping flags and failure
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            changed: self.changed,
            record: self.record.map(f),
            failure: self.failure,
        }
    }
}
