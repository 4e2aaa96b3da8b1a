//! Domain Ports - the seam between reconciliation logic and the remote system
//!
//! Reconciliation code only ever talks to the storage cluster through
//! [`StorageApi`]. The production adapter is
//! [`RestClient`](crate::client::RestClient); tests plug in an in-memory fake.

use crate::error::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

// =============================================================================
// Desired State
// =============================================================================

/// Whether a resource should exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    #[default]
    Present,
    Absent,
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesiredState::Present => write!(f, "present"),
            DesiredState::Absent => write!(f, "absent"),
        }
    }
}

// =============================================================================
// Share Types
// =============================================================================

/// Protocol flavour of a filesystem share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareKind {
    /// NFS export
    Nfs,
    /// CIFS (SMB) share
    Cifs,
}

impl ShareKind {
    /// Path segment used by the REST API
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareKind::Nfs => "nfs",
            ShareKind::Cifs => "cifs",
        }
    }

    /// Normalize a share name for this kind.
    ///
    /// NFS export names always start with `/`; CIFS names are used verbatim.
    pub fn normalize_name(&self, name: &str) -> String {
        match self {
            ShareKind::Cifs => name.to_string(),
            ShareKind::Nfs if name.starts_with('/') => name.to_string(),
            ShareKind::Nfs => format!("/{}", name),
        }
    }
}

impl std::fmt::Display for ShareKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nfs" => Ok(ShareKind::Nfs),
            "cifs" => Ok(ShareKind::Cifs),
            _ => Err(crate::error::Error::Configuration(format!(
                "Unsupported share type '{}' supplied - must be 'cifs' or 'nfs'",
                s
            ))),
        }
    }
}

// =============================================================================
// Storage API Port
// =============================================================================

/// Minimal REST surface of the storage cluster.
///
/// Paths are relative to the versioned `.../storage/` base. Each mutating call
/// names the status code it expects; any other status is an
/// [`Error::RemoteCall`](crate::error::Error::RemoteCall).
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Host address of the remote system, used in failure reports
    fn address(&self) -> &str;

    /// GET a resource, expecting 200
    async fn get(&self, path: &str) -> Result<Value>;

    /// POST to a resource; returns the JSON body if the response had one
    async fn post(&self, path: &str, expected: StatusCode, body: Option<Value>)
        -> Result<Option<Value>>;

    /// PATCH a resource; returns the JSON body if the response had one
    async fn patch(&self, path: &str, expected: StatusCode, body: Option<Value>)
        -> Result<Option<Value>>;

    /// DELETE a resource, expecting 204
    async fn delete(&self, path: &str) -> Result<()>;
}
