//! HNAS Reconciler
//!
//! Desired-state management for Hitachi NAS clusters over their REST API.
//! Each managed resource (virtual server, filesystem, storage pool,
//! share/export, virtual volume) gets an `ensure_present` / `ensure_absent`
//! pair that compares the declared state with what the cluster reports and
//! issues only the calls needed to converge.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │   hnasctl (task files / facts)                               │
//! ├──────────────────────────────────────────────────────────────┤
//! │   reconcile::{virtual_server, filesystem, storage_pool,      │
//! │               share, virtual_volume}        facts            │
//! ├──────────────────────────────────────────────────────────────┤
//! │   lookup (find-by-attribute queries)   poll (bounded wait)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │   StorageApi port  ──►  RestClient (reqwest)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`client`]: Connection configuration and the REST adapter
//! - [`domain`]: Remote records and the storage API port
//! - [`lookup`]: Find-by-attribute queries
//! - [`reconcile`]: Per-resource reconciliation and status polling
//! - [`facts`]: Read-only inventory gathering
//! - [`task`]: YAML task files and their execution
//! - [`error`]: Error types and handling

pub mod client;
pub mod domain;
pub mod error;
pub mod facts;
pub mod lookup;
pub mod reconcile;
pub mod task;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use client::{ApiEndpoint, ClientConfig, Credentials, PollPolicy, RestClient};

pub use domain::model::{
    CifsAuthentication, EthernetInterface, Filesystem, Quota, Share, ShareSettings, StoragePool,
    SystemDrive, Threshold, VirtualServer, VirtualVolume,
};

pub use domain::ports::{DesiredState, ShareKind, StorageApi};

pub use error::{Error, ErrorCategory, Result};

pub use facts::{FactFilter, FactType};

pub use reconcile::{Failure, Outcome};

pub use task::{ResourceKind, Task, TaskReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
