//! Storage pool reconciliation
//!
//! Pools are created from a fixed set of system drives. An existing pool is
//! only verified: a different chunk size or drive set is reported as a
//! conflict and never corrected.

use super::Outcome;
use crate::domain::model::StoragePool;
use crate::domain::ports::StorageApi;
use crate::error::{Error, Result};
use crate::lookup;
use reqwest::StatusCode;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Chunk size used when the request does not name one (18 GiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 19_327_352_832;

/// Smallest number of system drives a pool can be built from
pub const MIN_SYSTEM_DRIVES: usize = 4;

/// Desired state of a storage pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePoolRequest {
    pub label: String,
    /// Only compared against an existing pool when set
    pub chunk_size: Option<u64>,
    pub system_drives: Vec<u64>,
    /// Grant access to requested drives that are currently access-denied
    pub allow_denied_system_drives: bool,
}

impl StoragePoolRequest {
    pub fn new(label: impl Into<String>, system_drives: Vec<u64>) -> Self {
        Self {
            label: label.into(),
            chunk_size: None,
            system_drives,
            allow_denied_system_drives: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn allow_denied_drives(mut self, allow: bool) -> Self {
        self.allow_denied_system_drives = allow;
        self
    }
}

/// Make sure a pool with the requested label exists and is built from
/// exactly the requested drives.
pub async fn ensure_present(
    api: &dyn StorageApi,
    request: &StoragePoolRequest,
) -> Result<Outcome<StoragePool>> {
    if let Some(pool) = lookup::find_storage_pool_by_label(api, &request.label).await? {
        return verify_existing(api, request, pool).await;
    }

    if request.system_drives.len() < MIN_SYSTEM_DRIVES {
        return Err(Error::Configuration(format!(
            "A storage pool needs at least {} system drives, {} given",
            MIN_SYSTEM_DRIVES,
            request.system_drives.len()
        )));
    }

    for drive_id in &request.system_drives {
        prepare_drive(api, *drive_id, request.allow_denied_system_drives).await?;
    }

    let chunk_size = request.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
    info!(
        "Creating storage pool {} from drives {:?} (chunk size {})",
        request.label, request.system_drives, chunk_size
    );
    let body = api
        .post(
            "storage-pools",
            StatusCode::CREATED,
            Some(json!({
                "label": request.label,
                "chunkSize": chunk_size,
                "systemDrives": request.system_drives,
            })),
        )
        .await?;
    let pool: StoragePool = lookup::member(body, "storagePool")?;
    Ok(Outcome::done(true, Some(pool)))
}

/// Delete the pool with `label` if it exists
pub async fn ensure_absent(api: &dyn StorageApi, label: &str) -> Result<Outcome<StoragePool>> {
    let Some(pool) = lookup::find_storage_pool_by_label(api, label).await? else {
        debug!("Storage pool {} already absent", label);
        return Ok(Outcome::unchanged_absent());
    };

    info!("Deleting storage pool {} ({})", label, pool.object_id);
    api.delete(&format!("storage-pools/{}", pool.object_id))
        .await?;
    Ok(Outcome::done(true, None))
}

async fn verify_existing(
    api: &dyn StorageApi,
    request: &StoragePoolRequest,
    pool: StoragePool,
) -> Result<Outcome<StoragePool>> {
    if let Some(chunk_size) = request.chunk_size {
        if chunk_size != pool.chunk_size {
            warn!(
                "Storage pool {} has chunk size {}, requested {}",
                pool.label, pool.chunk_size, chunk_size
            );
            return Ok(Outcome::conflict(
                None,
                format!(
                    "storage pool '{}' exists with chunk size {}, requested {}",
                    pool.label, pool.chunk_size, chunk_size
                ),
            ));
        }
    }

    let current: BTreeSet<u64> = lookup::pool_system_drives(api, &pool.object_id)
        .await?
        .iter()
        .map(|d| d.system_drive_id)
        .collect();
    let wanted: BTreeSet<u64> = request.system_drives.iter().copied().collect();

    if current.len() != request.system_drives.len() || current != wanted {
        warn!(
            "Storage pool {} is built from drives {:?}, requested {:?}",
            pool.label, current, request.system_drives
        );
        return Ok(Outcome::conflict(
            None,
            format!(
                "storage pool '{}' exists with system drives {:?}, requested {:?}",
                pool.label, current, request.system_drives
            ),
        ));
    }

    debug!("Storage pool {} matches request", pool.label);
    Ok(Outcome::done(false, Some(pool)))
}

/// Check a drive can join a new pool, granting access first when allowed
async fn prepare_drive(api: &dyn StorageApi, drive_id: u64, allow_denied: bool) -> Result<()> {
    let drive = lookup::find_system_drive(api, drive_id)
        .await?
        .ok_or_else(|| Error::ResourceNotFound {
            kind: "system drive".into(),
            name: drive_id.to_string(),
        })?;

    if drive.is_assigned_to_storage_pool {
        return Err(Error::DriveUnavailable {
            drive_id,
            reason: "already assigned to a storage pool".into(),
        });
    }

    if !drive.is_access_allowed && allow_denied {
        info!("Enabling access to system drive {}", drive_id);
        api.patch(
            &format!("system-drives/{}", drive_id),
            StatusCode::NO_CONTENT,
            Some(json!({ "enableAccess": true })),
        )
        .await?;
    }
    Ok(())
}
