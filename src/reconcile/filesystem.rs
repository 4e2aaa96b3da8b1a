//! Filesystem reconciliation
//!
//! Creates, formats, mounts/unmounts and grows filesystems. Two attributes are
//! protected: a formatted block size is never changed (that would destroy
//! data) and capacity is never reduced.

use super::poll::{wait_for_filesystem_status, PollResult};
use super::Outcome;
use crate::client::PollPolicy;
use crate::domain::model::Filesystem;
use crate::domain::ports::StorageApi;
use crate::error::{Error, Result};
use crate::lookup;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use tracing::{debug, info, warn};

// =============================================================================
// Request Types
// =============================================================================

/// Reference to another resource, by id or by name/label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef<Id> {
    Id(Id),
    Name(String),
}

/// Unit a requested capacity is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityUnit {
    #[default]
    Bytes,
    Kb,
    Kib,
    Mb,
    Mib,
    Gb,
    Gib,
    Tb,
    Tib,
}

impl CapacityUnit {
    pub fn multiplier(&self) -> u64 {
        match self {
            CapacityUnit::Bytes => 1,
            CapacityUnit::Kb => 1000,
            CapacityUnit::Kib => 1024,
            CapacityUnit::Mb => 1000 * 1000,
            CapacityUnit::Mib => 1024 * 1024,
            CapacityUnit::Gb => 1000 * 1000 * 1000,
            CapacityUnit::Gib => 1024 * 1024 * 1024,
            CapacityUnit::Tb => 1000 * 1000 * 1000 * 1000,
            CapacityUnit::Tib => 1024 * 1024 * 1024 * 1024,
        }
    }

    /// `capacity` units in bytes
    pub fn to_bytes(&self, capacity: u64) -> Result<u64> {
        capacity.checked_mul(self.multiplier()).ok_or_else(|| {
            Error::CapacityParse(format!("{} {:?} overflows a byte count", capacity, self))
        })
    }
}

impl FromStr for CapacityUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "b" | "bytes" => Ok(CapacityUnit::Bytes),
            "k" | "kb" => Ok(CapacityUnit::Kb),
            "kib" => Ok(CapacityUnit::Kib),
            "m" | "mb" => Ok(CapacityUnit::Mb),
            "mib" => Ok(CapacityUnit::Mib),
            "g" | "gb" => Ok(CapacityUnit::Gb),
            "gib" => Ok(CapacityUnit::Gib),
            "t" | "tb" => Ok(CapacityUnit::Tb),
            "tib" => Ok(CapacityUnit::Tib),
            _ => Err(Error::CapacityParse(format!("Unknown capacity unit '{}'", s))),
        }
    }
}

/// Filesystem block size in KiB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockSize(pub u64);

impl BlockSize {
    pub fn kib(&self) -> u64 {
        self.0
    }

    /// Size as reported on a formatted filesystem record
    pub fn bytes(&self) -> u64 {
        self.0 * 1024
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        BlockSize(4)
    }
}

/// Mount state a filesystem should be left in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilesystemStatus {
    #[default]
    Mounted,
    NotMounted,
}

impl FilesystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilesystemStatus::Mounted => "MOUNTED",
            FilesystemStatus::NotMounted => "NOT_MOUNTED",
        }
    }
}

impl std::fmt::Display for FilesystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilesystemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MOUNTED" => Ok(FilesystemStatus::Mounted),
            "NOT_MOUNTED" => Ok(FilesystemStatus::NotMounted),
            _ => Err(Error::Configuration(format!(
                "Invalid 'status' value {} - must be MOUNTED or NOT_MOUNTED",
                s
            ))),
        }
    }
}

/// Desired state of a filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemRequest {
    pub label: String,
    pub virtual_server: ResourceRef<u64>,
    pub storage_pool: ResourceRef<u64>,
    /// Desired capacity in bytes
    pub capacity: u64,
    pub block_size: BlockSize,
    pub status: FilesystemStatus,
}

impl FilesystemRequest {
    pub fn new(
        label: impl Into<String>,
        virtual_server: ResourceRef<u64>,
        storage_pool: ResourceRef<u64>,
        capacity: u64,
        unit: CapacityUnit,
    ) -> Result<Self> {
        Ok(Self {
            label: label.into(),
            virtual_server,
            storage_pool,
            capacity: unit.to_bytes(capacity)?,
            block_size: BlockSize::default(),
            status: FilesystemStatus::default(),
        })
    }

    pub fn with_block_size(mut self, block_size: BlockSize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_status(mut self, status: FilesystemStatus) -> Self {
        self.status = status;
        self
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Make the filesystem exist, formatted, in the requested mount state and at
/// least the requested capacity.
///
/// A formatted filesystem whose block size differs from the request is
/// reported as a conflict without touching it.
pub async fn ensure_present(
    api: &dyn StorageApi,
    request: &FilesystemRequest,
    poll: &PollPolicy,
) -> Result<Outcome<Filesystem>> {
    let mut changed = false;

    let fs = match lookup::find_filesystem_by_label(api, &request.label).await? {
        Some(fs) => fs,
        None => {
            changed = true;
            create(api, request).await?
        }
    };
    let filesystem_id = fs.object_id.clone();

    if !fs.is_formatted() {
        info!(
            "Formatting filesystem {} with {} KiB blocks",
            request.label,
            request.block_size.kib()
        );
        api.post(
            &format!("filesystems/{}/format", filesystem_id),
            StatusCode::NO_CONTENT,
            Some(json!({ "blockSize": request.block_size.kib() })),
        )
        .await?;
        changed = true;
    } else if fs.block_size != request.block_size.bytes() {
        warn!(
            "Filesystem {} has block size {} bytes, requested {} bytes; refusing to reformat",
            request.label,
            fs.block_size,
            request.block_size.bytes()
        );
        return Ok(Outcome::conflict(
            None,
            format!(
                "filesystem '{}' exists with block size {} bytes, requested {} bytes",
                request.label,
                fs.block_size,
                request.block_size.bytes()
            ),
        ));
    }

    if fs.status != request.status.as_str() {
        set_status(api, &filesystem_id, request.status, poll).await?;
        changed = true;
    }

    if request.capacity > fs.capacity {
        info!(
            "Expanding filesystem {} from {} to {} bytes",
            request.label, fs.capacity, request.capacity
        );
        api.post(
            &format!("filesystems/{}/expand", filesystem_id),
            StatusCode::NO_CONTENT,
            Some(json!({ "capacity": request.capacity })),
        )
        .await?;
        changed = true;
    } else if request.capacity < fs.capacity {
        debug!(
            "Filesystem {} is larger than requested ({} > {}); not shrinking",
            request.label, fs.capacity, request.capacity
        );
    }

    let fs = if changed {
        lookup::filesystem(api, &filesystem_id).await?
    } else {
        fs
    };
    Ok(Outcome::done(changed, Some(fs)))
}

/// Make sure no filesystem with `label` exists, unmounting it first
pub async fn ensure_absent(
    api: &dyn StorageApi,
    label: &str,
    poll: &PollPolicy,
) -> Result<Outcome<Filesystem>> {
    let Some(fs) = lookup::find_filesystem_by_label(api, label).await? else {
        debug!("Filesystem {} already absent", label);
        return Ok(Outcome::unchanged_absent());
    };

    if fs.status != FilesystemStatus::NotMounted.as_str() {
        set_status(api, &fs.object_id, FilesystemStatus::NotMounted, poll).await?;
    }

    info!("Deleting filesystem {} ({})", label, fs.object_id);
    api.delete(&format!("filesystems/{}", fs.object_id)).await?;
    Ok(Outcome::done(true, None))
}

/// Mount or unmount, then wait for the status to settle
pub async fn set_status(
    api: &dyn StorageApi,
    filesystem_id: &str,
    status: FilesystemStatus,
    poll: &PollPolicy,
) -> Result<PollResult> {
    let action = match status {
        FilesystemStatus::Mounted => "mount",
        FilesystemStatus::NotMounted => "unmount",
    };
    info!("Requesting {} of filesystem {}", action, filesystem_id);
    api.post(
        &format!("filesystems/{}/{}", filesystem_id, action),
        StatusCode::NO_CONTENT,
        None,
    )
    .await?;

    wait_for_filesystem_status(api, filesystem_id, status.as_str(), poll).await
}

async fn create(api: &dyn StorageApi, request: &FilesystemRequest) -> Result<Filesystem> {
    let virtual_server_id = match &request.virtual_server {
        ResourceRef::Id(id) => *id,
        ResourceRef::Name(name) => lookup::resolve_virtual_server_id(api, name).await?,
    };
    let storage_pool_id = match &request.storage_pool {
        ResourceRef::Id(id) => *id,
        ResourceRef::Name(label) => lookup::resolve_storage_pool_id(api, label).await?,
    };

    info!(
        "Creating filesystem {} ({} bytes) on virtual server {}, storage pool {}",
        request.label, request.capacity, virtual_server_id, storage_pool_id
    );
    let body = api
        .post(
            "filesystems",
            StatusCode::CREATED,
            Some(json!({
                "label": request.label,
                "virtualServerId": virtual_server_id,
                "storagePoolId": storage_pool_id,
                "capacity": request.capacity,
            })),
        )
        .await?;
    lookup::member(body, "filesystem")
}
