//! Declarative task files
//!
//! A task file lists resources and the state each should be in:
//!
//! ```yaml
//! tasks:
//!   - resource: filesystem
//!     state: present
//!     data:
//!       label: data01
//!       virtual_server_name: evs1
//!       storagePoolId: 10
//!       capacity: 20
//!       capacity_unit: gib
//! ```
//!
//! `data` keys follow the remote API's field names. Each task's data is
//! converted into a typed request before any call is made, so a malformed
//! task fails with a configuration error and leaves the cluster untouched.

use crate::client::PollPolicy;
use crate::domain::model::{CifsAuthentication, Quota, ShareSettings};
use crate::domain::ports::{DesiredState, ShareKind, StorageApi};
use crate::error::{Error, Result};
use crate::reconcile::{
    self, AddressDetail, BlockSize, CapacityUnit, Failure, FilesystemRequest, FilesystemStatus,
    Outcome, ResourceRef, ShareAbsentRequest, ShareRequest, StoragePoolRequest,
    VirtualServerRequest, VirtualServerStatus, VirtualVolumeAbsentRequest, VirtualVolumeRequest,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::info;

// =============================================================================
// Task File
// =============================================================================

/// Resource type a task manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    VirtualServer,
    Filesystem,
    StoragePool,
    ShareExport,
    VirtualVolume,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VirtualServer => "virtual_server",
            ResourceKind::Filesystem => "filesystem",
            ResourceKind::StoragePool => "storage_pool",
            ResourceKind::ShareExport => "share_export",
            ResourceKind::VirtualVolume => "virtual_volume",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One desired-state declaration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Task {
    /// Free-form label used in logs
    #[serde(default)]
    pub name: Option<String>,
    pub resource: ResourceKind,
    #[serde(default)]
    pub state: DesiredState,
    #[serde(default)]
    pub data: Value,
}

impl Task {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} ({})", self.resource, self.state))
    }
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    tasks: Vec<Task>,
}

/// Parse a task document
pub fn parse_tasks(yaml: &str) -> Result<Vec<Task>> {
    let file: TaskFile = serde_yaml::from_str(yaml)?;
    Ok(file.tasks)
}

/// Read and parse a task file
pub fn load_tasks(path: impl AsRef<Path>) -> Result<Vec<Task>> {
    let yaml = std::fs::read_to_string(path)?;
    parse_tasks(&yaml)
}

// =============================================================================
// Task Data
// =============================================================================

/// Numeric identifier, also accepted in quoted form
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Number(u64),
    Text(String),
}

impl IdValue {
    fn into_u64(self, field: &str) -> Result<u64> {
        match self {
            IdValue::Number(n) => Ok(n),
            IdValue::Text(s) => s.trim().parse().map_err(|_| {
                Error::Configuration(format!("'{}' must be an integer, got '{}'", field, s))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualServerData {
    name: String,
    #[serde(default)]
    cluster_node_id: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, rename = "address_details")]
    address_details: Vec<AddressDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesystemData {
    label: String,
    #[serde(default)]
    virtual_server_id: Option<u64>,
    #[serde(default, rename = "virtual_server_name")]
    virtual_server_name: Option<String>,
    #[serde(default)]
    storage_pool_id: Option<IdValue>,
    #[serde(default, rename = "storage_pool_name")]
    storage_pool_name: Option<String>,
    #[serde(default)]
    capacity: Option<u64>,
    #[serde(default, rename = "capacity_unit")]
    capacity_unit: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_size: Option<u64>,
}

impl FilesystemData {
    fn into_request(self) -> Result<FilesystemRequest> {
        // Names win over ids when both are given
        let virtual_server = match (self.virtual_server_name, self.virtual_server_id) {
            (Some(name), _) => ResourceRef::Name(name),
            (None, Some(id)) => ResourceRef::Id(id),
            (None, None) => return Err(Error::missing("virtualServerId")),
        };
        let storage_pool = match (self.storage_pool_name, self.storage_pool_id) {
            (Some(label), _) => ResourceRef::Name(label),
            (None, Some(id)) => ResourceRef::Id(id.into_u64("storagePoolId")?),
            (None, None) => return Err(Error::missing("storagePoolId")),
        };
        let capacity = self.capacity.ok_or_else(|| Error::missing("capacity"))?;
        let unit = match self.capacity_unit {
            Some(unit) => unit.parse::<CapacityUnit>()?,
            None => CapacityUnit::Bytes,
        };

        let mut request =
            FilesystemRequest::new(self.label, virtual_server, storage_pool, capacity, unit)?;
        if let Some(status) = self.status {
            request = request.with_status(status.parse::<FilesystemStatus>()?);
        }
        if let Some(kib) = self.block_size {
            if kib != 4 && kib != 32 {
                return Err(Error::Configuration(format!(
                    "Invalid 'blockSize' value {} - must be 4 or 32",
                    kib
                )));
            }
            request = request.with_block_size(BlockSize(kib));
        }
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoragePoolData {
    label: String,
    #[serde(default)]
    chunk_size: Option<u64>,
    #[serde(default)]
    system_drives: Vec<u64>,
    #[serde(default, rename = "allow_denied_system_drives")]
    allow_denied_system_drives: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareData {
    name: String,
    virtual_server_id: u64,
    #[serde(rename = "type")]
    kind: ShareKind,
    #[serde(default)]
    filesystem_id: Option<String>,
    #[serde(default)]
    filesystem_path: Option<String>,
    #[serde(default)]
    cifs_authentications: Vec<CifsAuthentication>,
    #[serde(flatten)]
    settings: ShareSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualVolumeData {
    name: String,
    virtual_server_id: u64,
    filesystem_id: String,
    #[serde(default)]
    filesystem_path: Option<String>,
    #[serde(default)]
    emails: Option<Vec<String>>,
    #[serde(default)]
    quota: Option<Quota>,
    #[serde(default, rename = "remove_content")]
    remove_content: bool,
}

fn decode<T: DeserializeOwned>(resource: ResourceKind, data: &Value) -> Result<T> {
    serde_json::from_value(data.clone()).map_err(|e| {
        Error::Configuration(format!("Invalid data for {} task: {}", resource, e))
    })
}

// =============================================================================
// Execution
// =============================================================================

/// Result of one task, ready to print
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub resource: ResourceKind,
    pub changed: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// Final record under its resource key (`filesystem`, `nfsExport`, ...)
    #[serde(flatten)]
    pub record: Map<String, Value>,
}

impl TaskReport {
    fn from_outcome<T: Serialize>(
        resource: ResourceKind,
        key: &str,
        outcome: Outcome<T>,
    ) -> Result<Self> {
        let success = outcome.success();
        let mut record = Map::new();
        record.insert(key.to_string(), serde_json::to_value(&outcome.record)?);
        Ok(Self {
            resource,
            changed: outcome.changed,
            success,
            failure: outcome.failure,
            record,
        })
    }

    /// JSON line for the task, with a message naming the target host
    pub fn to_json(&self, address: &str) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        let msg = match &self.failure {
            None => format!(
                "{} task completed successfully on system at [{}]",
                self.resource, address
            ),
            Some(failure) => format!(
                "{} task not successful on system at [{}]: {}",
                self.resource, address, failure
            ),
        };
        value["msg"] = json!(msg);
        Ok(value)
    }
}

/// Reconcile one task against the cluster
pub async fn run_task(api: &dyn StorageApi, task: &Task, poll: &PollPolicy) -> Result<TaskReport> {
    let resource = task.resource;
    info!("Running task {} against {}", task.display_name(), api.address());

    match (resource, task.state) {
        (ResourceKind::VirtualServer, state) => {
            let data: VirtualServerData = decode(resource, &task.data)?;
            let outcome = match state {
                DesiredState::Present => {
                    let mut request = VirtualServerRequest::new(data.name, data.address_details);
                    if let Some(node) = data.cluster_node_id {
                        request = request.on_node(node);
                    }
                    if let Some(status) = data.status {
                        request = request.with_status(status.parse::<VirtualServerStatus>()?);
                    }
                    reconcile::virtual_server::ensure_present(api, &request).await?
                }
                DesiredState::Absent => {
                    reconcile::virtual_server::ensure_absent(api, &data.name, &data.address_details)
                        .await?
                }
            };
            TaskReport::from_outcome(resource, "virtualServer", outcome)
        }
        (ResourceKind::Filesystem, DesiredState::Present) => {
            let data: FilesystemData = decode(resource, &task.data)?;
            let request = data.into_request()?;
            let outcome = reconcile::filesystem::ensure_present(api, &request, poll).await?;
            TaskReport::from_outcome(resource, "filesystem", outcome)
        }
        (ResourceKind::Filesystem, DesiredState::Absent) => {
            let data: FilesystemData = decode(resource, &task.data)?;
            let outcome = reconcile::filesystem::ensure_absent(api, &data.label, poll).await?;
            TaskReport::from_outcome(resource, "filesystem", outcome)
        }
        (ResourceKind::StoragePool, DesiredState::Present) => {
            let data: StoragePoolData = decode(resource, &task.data)?;
            let mut request = StoragePoolRequest::new(data.label, data.system_drives)
                .allow_denied_drives(data.allow_denied_system_drives);
            if let Some(chunk_size) = data.chunk_size {
                request = request.with_chunk_size(chunk_size);
            }
            let outcome = reconcile::storage_pool::ensure_present(api, &request).await?;
            TaskReport::from_outcome(resource, "storagePool", outcome)
        }
        (ResourceKind::StoragePool, DesiredState::Absent) => {
            let data: StoragePoolData = decode(resource, &task.data)?;
            let outcome = reconcile::storage_pool::ensure_absent(api, &data.label).await?;
            TaskReport::from_outcome(resource, "storagePool", outcome)
        }
        (ResourceKind::ShareExport, state) => {
            let data: ShareData = decode(resource, &task.data)?;
            let key = match data.kind {
                ShareKind::Nfs => "nfsExport",
                ShareKind::Cifs => "cifsShare",
            };
            let outcome = match state {
                DesiredState::Present => {
                    let filesystem_id = data
                        .filesystem_id
                        .ok_or_else(|| Error::missing("filesystemId"))?;
                    let mut request =
                        ShareRequest::new(data.virtual_server_id, data.kind, data.name, filesystem_id)
                            .with_settings(data.settings)
                            .with_authentications(data.cifs_authentications);
                    if let Some(path) = data.filesystem_path {
                        request = request.with_path(path);
                    }
                    reconcile::share::ensure_present(api, &request).await?
                }
                DesiredState::Absent => {
                    let names = data.cifs_authentications.into_iter().map(|e| e.name).collect();
                    let request = ShareAbsentRequest::new(data.virtual_server_id, data.kind, data.name)
                        .only_authentications(names);
                    reconcile::share::ensure_absent(api, &request).await?
                }
            };
            TaskReport::from_outcome(resource, key, outcome)
        }
        (ResourceKind::VirtualVolume, state) => {
            let data: VirtualVolumeData = decode(resource, &task.data)?;
            let outcome = match state {
                DesiredState::Present => {
                    let request = VirtualVolumeRequest {
                        virtual_server_id: data.virtual_server_id,
                        filesystem_id: data.filesystem_id,
                        name: data.name,
                        path: data.filesystem_path,
                        emails: data.emails,
                        quota: data.quota,
                    };
                    reconcile::virtual_volume::ensure_present(api, &request).await?
                }
                DesiredState::Absent => {
                    let request = VirtualVolumeAbsentRequest {
                        virtual_server_id: data.virtual_server_id,
                        filesystem_id: data.filesystem_id,
                        name: data.name,
                        remove_content: data.remove_content,
                    };
                    reconcile::virtual_volume::ensure_absent(api, &request).await?
                }
            };
            TaskReport::from_outcome(resource, "virtualVolume", outcome)
        }
    }
}
