//! Lookup primitives
//!
//! "Find by identifying attribute" queries built on [`StorageApi`]. Collection
//! queries return every match (normally zero or one); an empty result is the
//! authoritative "absent" signal for the reconcilers.

use crate::domain::model::{
    CifsAuthentication, EthernetInterface, Filesystem, Share, StoragePool, SystemDrive,
    VirtualServer, VirtualVolume,
};
use crate::domain::ports::{ShareKind, StorageApi};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

// =============================================================================
// Path Helpers
// =============================================================================

/// Append query parameters to a resource path, skipping unset values
pub fn with_query(path: &str, params: &[(&str, Option<String>)]) -> String {
    let query: Vec<String> = params
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();

    if query.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, query.join("&"))
    }
}

/// Pull a named array out of a response and decode its elements
fn collection<T: DeserializeOwned>(mut body: Value, key: &'static str) -> Result<Vec<T>> {
    let items = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field(key))?;
    Ok(serde_json::from_value(items)?)
}

/// Pull a named object out of a response and decode it
pub(crate) fn member<T: DeserializeOwned>(body: Option<Value>, key: &'static str) -> Result<T> {
    let mut body = body.unwrap_or(Value::Null);
    let item = body
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field(key))?;
    Ok(serde_json::from_value(item)?)
}

// =============================================================================
// System
// =============================================================================

/// File server (cluster) information
pub async fn file_server_info(api: &dyn StorageApi) -> Result<Value> {
    api.get("file-devices").await
}

/// Cluster nodes
pub async fn nodes(api: &dyn StorageApi) -> Result<Vec<Value>> {
    collection(api.get("nodes").await?, "nodes")
}

/// Ethernet interfaces of the file server
pub async fn network_interfaces(api: &dyn StorageApi) -> Result<Vec<EthernetInterface>> {
    collection(
        api.get("file-devices/ethernet-interfaces").await?,
        "ethernetInterfaces",
    )
}

// =============================================================================
// Virtual Servers
// =============================================================================

/// Virtual servers, optionally filtered by id and/or name
pub async fn virtual_servers(
    api: &dyn StorageApi,
    virtual_server_id: Option<u64>,
    name: Option<&str>,
) -> Result<Vec<VirtualServer>> {
    let path = with_query(
        "virtual-servers",
        &[
            ("virtualServerId", virtual_server_id.map(|id| id.to_string())),
            ("name", name.map(str::to_string)),
        ],
    );
    collection(api.get(&path).await?, "virtualServers")
}

pub async fn find_virtual_server_by_name(
    api: &dyn StorageApi,
    name: &str,
) -> Result<Option<VirtualServer>> {
    debug!("Looking up virtual server by name: {}", name);
    Ok(virtual_servers(api, None, Some(name)).await?.into_iter().next())
}

pub async fn find_virtual_server_by_id(
    api: &dyn StorageApi,
    virtual_server_id: u64,
) -> Result<Option<VirtualServer>> {
    debug!("Looking up virtual server by id: {}", virtual_server_id);
    Ok(virtual_servers(api, Some(virtual_server_id), None)
        .await?
        .into_iter()
        .next())
}

// =============================================================================
// Filesystems
// =============================================================================

/// Filesystems, optionally filtered by virtual server and/or label
pub async fn filesystems(
    api: &dyn StorageApi,
    virtual_server_id: Option<u64>,
    label: Option<&str>,
) -> Result<Vec<Filesystem>> {
    let path = with_query(
        "filesystems",
        &[
            ("virtualServerId", virtual_server_id.map(|id| id.to_string())),
            ("label", label.map(str::to_string)),
        ],
    );
    collection(api.get(&path).await?, "filesystems")
}

pub async fn find_filesystem_by_label(
    api: &dyn StorageApi,
    label: &str,
) -> Result<Option<Filesystem>> {
    debug!("Looking up filesystem by label: {}", label);
    Ok(filesystems(api, None, Some(label)).await?.into_iter().next())
}

/// Fetch one filesystem by object id; a missing filesystem is a remote error
pub async fn filesystem(api: &dyn StorageApi, filesystem_id: &str) -> Result<Filesystem> {
    member(
        Some(api.get(&format!("filesystems/{}", filesystem_id)).await?),
        "filesystem",
    )
}

/// Snapshots of a filesystem
pub async fn snapshots(api: &dyn StorageApi, filesystem_id: &str) -> Result<Vec<Value>> {
    collection(
        api.get(&format!("filesystem-snapshots/{}/null", filesystem_id))
            .await?,
        "snapshots",
    )
}

// =============================================================================
// Storage Pools & System Drives
// =============================================================================

/// Storage pools, optionally filtered by id and/or label
pub async fn storage_pools(
    api: &dyn StorageApi,
    storage_pool_id: Option<u64>,
    label: Option<&str>,
) -> Result<Vec<StoragePool>> {
    let path = with_query(
        "storage-pools",
        &[
            ("storagePoolId", storage_pool_id.map(|id| id.to_string())),
            ("label", label.map(str::to_string)),
        ],
    );
    collection(api.get(&path).await?, "storagePools")
}

pub async fn find_storage_pool_by_label(
    api: &dyn StorageApi,
    label: &str,
) -> Result<Option<StoragePool>> {
    debug!("Looking up storage pool by label: {}", label);
    Ok(storage_pools(api, None, Some(label)).await?.into_iter().next())
}

pub async fn find_storage_pool_by_id(
    api: &dyn StorageApi,
    storage_pool_id: u64,
) -> Result<Option<StoragePool>> {
    debug!("Looking up storage pool by id: {}", storage_pool_id);
    Ok(storage_pools(api, Some(storage_pool_id), None)
        .await?
        .into_iter()
        .next())
}

/// Member drives of a storage pool
pub async fn pool_system_drives(
    api: &dyn StorageApi,
    pool_object_id: &str,
) -> Result<Vec<SystemDrive>> {
    collection(
        api.get(&format!("storage-pools/{}/system-drives", pool_object_id))
            .await?,
        "systemDrives",
    )
}

/// Every system drive visible to the cluster
pub async fn system_drives(api: &dyn StorageApi) -> Result<Vec<SystemDrive>> {
    collection(api.get("system-drives").await?, "systemDrives")
}

pub async fn find_system_drive(
    api: &dyn StorageApi,
    system_drive_id: u64,
) -> Result<Option<SystemDrive>> {
    let path = with_query(
        "system-drives",
        &[("systemDriveId", Some(system_drive_id.to_string()))],
    );
    Ok(collection::<SystemDrive>(api.get(&path).await?, "systemDrives")?
        .into_iter()
        .next())
}

// =============================================================================
// Shares & Exports
// =============================================================================

/// Shares or exports of a virtual server, optionally filtered by name.
///
/// The name is normalized for `kind` first. CIFS shares come back with their
/// access authentication entries attached.
pub async fn shares(
    api: &dyn StorageApi,
    virtual_server_id: u64,
    kind: ShareKind,
    name: Option<&str>,
) -> Result<Vec<Share>> {
    let path = with_query(
        &format!("virtual-servers/{}/{}", virtual_server_id, kind),
        &[("name", name.map(|n| kind.normalize_name(n)))],
    );
    let mut shares: Vec<Share> = collection(api.get(&path).await?, "filesystemShares")?;

    if kind == ShareKind::Cifs {
        for share in shares.iter_mut() {
            share.cifs_authentications = cifs_authentications(api, &share.object_id).await?;
        }
    }
    Ok(shares)
}

pub async fn find_share(
    api: &dyn StorageApi,
    virtual_server_id: u64,
    kind: ShareKind,
    name: &str,
) -> Result<Option<Share>> {
    debug!(
        "Looking up {} share '{}' on virtual server {}",
        kind, name, virtual_server_id
    );
    Ok(shares(api, virtual_server_id, kind, Some(name))
        .await?
        .into_iter()
        .next())
}

/// Access authentication entries of a CIFS share
pub async fn cifs_authentications(
    api: &dyn StorageApi,
    share_id: &str,
) -> Result<Vec<CifsAuthentication>> {
    let body = api
        .get(&format!("filesystem-shares/cifs/{}/authentications", share_id))
        .await?;
    match body.get("cifsAuthentications") {
        Some(_) => collection(body, "cifsAuthentications"),
        None => Ok(Vec::new()),
    }
}

// =============================================================================
// Virtual Volumes
// =============================================================================

/// Virtual volumes of a filesystem, optionally filtered by name
pub async fn virtual_volumes(
    api: &dyn StorageApi,
    virtual_server_id: u64,
    filesystem_id: &str,
    name: Option<&str>,
) -> Result<Vec<VirtualVolume>> {
    let path = with_query(
        "virtual-volumes",
        &[
            ("virtualServerId", Some(virtual_server_id.to_string())),
            ("filesystemId", Some(filesystem_id.to_string())),
            ("name", name.map(str::to_string)),
        ],
    );
    collection(api.get(&path).await?, "virtualVolumes")
}

pub async fn find_virtual_volume(
    api: &dyn StorageApi,
    virtual_server_id: u64,
    filesystem_id: &str,
    name: &str,
) -> Result<Option<VirtualVolume>> {
    debug!("Looking up virtual volume '{}' on {}", name, filesystem_id);
    Ok(virtual_volumes(api, virtual_server_id, filesystem_id, Some(name))
        .await?
        .into_iter()
        .next())
}

// =============================================================================
// Reference Resolution
// =============================================================================

/// Resolve a virtual server name to its numeric id
pub async fn resolve_virtual_server_id(api: &dyn StorageApi, name: &str) -> Result<u64> {
    find_virtual_server_by_name(api, name)
        .await?
        .map(|vs| vs.virtual_server_id)
        .ok_or_else(|| Error::ResourceNotFound {
            kind: "virtual server".into(),
            name: name.into(),
        })
}

/// Resolve a storage pool label to its storage pool id
pub async fn resolve_storage_pool_id(api: &dyn StorageApi, label: &str) -> Result<u64> {
    find_storage_pool_by_label(api, label)
        .await?
        .map(|pool| pool.storage_pool_id)
        .ok_or_else(|| Error::ResourceNotFound {
            kind: "storage pool".into(),
            name: label.into(),
        })
}
