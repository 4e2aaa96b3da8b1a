//! Read-only fact gathering
//!
//! Collects raw collections from the cluster, keyed by fact name, for
//! inventory and reporting. Nothing here mutates remote state.

use crate::domain::ports::{ShareKind, StorageApi};
use crate::error::{Error, Result};
use crate::lookup;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// Kind of fact to gather
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    /// File server information and cluster nodes
    System,
    VirtualServers,
    SystemDrives,
    StoragePools,
    Filesystems,
    NfsExports,
    CifsShares,
    Snapshots,
    /// Names of physical ethernet ports
    NetworkPorts,
    /// Names of aggregate ports that can carry virtual server addresses
    AggregatePorts,
    VirtualVolumes,
}

impl FactType {
    pub const ALL: [FactType; 11] = [
        FactType::System,
        FactType::VirtualServers,
        FactType::SystemDrives,
        FactType::StoragePools,
        FactType::Filesystems,
        FactType::NfsExports,
        FactType::CifsShares,
        FactType::Snapshots,
        FactType::NetworkPorts,
        FactType::AggregatePorts,
        FactType::VirtualVolumes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::System => "system",
            FactType::VirtualServers => "virtual_servers",
            FactType::SystemDrives => "system_drives",
            FactType::StoragePools => "storage_pools",
            FactType::Filesystems => "filesystems",
            FactType::NfsExports => "nfs_exports",
            FactType::CifsShares => "cifs_shares",
            FactType::Snapshots => "snapshots",
            FactType::NetworkPorts => "network_ports",
            FactType::AggregatePorts => "aggregate_ports",
            FactType::VirtualVolumes => "virtual_volumes",
        }
    }
}

impl FactType {
    /// Key of this fact in gathered output, following the API's collection names
    pub fn output_key(&self) -> &'static str {
        match self {
            FactType::System => "system",
            FactType::VirtualServers => "virtualServers",
            FactType::SystemDrives => "systemDrives",
            FactType::StoragePools => "storagePools",
            FactType::Filesystems => "filesystems",
            FactType::NfsExports => "nfsExports",
            FactType::CifsShares => "cifsShares",
            FactType::Snapshots => "snapshots",
            FactType::NetworkPorts => "networkPorts",
            FactType::AggregatePorts => "aggregatePorts",
            FactType::VirtualVolumes => "virtualVolumes",
        }
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FactType::ALL
            .into_iter()
            .find(|fact| fact.as_str() == s)
            .ok_or_else(|| Error::Configuration(format!("Unknown fact type '{}'", s)))
    }
}

/// Query filters applied to the fact collections that support them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactFilter {
    pub virtual_server_id: Option<u64>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub filesystem_id: Option<String>,
}

impl FactFilter {
    fn require_virtual_server(&self) -> Result<u64> {
        self.virtual_server_id
            .ok_or_else(|| Error::missing("virtualServerId"))
    }

    fn require_filesystem(&self) -> Result<&str> {
        self.filesystem_id
            .as_deref()
            .ok_or_else(|| Error::missing("filesystemId"))
    }
}

/// Gather the requested facts.
///
/// Filters are validated for every requested type before the first call, so
/// a missing filter fails without touching the cluster.
pub async fn gather(
    api: &dyn StorageApi,
    types: &[FactType],
    filter: &FactFilter,
) -> Result<BTreeMap<String, Value>> {
    for fact in types {
        match fact {
            FactType::NfsExports | FactType::CifsShares => {
                filter.require_virtual_server()?;
            }
            FactType::Snapshots => {
                filter.require_filesystem()?;
            }
            FactType::VirtualVolumes => {
                filter.require_virtual_server()?;
                filter.require_filesystem()?;
            }
            _ => {}
        }
    }

    let mut facts = BTreeMap::new();
    for fact in types {
        debug!("Gathering {} facts from {}", fact, api.address());
        match fact {
            FactType::System => {
                facts.insert("system".to_string(), lookup::file_server_info(api).await?);
                facts.insert("nodes".to_string(), to_value(lookup::nodes(api).await?)?);
            }
            FactType::VirtualServers => {
                let found =
                    lookup::virtual_servers(api, filter.virtual_server_id, filter.name.as_deref())
                        .await?;
                facts.insert(fact.output_key().to_string(), to_value(found)?);
            }
            FactType::SystemDrives => {
                facts.insert(fact.output_key().to_string(), to_value(lookup::system_drives(api).await?)?);
            }
            FactType::StoragePools => {
                let found = lookup::storage_pools(api, None, filter.label.as_deref()).await?;
                facts.insert(fact.output_key().to_string(), to_value(found)?);
            }
            FactType::Filesystems => {
                let found =
                    lookup::filesystems(api, filter.virtual_server_id, filter.label.as_deref())
                        .await?;
                facts.insert(fact.output_key().to_string(), to_value(found)?);
            }
            FactType::NfsExports | FactType::CifsShares => {
                let kind = if *fact == FactType::NfsExports {
                    ShareKind::Nfs
                } else {
                    ShareKind::Cifs
                };
                let found = lookup::shares(
                    api,
                    filter.require_virtual_server()?,
                    kind,
                    filter.name.as_deref(),
                )
                .await?;
                facts.insert(fact.output_key().to_string(), to_value(found)?);
            }
            FactType::Snapshots => {
                let found = lookup::snapshots(api, filter.require_filesystem()?).await?;
                facts.insert(fact.output_key().to_string(), to_value(found)?);
            }
            FactType::NetworkPorts | FactType::AggregatePorts => {
                let names: Vec<String> = lookup::network_interfaces(api)
                    .await?
                    .into_iter()
                    .filter(|port| match fact {
                        FactType::NetworkPorts => port.is_aggregation_allowed,
                        _ => port.is_virtual_server_ip_allowed,
                    })
                    .map(|port| port.name)
                    .collect();
                facts.insert(fact.output_key().to_string(), to_value(names)?);
            }
            FactType::VirtualVolumes => {
                let found = lookup::virtual_volumes(
                    api,
                    filter.require_virtual_server()?,
                    filter.require_filesystem()?,
                    filter.name.as_deref(),
                )
                .await?;
                facts.insert(fact.output_key().to_string(), to_value(found)?);
            }
        }
    }
    Ok(facts)
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
