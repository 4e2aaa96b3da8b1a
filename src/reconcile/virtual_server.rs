//! Virtual server reconciliation
//!
//! Covers the server itself, its IP addresses and its enabled state. With an
//! address list, "absent" means "remove these addresses", never the server.

use super::Outcome;
use crate::domain::model::VirtualServer;
use crate::domain::ports::StorageApi;
use crate::error::{Error, Result};
use crate::lookup;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Enabled state of a virtual server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VirtualServerStatus {
    #[default]
    Online,
    Disabled,
}

impl VirtualServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VirtualServerStatus::Online => "ONLINE",
            VirtualServerStatus::Disabled => "DISABLED",
        }
    }
}

impl FromStr for VirtualServerStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ONLINE" => Ok(VirtualServerStatus::Online),
            "DISABLED" => Ok(VirtualServerStatus::Disabled),
            _ => Err(Error::Configuration(format!(
                "Invalid 'status' value {} - must be ONLINE or DISABLED",
                s
            ))),
        }
    }
}

/// One IP address binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDetail {
    #[serde(alias = "ip")]
    pub address: String,
    #[serde(default)]
    pub netmask: Option<String>,
    /// Ethernet port or aggregate the address is bound to
    #[serde(default)]
    pub port: Option<String>,
}

impl AddressDetail {
    pub fn new(address: impl Into<String>, netmask: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            netmask: Some(netmask.into()),
            port: Some(port.into()),
        }
    }

    /// Address only, enough to identify a binding for removal
    pub fn address_only(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            netmask: None,
            port: None,
        }
    }
}

/// Desired state of a virtual server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualServerRequest {
    pub name: String,
    pub cluster_node_id: u64,
    pub status: VirtualServerStatus,
    pub addresses: Vec<AddressDetail>,
}

impl VirtualServerRequest {
    pub fn new(name: impl Into<String>, addresses: Vec<AddressDetail>) -> Self {
        Self {
            name: name.into(),
            cluster_node_id: 1,
            status: VirtualServerStatus::default(),
            addresses,
        }
    }

    pub fn with_status(mut self, status: VirtualServerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn on_node(mut self, cluster_node_id: u64) -> Self {
        self.cluster_node_id = cluster_node_id;
        self
    }
}

/// Create the server if needed, add missing addresses and set its status
pub async fn ensure_present(
    api: &dyn StorageApi,
    request: &VirtualServerRequest,
) -> Result<Outcome<VirtualServer>> {
    let mut changed = false;

    let vs = match lookup::find_virtual_server_by_name(api, &request.name).await? {
        Some(vs) => vs,
        None => {
            changed = true;
            create(api, request).await?
        }
    };

    for detail in &request.addresses {
        if vs.ip_addresses.contains(&detail.address) {
            continue;
        }
        let netmask = detail.netmask.as_deref().ok_or_else(|| Error::missing("netmask"))?;
        let port = detail.port.as_deref().ok_or_else(|| Error::missing("port"))?;

        info!("Adding address {} to virtual server {}", detail.address, vs.name);
        api.post(
            &format!("virtual-servers/{}/ip-addresses", vs.virtual_server_id),
            StatusCode::NO_CONTENT,
            Some(json!({
                "ipAddress": detail.address,
                "mask": netmask,
                "port": port,
            })),
        )
        .await?;
        changed = true;
    }

    if vs.status != request.status.as_str() {
        set_status(api, &vs, request.status).await?;
        changed = true;
    }

    let vs = if changed { refetch(api, &vs).await? } else { vs };
    Ok(Outcome::done(changed, Some(vs)))
}

/// Remove the listed addresses, or the whole server when `addresses` is empty.
///
/// The last address of a server is never removed; asking for it yields a
/// partial failure carrying the current record.
pub async fn ensure_absent(
    api: &dyn StorageApi,
    name: &str,
    addresses: &[AddressDetail],
) -> Result<Outcome<VirtualServer>> {
    let Some(vs) = lookup::find_virtual_server_by_name(api, name).await? else {
        debug!("Virtual server {} already absent", name);
        return Ok(Outcome::unchanged_absent());
    };

    if addresses.is_empty() {
        if vs.status != VirtualServerStatus::Disabled.as_str() {
            set_status(api, &vs, VirtualServerStatus::Disabled).await?;
        }
        info!("Deleting virtual server {} ({})", vs.name, vs.virtual_server_id);
        api.delete(&format!("virtual-servers/{}", vs.virtual_server_id))
            .await?;
        return Ok(Outcome::done(true, None));
    }

    let mut changed = false;
    let mut remaining = vs.ip_addresses.clone();
    let mut refused = Vec::new();

    for detail in addresses {
        if !remaining.contains(&detail.address) {
            continue;
        }
        if remaining.len() == 1 {
            warn!(
                "Refusing to remove {}: last address of virtual server {}",
                detail.address, vs.name
            );
            refused.push(detail.address.clone());
            continue;
        }

        info!("Removing address {} from virtual server {}", detail.address, vs.name);
        api.delete(&format!(
            "virtual-servers/{}/ip-addresses/{}",
            vs.virtual_server_id,
            urlencoding::encode(&detail.address)
        ))
        .await?;
        remaining.retain(|a| *a != detail.address);
        changed = true;
    }

    let vs = if changed { refetch(api, &vs).await? } else { vs };
    if refused.is_empty() {
        Ok(Outcome::done(changed, Some(vs)))
    } else {
        Ok(Outcome::partial(
            changed,
            Some(vs),
            format!(
                "cannot remove the last address of virtual server '{}': {}",
                name,
                refused.join(", ")
            ),
        ))
    }
}

async fn create(api: &dyn StorageApi, request: &VirtualServerRequest) -> Result<VirtualServer> {
    let primary = request
        .addresses
        .first()
        .ok_or_else(|| Error::missing("address_details"))?;
    let netmask = primary.netmask.as_deref().ok_or_else(|| Error::missing("netmask"))?;
    let port = primary.port.as_deref().ok_or_else(|| Error::missing("port"))?;

    info!(
        "Creating virtual server {} on node {} with address {}",
        request.name, request.cluster_node_id, primary.address
    );
    let body = api
        .post(
            "virtual-servers",
            StatusCode::CREATED,
            Some(json!({
                "name": request.name,
                "clusterNodeId": request.cluster_node_id,
                "ipAddress": primary.address,
                "netmask": netmask,
                "ethernetLinkAggregation": port,
            })),
        )
        .await?;
    lookup::member(body, "virtualServer")
}

async fn set_status(
    api: &dyn StorageApi,
    vs: &VirtualServer,
    status: VirtualServerStatus,
) -> Result<()> {
    let action = match status {
        VirtualServerStatus::Online => "enable",
        VirtualServerStatus::Disabled => "disable",
    };
    info!("Requesting {} of virtual server {}", action, vs.name);
    api.post(
        &format!("virtual-servers/{}/{}", vs.object_id, action),
        StatusCode::NO_CONTENT,
        None,
    )
    .await?;
    Ok(())
}

async fn refetch(api: &dyn StorageApi, vs: &VirtualServer) -> Result<VirtualServer> {
    lookup::find_virtual_server_by_id(api, vs.virtual_server_id)
        .await?
        .ok_or_else(|| Error::ResourceNotFound {
            kind: "virtual server".into(),
            name: vs.name.clone(),
        })
}
