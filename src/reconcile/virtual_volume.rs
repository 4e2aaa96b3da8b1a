//! Virtual volume reconciliation
//!
//! A virtual volume is identified by (virtual server, filesystem, name). Its
//! root path is fixed at creation; the notification emails and the quota are
//! patched when they differ.

use super::Outcome;
use crate::domain::model::{Quota, VirtualVolume};
use crate::domain::ports::StorageApi;
use crate::error::{Error, Result};
use crate::lookup;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

/// Desired state of a virtual volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualVolumeRequest {
    pub virtual_server_id: u64,
    pub filesystem_id: String,
    pub name: String,
    /// Root directory inside the filesystem; required to create
    pub path: Option<String>,
    /// `None` leaves the current list alone
    pub emails: Option<Vec<String>>,
    /// `None` leaves the current quota alone
    pub quota: Option<Quota>,
}

impl VirtualVolumeRequest {
    pub fn new(
        virtual_server_id: u64,
        filesystem_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            virtual_server_id,
            filesystem_id: filesystem_id.into(),
            name: name.into(),
            path: None,
            emails: None,
            quota: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_emails(mut self, emails: Vec<String>) -> Self {
        self.emails = Some(emails);
        self
    }

    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.quota = Some(quota);
        self
    }
}

/// Removal of a virtual volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualVolumeAbsentRequest {
    pub virtual_server_id: u64,
    pub filesystem_id: String,
    pub name: String,
    /// Delete the files below the volume root as well; without it the
    /// server refuses to delete a non-empty volume
    pub remove_content: bool,
}

/// Create the volume, or patch its emails and quota
pub async fn ensure_present(
    api: &dyn StorageApi,
    request: &VirtualVolumeRequest,
) -> Result<Outcome<VirtualVolume>> {
    let found = lookup::find_virtual_volume(
        api,
        request.virtual_server_id,
        &request.filesystem_id,
        &request.name,
    )
    .await?;

    let Some(volume) = found else {
        return Ok(Outcome::done(true, Some(create(api, request).await?)));
    };

    if let Some(path) = &request.path {
        if *path != volume.path {
            warn!(
                "Virtual volume {} is rooted at {}, requested {}",
                volume.name, volume.path, path
            );
            let reason = format!(
                "virtual volume '{}' exists at {}, requested {}",
                volume.name, volume.path, path
            );
            return Ok(Outcome::conflict(Some(volume), reason));
        }
    }

    let mut patch = Map::new();
    if let Some(emails) = &request.emails {
        if !same_emails(emails, &volume.emails) {
            patch.insert("emails".into(), json!(emails));
        }
    }
    if let Some(quota) = &request.quota {
        if volume.quota.as_ref() != Some(quota) {
            patch.insert("quota".into(), json!(quota));
        }
    }

    if patch.is_empty() {
        debug!("Virtual volume {} matches request", volume.name);
        return Ok(Outcome::done(false, Some(volume)));
    }

    info!(
        "Updating virtual volume {} ({}): {:?}",
        volume.name,
        volume.object_id,
        patch.keys().collect::<Vec<_>>()
    );
    api.patch(
        &format!("virtual-volumes/{}", volume.object_id),
        StatusCode::NO_CONTENT,
        Some(Value::Object(patch)),
    )
    .await?;

    let volume = lookup::find_virtual_volume(
        api,
        request.virtual_server_id,
        &request.filesystem_id,
        &request.name,
    )
    .await?
    .ok_or_else(|| Error::ResourceNotFound {
        kind: "virtual volume".into(),
        name: request.name.clone(),
    })?;
    Ok(Outcome::done(true, Some(volume)))
}

/// Delete the volume if it exists
pub async fn ensure_absent(
    api: &dyn StorageApi,
    request: &VirtualVolumeAbsentRequest,
) -> Result<Outcome<VirtualVolume>> {
    let found = lookup::find_virtual_volume(
        api,
        request.virtual_server_id,
        &request.filesystem_id,
        &request.name,
    )
    .await?;
    let Some(volume) = found else {
        debug!("Virtual volume {} already absent", request.name);
        return Ok(Outcome::unchanged_absent());
    };

    info!(
        "Deleting virtual volume {} ({}), remove content: {}",
        volume.name, volume.object_id, request.remove_content
    );
    let path = lookup::with_query(
        &format!("virtual-volumes/{}", volume.object_id),
        &[(
            "removeContent",
            request.remove_content.then(|| "true".to_string()),
        )],
    );
    api.delete(&path).await?;
    Ok(Outcome::done(true, None))
}

async fn create(api: &dyn StorageApi, request: &VirtualVolumeRequest) -> Result<VirtualVolume> {
    let path = request.path.as_deref().ok_or_else(|| Error::missing("path"))?;

    info!(
        "Creating virtual volume {} at {} on filesystem {}",
        request.name, path, request.filesystem_id
    );
    let mut body = json!({
        "name": request.name,
        "virtualServerId": request.virtual_server_id,
        "filesystemId": request.filesystem_id,
        "path": path,
        "emails": request.emails.clone().unwrap_or_default(),
    });
    if let Some(quota) = &request.quota {
        body["quota"] = json!(quota);
    }

    let created = api
        .post("virtual-volumes", StatusCode::CREATED, Some(body))
        .await?;
    lookup::member(created, "virtualVolume")
}

fn same_emails(wanted: &[String], current: &[String]) -> bool {
    let mut wanted = wanted.to_vec();
    let mut current = current.to_vec();
    wanted.sort();
    current.sort();
    wanted == current
}
