//! Share and export reconciliation
//!
//! NFS exports and CIFS shares share one state machine; they differ in name
//! normalization, in the settings that apply to them and in the CIFS-only
//! share access authentication (SAA) entries reconciled after the share.

use super::Outcome;
use crate::domain::model::{CifsAuthentication, Share, ShareSettings};
use crate::domain::ports::{ShareKind, StorageApi};
use crate::error::{Error, Result};
use crate::lookup;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, info, warn};

// =============================================================================
// Requests
// =============================================================================

/// Desired state of a share or export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRequest {
    pub virtual_server_id: u64,
    pub kind: ShareKind,
    pub name: String,
    pub filesystem_id: String,
    /// Path inside the filesystem; required to create
    pub filesystem_path: Option<String>,
    /// Unset fields keep their current value, or the kind default on create
    pub settings: ShareSettings,
    /// SAA entries, CIFS only
    pub authentications: Vec<CifsAuthentication>,
}

impl ShareRequest {
    pub fn new(
        virtual_server_id: u64,
        kind: ShareKind,
        name: impl Into<String>,
        filesystem_id: impl Into<String>,
    ) -> Self {
        Self {
            virtual_server_id,
            kind,
            name: name.into(),
            filesystem_id: filesystem_id.into(),
            filesystem_path: None,
            settings: ShareSettings::default(),
            authentications: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.filesystem_path = Some(path.into());
        self
    }

    pub fn with_settings(mut self, settings: ShareSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_authentications(mut self, authentications: Vec<CifsAuthentication>) -> Self {
        self.authentications = authentications;
        self
    }

    /// Name as sent on create; the API adds the leading `/` of new NFS exports itself
    fn wire_name(&self) -> &str {
        match self.kind {
            ShareKind::Nfs => self.name.strip_prefix('/').unwrap_or(&self.name),
            ShareKind::Cifs => &self.name,
        }
    }
}

/// Removal of a share, or only of some of its SAA entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareAbsentRequest {
    pub virtual_server_id: u64,
    pub kind: ShareKind,
    pub name: String,
    /// Principals whose entries to remove; when non-empty the share itself stays
    pub authentications: Vec<String>,
}

impl ShareAbsentRequest {
    pub fn new(virtual_server_id: u64, kind: ShareKind, name: impl Into<String>) -> Self {
        Self {
            virtual_server_id,
            kind,
            name: name.into(),
            authentications: Vec::new(),
        }
    }

    pub fn only_authentications(mut self, names: Vec<String>) -> Self {
        self.authentications = names;
        self
    }
}

// =============================================================================
// Share Reconciliation
// =============================================================================

/// Create or update a share, then reconcile its SAA entries.
///
/// A share with the same name bound to another filesystem is a conflict and
/// is left untouched.
pub async fn ensure_present(
    api: &dyn StorageApi,
    request: &ShareRequest,
) -> Result<Outcome<Share>> {
    let kind = request.kind;
    let existing =
        lookup::find_share(api, request.virtual_server_id, kind, &request.name).await?;

    let (share, mut changed) = match existing {
        Some(share) if share.filesystem_id != request.filesystem_id => {
            warn!(
                "{} share {} is bound to filesystem {}, requested {}",
                kind, share.name, share.filesystem_id, request.filesystem_id
            );
            let reason = format!(
                "{} share '{}' exists on filesystem {}, requested {}",
                kind, share.name, share.filesystem_id, request.filesystem_id
            );
            return Ok(Outcome::conflict(Some(share), reason));
        }
        Some(share) => {
            let updated = update(api, request, &share).await?;
            (share, updated)
        }
        None => (create(api, request).await?, true),
    };

    if kind == ShareKind::Cifs && !request.authentications.is_empty() {
        changed |= add_authentications(
            api,
            &share.object_id,
            &share.cifs_authentications,
            &request.authentications,
        )
        .await?;
    }

    if !changed {
        return Ok(Outcome::done(false, Some(share)));
    }
    let share = lookup::find_share(api, request.virtual_server_id, kind, &request.name)
        .await?
        .ok_or_else(|| Error::ResourceNotFound {
            kind: format!("{} share", kind),
            name: request.name.clone(),
        })?;
    Ok(Outcome::done(true, Some(share)))
}

/// Delete a share, or only the named SAA entries of a CIFS share
pub async fn ensure_absent(
    api: &dyn StorageApi,
    request: &ShareAbsentRequest,
) -> Result<Outcome<Share>> {
    let kind = request.kind;
    let Some(mut share) =
        lookup::find_share(api, request.virtual_server_id, kind, &request.name).await?
    else {
        debug!("{} share {} already absent", kind, request.name);
        return Ok(Outcome::unchanged_absent());
    };

    if kind == ShareKind::Cifs && !request.authentications.is_empty() {
        let removed = remove_authentications(
            api,
            &share.object_id,
            &share.cifs_authentications,
            &request.authentications,
        )
        .await?;
        if removed {
            share.cifs_authentications = lookup::cifs_authentications(api, &share.object_id).await?;
        }
        return Ok(Outcome::done(removed, Some(share)));
    }

    info!("Deleting {} share {} ({})", kind, share.name, share.object_id);
    api.delete(&format!("filesystem-shares/{}/{}", kind, share.object_id))
        .await?;
    Ok(Outcome::done(true, None))
}

async fn create(api: &dyn StorageApi, request: &ShareRequest) -> Result<Share> {
    if request.name.is_empty() {
        return Err(Error::missing("name"));
    }
    if request.filesystem_id.is_empty() {
        return Err(Error::missing("filesystemId"));
    }
    let path = request
        .filesystem_path
        .as_deref()
        .ok_or_else(|| Error::missing("filesystemPath"))?;

    let settings = request
        .settings
        .overlay(&ShareSettings::defaults_for(request.kind))
        .restrict(request.kind);

    info!(
        "Creating {} share {} on filesystem {} at {}",
        request.kind, request.name, request.filesystem_id, path
    );
    let body = api
        .post(
            &format!("filesystem-shares/{}", request.kind),
            StatusCode::CREATED,
            Some(json!({
                "virtualServerId": request.virtual_server_id,
                "name": request.wire_name(),
                "filesystemId": request.filesystem_id,
                "filesystemPath": path,
                "settings": settings,
            })),
        )
        .await?;
    lookup::member(body, "filesystemShare")
}

/// PATCH the full merged settings when any applicable field or the path differs
async fn update(api: &dyn StorageApi, request: &ShareRequest, share: &Share) -> Result<bool> {
    let kind = request.kind;
    let current = share.settings.clone().restrict(kind);
    let merged = request.settings.overlay(&share.settings).restrict(kind);
    let path = request.filesystem_path.as_deref().unwrap_or(&share.path);

    if merged == current && path == share.path {
        debug!("{} share {} matches request", kind, share.name);
        return Ok(false);
    }

    info!("Updating {} share {} ({})", kind, share.name, share.object_id);
    api.patch(
        &format!("filesystem-shares/{}/{}", kind, share.object_id),
        StatusCode::NO_CONTENT,
        Some(json!({
            "virtualServerId": request.virtual_server_id,
            "name": kind.normalize_name(&request.name),
            "filesystemId": request.filesystem_id,
            "filesystemPath": path,
            "settings": merged,
        })),
    )
    .await?;
    Ok(true)
}

// =============================================================================
// Share Access Authentication
// =============================================================================

/// First existing entry naming the same principal as `name`
pub fn find_authentication<'a>(
    existing: &'a [CifsAuthentication],
    name: &str,
) -> Option<&'a CifsAuthentication> {
    existing.iter().find(|entry| entry.names_principal(name))
}

/// Add the desired entries, replacing matched entries whose permission differs.
///
/// Returns whether any call was made.
pub async fn add_authentications(
    api: &dyn StorageApi,
    share_id: &str,
    existing: &[CifsAuthentication],
    desired: &[CifsAuthentication],
) -> Result<bool> {
    let mut changed = false;

    for entry in desired {
        match find_authentication(existing, &entry.name) {
            Some(current) if entry.permission.is_none() || current.permission == entry.permission => {
                debug!("SAA entry {} on share {} up to date", current.name, share_id);
            }
            Some(current) => {
                info!(
                    "Replacing SAA entry {} on share {} ({:?} -> {:?})",
                    current.name, share_id, current.permission, entry.permission
                );
                delete_authentication(api, share_id, current).await?;
                post_authentication(api, share_id, entry).await?;
                changed = true;
            }
            None => {
                info!("Adding SAA entry {} to share {}", entry.name, share_id);
                post_authentication(api, share_id, entry).await?;
                changed = true;
            }
        }
    }
    Ok(changed)
}

/// Remove the first existing entry naming each of `names`; unmatched names are ignored.
///
/// Returns whether anything was removed.
pub async fn remove_authentications(
    api: &dyn StorageApi,
    share_id: &str,
    existing: &[CifsAuthentication],
    names: &[String],
) -> Result<bool> {
    let mut remaining: Vec<&CifsAuthentication> = existing.iter().collect();
    let mut removed = false;

    for name in names {
        let Some(index) = remaining.iter().position(|entry| entry.names_principal(name)) else {
            debug!("No SAA entry {} on share {}", name, share_id);
            continue;
        };
        let entry = remaining.remove(index);
        info!("Removing SAA entry {} from share {}", entry.name, share_id);
        delete_authentication(api, share_id, entry).await?;
        removed = true;
    }
    Ok(removed)
}

async fn post_authentication(
    api: &dyn StorageApi,
    share_id: &str,
    entry: &CifsAuthentication,
) -> Result<()> {
    let entry = CifsAuthentication {
        encoded_name: None,
        ..entry.clone()
    };
    api.post(
        &format!("filesystem-shares/cifs/{}/authentications", share_id),
        StatusCode::CREATED,
        Some(json!({ "cifsAuthentications": [entry] })),
    )
    .await?;
    Ok(())
}

async fn delete_authentication(
    api: &dyn StorageApi,
    share_id: &str,
    entry: &CifsAuthentication,
) -> Result<()> {
    let encoded = match &entry.encoded_name {
        Some(encoded) => encoded.clone(),
        None => urlencoding::encode(&entry.name).into_owned(),
    };
    api.delete(&format!(
        "filesystem-shares/cifs/{}/authentications/{}",
        share_id, encoded
    ))
    .await
}
