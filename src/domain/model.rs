//! Remote records as returned by the storage REST API
//!
//! Only the fields the reconciler reasons about are typed; everything else the
//! server sends is kept in `extra` so records can be echoed back to callers
//! unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::ports::ShareKind;

/// Status reported while the backing storage of a filesystem is unavailable.
/// Seeing it ends a mount/unmount wait early.
pub const VOLUME_NOT_AVAILABLE: &str = "VOLUME_NOT_AVAILABLE_TO_BS";

// =============================================================================
// Virtual Server
// =============================================================================

/// Virtual server (EVS) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServer {
    pub object_id: String,
    pub virtual_server_id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// =============================================================================
// Filesystem
// =============================================================================

/// Filesystem record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filesystem {
    pub object_id: String,
    pub label: String,
    pub status: String,
    pub capacity: u64,
    /// Block size in bytes, 0 while unformatted
    pub block_size: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Filesystem {
    pub fn is_formatted(&self) -> bool {
        self.block_size != 0
    }
}

// =============================================================================
// Storage Pool & System Drives
// =============================================================================

/// Storage pool record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePool {
    pub object_id: String,
    pub storage_pool_id: u64,
    pub label: String,
    pub chunk_size: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// System drive record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDrive {
    pub system_drive_id: u64,
    #[serde(default)]
    pub is_assigned_to_storage_pool: bool,
    #[serde(default = "default_true")]
    pub is_access_allowed: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Shares & Exports
// =============================================================================

/// Filesystem share (CIFS) or export (NFS) record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub object_id: String,
    pub name: String,
    pub virtual_server_id: u64,
    pub filesystem_id: String,
    pub path: String,
    #[serde(default)]
    pub settings: ShareSettings,
    /// Access authentications, CIFS only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cifs_authentications: Vec<CifsAuthentication>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Share settings bag.
///
/// Every field is optional: in a desired-state request `None` means "leave as
/// is"; on a record the fields that apply to the share's kind are populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_to_replication_target_setting: Option<String>,

    // NFS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_read_cache_option: Option<String>,

    // CIFS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_home_directory_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_home_directory_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_scan_for_viruses_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_users: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_follow_symbolic_links: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_follow_global_symbolic_links: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_force_file_name_to_lowercase: Option<bool>,
    #[serde(rename = "isABEEnabled", skip_serializing_if = "Option::is_none")]
    pub is_abe_enabled: Option<bool>,
}

impl ShareSettings {
    /// Settings applied to a newly created share when the request leaves them unset
    pub fn defaults_for(kind: ShareKind) -> Self {
        let common = Self {
            access_config: Some(String::new()),
            snapshot_option: Some("SHOW_AND_ALLOW_ACCESS".to_string()),
            transfer_to_replication_target_setting: Some("USE_FS_DEFAULT".to_string()),
            ..Default::default()
        };
        match kind {
            ShareKind::Nfs => Self {
                local_read_cache_option: Some("DISABLED".to_string()),
                ..common
            },
            ShareKind::Cifs => Self {
                comment: Some(String::new()),
                user_home_directory_path: Some(String::new()),
                user_home_directory_mode: Some("OFF".to_string()),
                is_scan_for_viruses_enabled: Some(false),
                max_concurrent_users: Some(-1),
                cache_option: Some("MANUAL_CACHING_DOCS".to_string()),
                is_follow_symbolic_links: Some(false),
                is_follow_global_symbolic_links: Some(false),
                is_force_file_name_to_lowercase: Some(false),
                is_abe_enabled: Some(false),
                ..common
            },
        }
    }

    /// Fill every unset field of `self` from `base`
    pub fn overlay(&self, base: &ShareSettings) -> ShareSettings {
        fn pick<T: Clone>(wanted: &Option<T>, base: &Option<T>) -> Option<T> {
            wanted.clone().or_else(|| base.clone())
        }

        ShareSettings {
            access_config: pick(&self.access_config, &base.access_config),
            snapshot_option: pick(&self.snapshot_option, &base.snapshot_option),
            transfer_to_replication_target_setting: pick(
                &self.transfer_to_replication_target_setting,
                &base.transfer_to_replication_target_setting,
            ),
            local_read_cache_option: pick(
                &self.local_read_cache_option,
                &base.local_read_cache_option,
            ),
            comment: pick(&self.comment, &base.comment),
            user_home_directory_path: pick(
                &self.user_home_directory_path,
                &base.user_home_directory_path,
            ),
            user_home_directory_mode: pick(
                &self.user_home_directory_mode,
                &base.user_home_directory_mode,
            ),
            is_scan_for_viruses_enabled: pick(
                &self.is_scan_for_viruses_enabled,
                &base.is_scan_for_viruses_enabled,
            ),
            max_concurrent_users: pick(&self.max_concurrent_users, &base.max_concurrent_users),
            cache_option: pick(&self.cache_option, &base.cache_option),
            is_follow_symbolic_links: pick(
                &self.is_follow_symbolic_links,
                &base.is_follow_symbolic_links,
            ),
            is_follow_global_symbolic_links: pick(
                &self.is_follow_global_symbolic_links,
                &base.is_follow_global_symbolic_links,
            ),
            is_force_file_name_to_lowercase: pick(
                &self.is_force_file_name_to_lowercase,
                &base.is_force_file_name_to_lowercase,
            ),
            is_abe_enabled: pick(&self.is_abe_enabled, &base.is_abe_enabled),
        }
    }

    /// Drop the fields that do not apply to `kind`
    pub fn restrict(mut self, kind: ShareKind) -> ShareSettings {
        match kind {
            ShareKind::Nfs => {
                self.comment = None;
                self.user_home_directory_path = None;
                self.user_home_directory_mode = None;
                self.is_scan_for_viruses_enabled = None;
                self.max_concurrent_users = None;
                self.cache_option = None;
                self.is_follow_symbolic_links = None;
                self.is_follow_global_symbolic_links = None;
                self.is_force_file_name_to_lowercase = None;
                self.is_abe_enabled = None;
            }
            ShareKind::Cifs => {
                self.local_read_cache_option = None;
            }
        }
        self
    }
}

/// Share access authentication (SAA) entry of a CIFS share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CifsAuthentication {
    /// Principal name, optionally domain qualified
    pub name: String,
    /// Permission bitmask
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<u32>,
    /// Principal type (user, group, ...)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub principal_type: Option<String>,
    /// URL-safe name assigned by the server, used to address the entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_name: Option<String>,
}

impl CifsAuthentication {
    pub fn new(name: impl Into<String>, permission: u32) -> Self {
        Self {
            name: name.into(),
            permission: Some(permission),
            principal_type: None,
            encoded_name: None,
        }
    }

    /// Whether `self` (an existing entry) names the same principal as `wanted`.
    ///
    /// Matches exactly, or when the existing name ends with the wanted name
    /// case-insensitively, so `DOMAIN\bob` matches `bob`.
    pub fn names_principal(&self, wanted: &str) -> bool {
        self.name == wanted || self.name.to_lowercase().ends_with(&wanted.to_lowercase())
    }
}

// =============================================================================
// Virtual Volumes & Quotas
// =============================================================================

/// Virtual volume record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualVolume {
    pub object_id: String,
    pub name: String,
    pub virtual_server_id: u64,
    pub filesystem_id: String,
    pub path: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Quota>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Quota attached to a virtual volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quota {
    pub log_event: bool,
    pub disk_usage_threshold: Threshold,
    pub file_count_threshold: Threshold,
}

/// One quota limit with its event thresholds (percentages)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Threshold {
    pub is_hard: bool,
    pub limit: u64,
    pub severe: u32,
    pub warning: u32,
    pub reset: u32,
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            is_hard: true,
            limit: 0,
            severe: 0,
            warning: 0,
            reset: 5,
        }
    }
}

// =============================================================================
// Network Interfaces
// =============================================================================

/// Ethernet interface of the file server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthernetInterface {
    pub name: String,
    #[serde(default)]
    pub is_aggregation_allowed: bool,
    #[serde(default)]
    pub is_virtual_server_ip_allowed: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}
