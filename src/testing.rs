//! In-memory storage cluster for tests
//!
//! [`FakeHnas`] implements [`StorageApi`] by routing paths onto local state. It
//! records every call, emulates the server quirks the reconcilers depend on
//! (NFS names gaining a leading `/`, transitional mount statuses, deletes
//! refused while mounted/online) and can be told to fail a given call.

use crate::client::PollPolicy;
use crate::domain::model::{
    CifsAuthentication, EthernetInterface, Filesystem, Share, ShareSettings, StoragePool,
    SystemDrive, VirtualServer, VirtualVolume, VOLUME_NOT_AVAILABLE,
};
use crate::domain::ports::{ShareKind, StorageApi};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Poll policy that never sleeps
pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::ZERO,
        max_attempts: 30,
    }
}

/// Storage pool ids are large integers on real clusters
const POOL_ID_BASE: u64 = 531_346_550_853_280_700;

type Reply = std::result::Result<(StatusCode, Option<Value>), (StatusCode, String)>;

#[derive(Debug, Clone)]
struct Injected {
    method: String,
    path_prefix: String,
    status: StatusCode,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    virtual_servers: Vec<VirtualServer>,
    filesystems: Vec<Filesystem>,
    /// filesystem id -> (target status, fetches left before it settles)
    transitions: BTreeMap<String, (String, u32)>,
    mount_delay: u32,
    mount_unavailable: bool,
    pools: Vec<StoragePool>,
    pool_drives: BTreeMap<String, Vec<u64>>,
    drives: BTreeMap<u64, SystemDrive>,
    shares: Vec<(ShareKind, Share)>,
    authentications: BTreeMap<String, Vec<CifsAuthentication>>,
    volumes: Vec<VirtualVolume>,
    volume_files: BTreeMap<String, u64>,
    interfaces: Vec<EthernetInterface>,
    calls: Vec<String>,
    failures: Vec<Injected>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// Fake storage API backed by in-memory state
pub struct FakeHnas {
    state: Mutex<State>,
}

impl Default for FakeHnas {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHnas {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                mount_delay: 1,
                ..Default::default()
            }),
        }
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    pub fn add_virtual_server(&self, id: u64, name: &str, status: &str, addresses: &[&str]) {
        self.state.lock().virtual_servers.push(VirtualServer {
            object_id: format!("evs-{}", id),
            virtual_server_id: id,
            name: name.into(),
            status: status.into(),
            ip_addresses: addresses.iter().map(|a| a.to_string()).collect(),
            extra: BTreeMap::new(),
        });
    }

    pub fn add_filesystem(&self, label: &str, status: &str, capacity: u64, block_size: u64) -> String {
        let mut state = self.state.lock();
        let id = state.id("fs");
        state.filesystems.push(Filesystem {
            object_id: id.clone(),
            label: label.into(),
            status: status.into(),
            capacity,
            block_size,
            extra: BTreeMap::new(),
        });
        id
    }

    pub fn add_system_drive(&self, id: u64, assigned: bool, access_allowed: bool) {
        self.state.lock().drives.insert(
            id,
            SystemDrive {
                system_drive_id: id,
                is_assigned_to_storage_pool: assigned,
                is_access_allowed: access_allowed,
                extra: BTreeMap::new(),
            },
        );
    }

    pub fn add_storage_pool(&self, label: &str, chunk_size: u64, drives: &[u64]) -> String {
        let mut state = self.state.lock();
        let object_id = state.id("pool");
        let storage_pool_id = POOL_ID_BASE + state.next_id;
        state.pools.push(StoragePool {
            object_id: object_id.clone(),
            storage_pool_id,
            label: label.into(),
            chunk_size,
            extra: BTreeMap::new(),
        });
        for id in drives {
            state
                .drives
                .entry(*id)
                .or_insert_with(|| SystemDrive {
                    system_drive_id: *id,
                    is_assigned_to_storage_pool: true,
                    is_access_allowed: true,
                    extra: BTreeMap::new(),
                })
                .is_assigned_to_storage_pool = true;
        }
        state.pool_drives.insert(object_id.clone(), drives.to_vec());
        object_id
    }

    pub fn add_share(
        &self,
        virtual_server_id: u64,
        kind: ShareKind,
        name: &str,
        filesystem_id: &str,
        path: &str,
    ) -> String {
        let mut state = self.state.lock();
        let id = state.id("share");
        state.shares.push((
            kind,
            Share {
                object_id: id.clone(),
                name: kind.normalize_name(name),
                virtual_server_id,
                filesystem_id: filesystem_id.into(),
                path: path.into(),
                settings: ShareSettings::defaults_for(kind),
                cifs_authentications: Vec::new(),
                extra: BTreeMap::new(),
            },
        ));
        id
    }

    pub fn add_authentication(&self, share_id: &str, name: &str, permission: u32) {
        let mut entry = CifsAuthentication::new(name, permission);
        entry.encoded_name = Some(urlencoding::encode(name).into_owned());
        self.state
            .lock()
            .authentications
            .entry(share_id.to_string())
            .or_default()
            .push(entry);
    }

    pub fn add_virtual_volume(
        &self,
        virtual_server_id: u64,
        filesystem_id: &str,
        name: &str,
        path: &str,
    ) -> String {
        let mut state = self.state.lock();
        let id = state.id("vv");
        state.volumes.push(VirtualVolume {
            object_id: id.clone(),
            name: name.into(),
            virtual_server_id,
            filesystem_id: filesystem_id.into(),
            path: path.into(),
            emails: Vec::new(),
            quota: None,
            extra: BTreeMap::new(),
        });
        id
    }

    pub fn set_volume_file_count(&self, volume_id: &str, files: u64) {
        self.state
            .lock()
            .volume_files
            .insert(volume_id.to_string(), files);
    }

    pub fn add_interface(&self, name: &str, aggregation: bool, virtual_server_ip: bool) {
        self.state.lock().interfaces.push(EthernetInterface {
            name: name.into(),
            is_aggregation_allowed: aggregation,
            is_virtual_server_ip_allowed: virtual_server_ip,
            extra: BTreeMap::new(),
        });
    }

    /// Number of status fetches a mount/unmount stays transitional for
    pub fn set_mount_delay(&self, fetches: u32) {
        self.state.lock().mount_delay = fetches;
    }

    /// Make mounts end in the "volume not available" status
    pub fn set_mount_unavailable(&self, unavailable: bool) {
        self.state.lock().mount_unavailable = unavailable;
    }

    /// Fail every `method` call whose path starts with `path_prefix`
    pub fn fail_on(&self, method: &str, path_prefix: &str, status: StatusCode) {
        self.state.lock().failures.push(Injected {
            method: method.into(),
            path_prefix: path_prefix.into(),
            status,
        });
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Every call made, as `"METHOD path"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls other than GET
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("GET "))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn filesystem(&self, label: &str) -> Option<Filesystem> {
        let state = self.state.lock();
        state.filesystems.iter().find(|f| f.label == label).cloned()
    }

    pub fn virtual_server(&self, name: &str) -> Option<VirtualServer> {
        let state = self.state.lock();
        state.virtual_servers.iter().find(|v| v.name == name).cloned()
    }

    pub fn storage_pool(&self, label: &str) -> Option<StoragePool> {
        let state = self.state.lock();
        state.pools.iter().find(|p| p.label == label).cloned()
    }

    pub fn system_drive(&self, id: u64) -> Option<SystemDrive> {
        self.state.lock().drives.get(&id).cloned()
    }

    pub fn share(&self, kind: ShareKind, name: &str) -> Option<Share> {
        let state = self.state.lock();
        state
            .shares
            .iter()
            .find(|(k, s)| *k == kind && s.name == name)
            .map(|(_, s)| s.clone())
    }

    pub fn authentications(&self, share_id: &str) -> Vec<CifsAuthentication> {
        let state = self.state.lock();
        state.authentications.get(share_id).cloned().unwrap_or_default()
    }

    pub fn virtual_volume(&self, name: &str) -> Option<VirtualVolume> {
        let state = self.state.lock();
        state.volumes.iter().find(|v| v.name == name).cloned()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn call(
        &self,
        method: &str,
        full_path: &str,
        expected: StatusCode,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        let mut state = self.state.lock();
        state.calls.push(format!("{} {}", method, full_path));

        let (path, query) = split_query(full_path);
        let segments: Vec<&str> = path.split('/').collect();

        let injected = state
            .failures
            .iter()
            .find(|f| f.method == method && path.starts_with(&f.path_prefix))
            .cloned();

        let reply = match injected {
            Some(failure) => Err((failure.status, "Injected failure".to_string())),
            None => match method {
                "GET" => route_get(&mut state, &segments, &query),
                "POST" => route_post(&mut state, &segments, body.unwrap_or(Value::Null)),
                "PATCH" => route_patch(&mut state, &segments, body.unwrap_or(Value::Null)),
                "DELETE" => route_delete(&mut state, &segments, &query),
                _ => Err((StatusCode::METHOD_NOT_ALLOWED, "Unsupported method".into())),
            },
        };

        let (status, reply_body) = match reply {
            Ok(ok) => ok,
            Err((status, message)) => (status, Some(json!({ "errorMsg": message }))),
        };

        if status != expected {
            let detail = reply_body
                .as_ref()
                .and_then(|b| b.get("errorMsg"))
                .and_then(Value::as_str)
                .unwrap_or(crate::client::NO_DETAILS)
                .to_string();
            return Err(Error::RemoteCall {
                method: method.into(),
                url: full_path.into(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().into(),
                detail,
            });
        }
        Ok(reply_body)
    }
}

#[async_trait]
impl StorageApi for FakeHnas {
    fn address(&self) -> &str {
        "fake-hnas"
    }

    async fn get(&self, path: &str) -> Result<Value> {
        Ok(self
            .call("GET", path, StatusCode::OK, None)?
            .unwrap_or(Value::Null))
    }

    async fn post(
        &self,
        path: &str,
        expected: StatusCode,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        self.call("POST", path, expected, body)
    }

    async fn patch(
        &self,
        path: &str,
        expected: StatusCode,
        body: Option<Value>,
    ) -> Result<Option<Value>> {
        self.call("PATCH", path, expected, body)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.call("DELETE", path, StatusCode::NO_CONTENT, None)
            .map(|_| ())
    }
}

// =============================================================================
// Routes
// =============================================================================

fn split_query(full_path: &str) -> (&str, BTreeMap<String, String>) {
    let Some((path, query)) = full_path.split_once('?') else {
        return (full_path, BTreeMap::new());
    };
    let params = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let value = urlencoding::decode(v)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| v.to_string());
            (k.to_string(), value)
        })
        .collect();
    (path, params)
}

fn ok(value: Value) -> Reply {
    Ok((StatusCode::OK, Some(value)))
}

fn created(value: Value) -> Reply {
    Ok((StatusCode::CREATED, Some(value)))
}

fn no_content() -> Reply {
    Ok((StatusCode::NO_CONTENT, None))
}

fn not_found(what: &str) -> Reply {
    Err((StatusCode::NOT_FOUND, format!("{} not found", what)))
}

fn conflict(message: &str) -> Reply {
    Err((StatusCode::CONFLICT, message.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn matches(query: &BTreeMap<String, String>, key: &str, actual: &str) -> bool {
    query.get(key).map_or(true, |wanted| wanted == actual)
}

fn advance_transition(state: &mut State, id: &str) {
    let Some((target, left)) = state.transitions.get(id).cloned() else {
        return;
    };
    let status = if left == 0 {
        state.transitions.remove(id);
        target
    } else {
        state.transitions.insert(id.to_string(), (target.clone(), left - 1));
        let transitional = if target == "MOUNTED" { "MOUNTING" } else { "UNMOUNTING" };
        transitional.to_string()
    };
    if let Some(fs) = state.filesystems.iter_mut().find(|f| f.object_id == id) {
        fs.status = status;
    }
}

fn route_get(state: &mut State, segments: &[&str], query: &BTreeMap<String, String>) -> Reply {
    match segments {
        ["file-devices"] => ok(json!({ "name": "fake-hnas", "model": "fake" })),
        ["file-devices", "ethernet-interfaces"] => {
            ok(json!({ "ethernetInterfaces": to_json(&state.interfaces) }))
        }
        ["nodes"] => ok(json!({ "nodes": [{ "nodeId": 1, "name": "node-1" }] })),
        ["virtual-servers"] => {
            let found: Vec<&VirtualServer> = state
                .virtual_servers
                .iter()
                .filter(|v| matches(query, "virtualServerId", &v.virtual_server_id.to_string()))
                .filter(|v| matches(query, "name", &v.name))
                .collect();
            ok(json!({ "virtualServers": to_json(&found) }))
        }
        ["virtual-servers", vs_id, kind] => {
            let Ok(kind) = kind.parse::<ShareKind>() else {
                return not_found("resource");
            };
            let found: Vec<&Share> = state
                .shares
                .iter()
                .filter(|(k, s)| *k == kind && s.virtual_server_id.to_string() == *vs_id)
                .map(|(_, s)| s)
                .filter(|s| matches(query, "name", &s.name))
                .collect();
            ok(json!({ "filesystemShares": to_json(&found) }))
        }
        ["filesystems"] => {
            let found: Vec<&Filesystem> = state
                .filesystems
                .iter()
                .filter(|f| matches(query, "label", &f.label))
                .filter(|f| match (query.get("virtualServerId"), f.extra.get("virtualServerId")) {
                    (Some(wanted), Some(actual)) => wanted == &actual.to_string(),
                    (Some(_), None) => false,
                    (None, _) => true,
                })
                .collect();
            ok(json!({ "filesystems": to_json(&found) }))
        }
        ["filesystems", id] => {
            advance_transition(state, id);
            match state.filesystems.iter().find(|f| f.object_id == *id) {
                Some(fs) => ok(json!({ "filesystem": to_json(fs) })),
                None => not_found("filesystem"),
            }
        }
        ["filesystem-snapshots", id, "null"] => {
            if state.filesystems.iter().any(|f| f.object_id == *id) {
                ok(json!({ "snapshots": [{ "name": "daily", "filesystemId": id }] }))
            } else {
                not_found("filesystem")
            }
        }
        ["storage-pools"] => {
            let found: Vec<&StoragePool> = state
                .pools
                .iter()
                .filter(|p| matches(query, "storagePoolId", &p.storage_pool_id.to_string()))
                .filter(|p| matches(query, "label", &p.label))
                .collect();
            ok(json!({ "storagePools": to_json(&found) }))
        }
        ["storage-pools", id, "system-drives"] => match state.pool_drives.get(*id) {
            Some(ids) => {
                let drives: Vec<&SystemDrive> =
                    ids.iter().filter_map(|d| state.drives.get(d)).collect();
                ok(json!({ "systemDrives": to_json(&drives) }))
            }
            None => not_found("storage pool"),
        },
        ["system-drives"] => {
            let found: Vec<&SystemDrive> = state
                .drives
                .values()
                .filter(|d| matches(query, "systemDriveId", &d.system_drive_id.to_string()))
                .collect();
            ok(json!({ "systemDrives": to_json(&found) }))
        }
        ["filesystem-shares", "cifs", id, "authentications"] => {
            let entries = state.authentications.get(*id).cloned().unwrap_or_default();
            ok(json!({ "cifsAuthentications": to_json(&entries) }))
        }
        ["virtual-volumes"] => {
            let found: Vec<&VirtualVolume> = state
                .volumes
                .iter()
                .filter(|v| matches(query, "virtualServerId", &v.virtual_server_id.to_string()))
                .filter(|v| matches(query, "filesystemId", &v.filesystem_id))
                .filter(|v| matches(query, "name", &v.name))
                .collect();
            ok(json!({ "virtualVolumes": to_json(&found) }))
        }
        _ => not_found("resource"),
    }
}

fn route_post(state: &mut State, segments: &[&str], body: Value) -> Reply {
    match segments {
        ["virtual-servers"] => {
            let id = state
                .virtual_servers
                .iter()
                .map(|v| v.virtual_server_id)
                .max()
                .unwrap_or(0)
                + 1;
            let vs = VirtualServer {
                object_id: format!("evs-{}", id),
                virtual_server_id: id,
                name: body["name"].as_str().unwrap_or_default().into(),
                status: "ONLINE".into(),
                ip_addresses: body["ipAddress"].as_str().into_iter().map(String::from).collect(),
                extra: BTreeMap::new(),
            };
            state.virtual_servers.push(vs.clone());
            created(json!({ "virtualServer": to_json(&vs) }))
        }
        ["virtual-servers", object_id, action @ ("enable" | "disable")] => {
            match state.virtual_servers.iter_mut().find(|v| v.object_id == *object_id) {
                Some(vs) => {
                    vs.status = if *action == "enable" { "ONLINE" } else { "DISABLED" }.into();
                    no_content()
                }
                None => not_found("virtual server"),
            }
        }
        ["virtual-servers", vs_id, "ip-addresses"] => {
            match state
                .virtual_servers
                .iter_mut()
                .find(|v| v.virtual_server_id.to_string() == *vs_id)
            {
                Some(vs) => {
                    let address = body["ipAddress"].as_str().unwrap_or_default().to_string();
                    if body["mask"].is_null() || body["port"].is_null() {
                        return Err((StatusCode::BAD_REQUEST, "mask and port required".into()));
                    }
                    vs.ip_addresses.push(address);
                    no_content()
                }
                None => not_found("virtual server"),
            }
        }
        ["filesystems"] => {
            if !body["storagePoolId"].is_u64() || !body["virtualServerId"].is_u64() {
                return Err((StatusCode::BAD_REQUEST, "ids must be integers".into()));
            }
            let id = state.id("fs");
            let mut extra = BTreeMap::new();
            extra.insert("virtualServerId".into(), body["virtualServerId"].clone());
            extra.insert("storagePoolId".into(), body["storagePoolId"].clone());
            let fs = Filesystem {
                object_id: id,
                label: body["label"].as_str().unwrap_or_default().into(),
                status: "NOT_MOUNTED".into(),
                capacity: body["capacity"].as_u64().unwrap_or(0),
                block_size: 0,
                extra,
            };
            state.filesystems.push(fs.clone());
            created(json!({ "filesystem": to_json(&fs) }))
        }
        ["filesystems", id, action @ ("mount" | "unmount")] => {
            let target = if *action == "mount" { "MOUNTED" } else { "NOT_MOUNTED" };
            let delay = state.mount_delay;
            let unavailable = state.mount_unavailable && *action == "mount";
            let Some(fs) = state.filesystems.iter_mut().find(|f| f.object_id == *id) else {
                return not_found("filesystem");
            };
            if unavailable {
                fs.status = VOLUME_NOT_AVAILABLE.into();
            } else if delay == 0 {
                fs.status = target.into();
            } else {
                state
                    .transitions
                    .insert(id.to_string(), (target.to_string(), delay));
            }
            no_content()
        }
        ["filesystems", id, "format"] => {
            match state.filesystems.iter_mut().find(|f| f.object_id == *id) {
                Some(fs) if fs.block_size != 0 => conflict("Filesystem already formatted"),
                Some(fs) => {
                    fs.block_size = body["blockSize"].as_u64().unwrap_or(4) * 1024;
                    no_content()
                }
                None => not_found("filesystem"),
            }
        }
        ["filesystems", id, "expand"] => {
            match state.filesystems.iter_mut().find(|f| f.object_id == *id) {
                Some(fs) => {
                    let capacity = body["capacity"].as_u64().unwrap_or(0);
                    if capacity < fs.capacity {
                        return Err((StatusCode::BAD_REQUEST, "Cannot shrink".into()));
                    }
                    fs.capacity = capacity;
                    no_content()
                }
                None => not_found("filesystem"),
            }
        }
        ["storage-pools"] => {
            let drives: Vec<u64> = body["systemDrives"]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_u64).collect())
                .unwrap_or_default();
            if drives.len() < 4 {
                return Err((StatusCode::BAD_REQUEST, "Need 4 system drives".into()));
            }
            for id in &drives {
                match state.drives.get(id) {
                    Some(d) if d.is_assigned_to_storage_pool => {
                        return conflict("System drive in use");
                    }
                    Some(d) if !d.is_access_allowed => {
                        return conflict("System drive access denied");
                    }
                    Some(_) => {}
                    None => return not_found("system drive"),
                }
            }
            let object_id = state.id("pool");
            let pool = StoragePool {
                object_id: object_id.clone(),
                storage_pool_id: POOL_ID_BASE + state.next_id,
                label: body["label"].as_str().unwrap_or_default().into(),
                chunk_size: body["chunkSize"].as_u64().unwrap_or(0),
                extra: BTreeMap::new(),
            };
            for id in &drives {
                if let Some(d) = state.drives.get_mut(id) {
                    d.is_assigned_to_storage_pool = true;
                }
            }
            state.pool_drives.insert(object_id, drives);
            state.pools.push(pool.clone());
            created(json!({ "storagePool": to_json(&pool) }))
        }
        ["filesystem-shares", kind] => {
            let Ok(kind) = kind.parse::<ShareKind>() else {
                return not_found("resource");
            };
            let name = body["name"].as_str().unwrap_or_default();
            let name = kind.normalize_name(name);
            let settings: ShareSettings =
                serde_json::from_value(body["settings"].clone()).unwrap_or_default();
            let share = Share {
                object_id: state.id("share"),
                name,
                virtual_server_id: body["virtualServerId"].as_u64().unwrap_or(0),
                filesystem_id: body["filesystemId"].as_str().unwrap_or_default().into(),
                path: body["filesystemPath"].as_str().unwrap_or_default().into(),
                settings,
                cifs_authentications: Vec::new(),
                extra: BTreeMap::new(),
            };
            state.shares.push((kind, share.clone()));
            created(json!({ "filesystemShare": to_json(&share) }))
        }
        ["filesystem-shares", "cifs", id, "authentications"] => {
            if !state.shares.iter().any(|(_, s)| s.object_id == *id) {
                return not_found("share");
            }
            let entries: Vec<CifsAuthentication> =
                serde_json::from_value(body["cifsAuthentications"].clone()).unwrap_or_default();
            let list = state.authentications.entry(id.to_string()).or_default();
            for mut entry in entries {
                if list.iter().any(|e| e.name == entry.name) {
                    return conflict("Authentication already present");
                }
                entry.encoded_name = Some(urlencoding::encode(&entry.name).into_owned());
                list.push(entry);
            }
            created(json!({}))
        }
        ["virtual-volumes"] => {
            let volume = VirtualVolume {
                object_id: state.id("vv"),
                name: body["name"].as_str().unwrap_or_default().into(),
                virtual_server_id: body["virtualServerId"].as_u64().unwrap_or(0),
                filesystem_id: body["filesystemId"].as_str().unwrap_or_default().into(),
                path: body["path"].as_str().unwrap_or_default().into(),
                emails: serde_json::from_value(body["emails"].clone()).unwrap_or_default(),
                quota: serde_json::from_value(body["quota"].clone()).unwrap_or_default(),
                extra: BTreeMap::new(),
            };
            state.volumes.push(volume.clone());
            created(json!({ "virtualVolume": to_json(&volume) }))
        }
        _ => not_found("resource"),
    }
}

fn route_patch(state: &mut State, segments: &[&str], body: Value) -> Reply {
    match segments {
        ["system-drives", id] => {
            match state.drives.values_mut().find(|d| d.system_drive_id.to_string() == *id) {
                Some(drive) => {
                    if body["enableAccess"].as_bool() == Some(true) {
                        drive.is_access_allowed = true;
                    }
                    no_content()
                }
                None => not_found("system drive"),
            }
        }
        ["filesystem-shares", _, id] => {
            match state.shares.iter_mut().find(|(_, s)| s.object_id == *id) {
                Some((kind, share)) => {
                    if let Some(name) = body["name"].as_str() {
                        share.name = name.into();
                    }
                    if let Some(path) = body["filesystemPath"].as_str() {
                        share.path = path.into();
                    }
                    let wanted: ShareSettings =
                        serde_json::from_value(body["settings"].clone()).unwrap_or_default();
                    share.settings = wanted.overlay(&share.settings).restrict(*kind);
                    no_content()
                }
                None => not_found("share"),
            }
        }
        ["virtual-volumes", id] => {
            match state.volumes.iter_mut().find(|v| v.object_id == *id) {
                Some(volume) => {
                    if let Ok(emails) = serde_json::from_value(body["emails"].clone()) {
                        volume.emails = emails;
                    }
                    if let Ok(Some(quota)) = serde_json::from_value(body["quota"].clone()) {
                        volume.quota = Some(quota);
                    }
                    no_content()
                }
                None => not_found("virtual volume"),
            }
        }
        _ => not_found("resource"),
    }
}

fn route_delete(state: &mut State, segments: &[&str], query: &BTreeMap<String, String>) -> Reply {
    match segments {
        ["virtual-servers", vs_id, "ip-addresses", address] => {
            match state
                .virtual_servers
                .iter_mut()
                .find(|v| v.virtual_server_id.to_string() == *vs_id)
            {
                Some(vs) if vs.ip_addresses.len() <= 1 => conflict("Cannot remove last address"),
                Some(vs) => {
                    let address = urlencoding::decode(address)
                        .map(|a| a.into_owned())
                        .unwrap_or_else(|_| address.to_string());
                    vs.ip_addresses.retain(|a| *a != address);
                    no_content()
                }
                None => not_found("virtual server"),
            }
        }
        ["virtual-servers", vs_id] => {
            match state
                .virtual_servers
                .iter()
                .position(|v| v.virtual_server_id.to_string() == *vs_id)
            {
                Some(i) if state.virtual_servers[i].status != "DISABLED" => {
                    conflict("Virtual server must be disabled")
                }
                Some(i) => {
                    state.virtual_servers.remove(i);
                    no_content()
                }
                None => not_found("virtual server"),
            }
        }
        ["filesystems", id] => {
            match state.filesystems.iter().position(|f| f.object_id == *id) {
                Some(i) if state.filesystems[i].status != "NOT_MOUNTED" => {
                    conflict("Filesystem is mounted")
                }
                Some(i) => {
                    state.filesystems.remove(i);
                    no_content()
                }
                None => not_found("filesystem"),
            }
        }
        ["storage-pools", id] => match state.pools.iter().position(|p| p.object_id == *id) {
            Some(i) => {
                state.pools.remove(i);
                for drive in state.pool_drives.remove(*id).unwrap_or_default() {
                    if let Some(d) = state.drives.get_mut(&drive) {
                        d.is_assigned_to_storage_pool = false;
                    }
                }
                no_content()
            }
            None => not_found("storage pool"),
        },
        ["filesystem-shares", "cifs", id, "authentications", encoded] => {
            let list = state.authentications.entry(id.to_string()).or_default();
            let before = list.len();
            list.retain(|e| e.encoded_name.as_deref() != Some(*encoded));
            if list.len() == before {
                not_found("authentication")
            } else {
                no_content()
            }
        }
        ["filesystem-shares", _, id] => {
            match state.shares.iter().position(|(_, s)| s.object_id == *id) {
                Some(i) => {
                    state.shares.remove(i);
                    state.authentications.remove(*id);
                    no_content()
                }
                None => not_found("share"),
            }
        }
        ["virtual-volumes", id] => {
            let remove_content = query.get("removeContent").map(String::as_str) == Some("true");
            let files = state.volume_files.get(*id).copied().unwrap_or(0);
            match state.volumes.iter().position(|v| v.object_id == *id) {
                Some(_) if files > 0 && !remove_content => conflict("Virtual volume is not empty"),
                Some(i) => {
                    state.volumes.remove(i);
                    no_content()
                }
                None => not_found("virtual volume"),
            }
        }
        _ => not_found("resource"),
    }
}
