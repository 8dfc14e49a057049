//! RPC method dispatch (C12, §4.8): decodes each request's JSON payload,
//! drives the relevant domain crates, streams `ReplyMessage`s, and returns
//! the terminal `RpcStatus`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{ByteSize, FleetError, NullProgressSink};
use fleet_dispatch::{boxed, send_progress, try_action_for};
use fleet_manifest::ImageQuery;
use fleet_mount::{ClassicMountHandler, MountSpec, MountType, NativeMountHandler};
use fleet_registry::InstanceRecord;
use fleet_rpc::message::{LaunchProgressKind, ReplyMessage, RequestEnvelope, RpcMethod, RpcStatus};
use fleet_settings::SettingsHandler;
use fleet_vm::VmState;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;

use crate::state::AppState;

const DEFAULT_CPUS: u32 = 1;
const DEFAULT_MEM: ByteSize = ByteSize::from_gib(1);
const DEFAULT_DISK: ByteSize = ByteSize::from_gib(5);
const READY_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
struct NameRequest {
    name: String,
}

#[derive(Deserialize)]
struct NamesRequest {
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Deserialize)]
struct LaunchRequest {
    image: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    cpus: Option<u32>,
    #[serde(default)]
    mem: Option<String>,
    #[serde(default)]
    disk: Option<String>,
}

#[derive(Deserialize)]
struct GetSetRequest {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct MountRequest {
    instance: String,
    target: String,
    source: String,
    #[serde(default)]
    mount_type: Option<String>,
}

#[derive(Deserialize)]
struct UmountRequest {
    instance: String,
    target: String,
}

#[derive(Deserialize)]
struct CloneRequest {
    source: String,
    #[serde(default)]
    destination: Option<String>,
}

#[derive(Deserialize)]
struct SnapshotRequest {
    instance: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    comment: String,
}

#[derive(Deserialize)]
struct RestoreRequest {
    instance: String,
    snapshot: String,
    #[serde(default)]
    destructive: bool,
}

#[derive(Deserialize)]
struct AuthenticateRequest {
    passphrase: String,
    client_cert_pem: String,
}

#[derive(Serialize)]
struct InstanceSummary {
    name: String,
    state: String,
}

/// Dispatch one request, streaming replies through `reply_tx`, returning the
/// terminal status. Errors from domain crates are converted to a status via
/// `RpcStatus::from_error`; anything else (a bug) becomes `Internal` (§7's
/// "blanket top-level catch").
pub async fn dispatch(state: Arc<AppState>, req: RequestEnvelope, reply_tx: mpsc::Sender<ReplyMessage>) -> RpcStatus {
    match run(&state, &req, &reply_tx).await {
        Ok(status) => status,
        Err(err) => RpcStatus::from_error(&err),
    }
}

async fn run(state: &Arc<AppState>, req: &RequestEnvelope, reply_tx: &mpsc::Sender<ReplyMessage>) -> Result<RpcStatus, FleetError> {
    match req.method {
        RpcMethod::Ping => Ok(RpcStatus::ok()),
        RpcMethod::Version => version(state),
        RpcMethod::DaemonInfo => daemon_info(state),
        RpcMethod::Authenticate => authenticate(state, req).await,
        RpcMethod::Keys => keys(state),
        RpcMethod::Get => get_setting(state, req),
        RpcMethod::Set => set_setting(state, req),
        RpcMethod::List => list(state),
        RpcMethod::Info => info(state, req),
        RpcMethod::Find => find(state, req).await,
        RpcMethod::Networks => networks(state),
        RpcMethod::SshInfo => ssh_info(state, req).await,
        RpcMethod::Launch | RpcMethod::Create => launch(state, req, reply_tx).await,
        RpcMethod::Start => start(state, req).await,
        RpcMethod::Stop => stop(state, req, false).await,
        RpcMethod::Suspend => suspend(state, req).await,
        RpcMethod::Restart => restart(state, req).await,
        RpcMethod::Delete => delete(state, req),
        RpcMethod::Recover => recover(state, req),
        RpcMethod::Purge => purge(state, req).await,
        RpcMethod::Mount => mount(state, req).await,
        RpcMethod::Umount => umount(state, req).await,
        RpcMethod::Clone => clone_instance(state, req).await,
        RpcMethod::Snapshot => snapshot(state, req),
        RpcMethod::Restore => restore(state, req).await,
    }
}

fn version(_state: &Arc<AppState>) -> Result<RpcStatus, FleetError> {
    Ok(RpcStatus::ok().with_target_details(vec![]))
}

fn daemon_info(state: &Arc<AppState>) -> Result<RpcStatus, FleetError> {
    let instances = state.instances.lock().unwrap();
    Ok(RpcStatus {
        message: format!(
            "{} operative, {} deleted instances",
            instances.operative_names().len(),
            instances.deleted_names().len()
        ),
        ..RpcStatus::ok()
    })
}

async fn authenticate(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: AuthenticateRequest = parse_payload(req)?;
    if !state.passphrase.verify(&payload.passphrase) {
        return Err(FleetError::InstanceSettings {
            message: "incorrect passphrase".to_string(),
        });
    }
    state
        .auth_gate
        .trust_client(payload.client_cert_pem.as_bytes())
        .await
        .map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

fn keys(state: &Arc<AppState>) -> Result<RpcStatus, FleetError> {
    let mut keys: Vec<String> = state.settings.keys().into_iter().collect();
    keys.sort();
    Ok(RpcStatus {
        message: json!(keys).to_string(),
        ..RpcStatus::ok()
    })
}

fn get_setting(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: GetSetRequest = parse_payload(req)?;
    let value = state.settings.get(&payload.key)?;
    Ok(RpcStatus {
        message: value,
        ..RpcStatus::ok()
    })
}

fn set_setting(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: GetSetRequest = parse_payload(req)?;
    let value = payload.value.unwrap_or_default();
    state.settings.set(&payload.key, &value)?;
    Ok(RpcStatus::ok())
}

fn list(state: &Arc<AppState>) -> Result<RpcStatus, FleetError> {
    let instances = state.instances.lock().unwrap();
    let summaries: Vec<InstanceSummary> = instances
        .operative_names()
        .into_iter()
        .filter_map(|name| {
            instances.get_operative(&name).map(|r| InstanceSummary {
                name: r.name.clone(),
                state: r.state.to_string(),
            })
        })
        .collect();
    Ok(RpcStatus {
        message: json!(summaries).to_string(),
        ..RpcStatus::ok()
    })
}

fn info(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NameRequest = parse_payload(req)?;
    let instances = state.instances.lock().unwrap();
    let record = instances
        .get_operative(&payload.name)
        .ok_or_else(|| FleetError::InstanceSettings {
            message: format!("no such instance '{}'", payload.name),
        })?;
    Ok(RpcStatus {
        message: serde_json::to_string(record).unwrap_or_default(),
        ..RpcStatus::ok()
    })
}

async fn find(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NameRequest = parse_payload(req)?;
    let manifest = state.manifest.lock().await;
    let record = manifest.info_for(&ImageQuery::alias(&payload.name))?;
    Ok(RpcStatus {
        message: serde_json::to_string(&record).unwrap_or_default(),
        ..RpcStatus::ok()
    })
}

fn networks(state: &Arc<AppState>) -> Result<RpcStatus, FleetError> {
    Ok(RpcStatus {
        message: json!(state.backend.networks()).to_string(),
        ..RpcStatus::ok()
    })
}

async fn ssh_info(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NameRequest = parse_payload(req)?;
    let vms = state.vms.lock().await;
    let vm = vms.get(&payload.name).ok_or_else(|| FleetError::InstanceSettings {
        message: format!("instance '{}' is not running", payload.name),
    })?;
    Ok(RpcStatus {
        message: json!({
            "hostname": vm.ssh_hostname(),
            "port": vm.ssh_port(),
        })
        .to_string(),
        ..RpcStatus::ok()
    })
}

/// Steps 1-6 of §4.8's launch pipeline.
async fn launch(state: &Arc<AppState>, req: &RequestEnvelope, reply_tx: &mpsc::Sender<ReplyMessage>) -> Result<RpcStatus, FleetError> {
    let payload: LaunchRequest = parse_payload(req)?;

    let name = payload.name.clone().unwrap_or_else(|| payload.image.clone());
    fleet_core::hostname::is_valid_hostname(&name)
        .then_some(())
        .ok_or_else(|| FleetError::InvalidHostname { name: name.clone() })?;

    {
        let mut instances = state.instances.lock().unwrap();
        if instances.is_name_taken(&name) {
            return Err(FleetError::InvalidSetting {
                message: format!("instance '{}' already exists", name),
            });
        }
        instances.reserve_preparing(&name);
    }

    let result = launch_inner(state, &payload, &name, reply_tx).await;

    if result.is_err() {
        let mut instances = state.instances.lock().unwrap();
        instances.release_preparing(&name);
    }
    result
}

async fn launch_inner(
    state: &Arc<AppState>,
    payload: &LaunchRequest,
    name: &str,
    reply_tx: &mpsc::Sender<ReplyMessage>,
) -> Result<RpcStatus, FleetError> {
    send_progress(
        reply_tx,
        ReplyMessage::LaunchProgress {
            percent: None,
            kind: LaunchProgressKind::ImageDownload,
        },
    )
    .await;

    let record = {
        let manifest = state.manifest.lock().await;
        manifest.info_for(&ImageQuery::alias(&payload.image))?
    };

    state
        .vault
        .fetch_image(&record, &fleet_vault::NullPrepareAction, &NullProgressSink)
        .await
        .map_err(|e| FleetError::CreateImageException { message: e.to_string() })?;

    send_progress(
        reply_tx,
        ReplyMessage::LaunchProgress {
            percent: Some(100),
            kind: LaunchProgressKind::Preparing,
        },
    )
    .await;

    let mac = {
        let mut allocator = state.mac_allocator.lock().unwrap();
        allocator.generate()?
    };

    let num_cores = payload.cpus.unwrap_or(DEFAULT_CPUS);
    let mem_size = match &payload.mem {
        Some(raw) => ByteSize::parse(raw).map_err(|_| FleetError::InvalidMemorySize { message: raw.clone() })?,
        None => DEFAULT_MEM,
    };
    let disk_space = match &payload.disk {
        Some(raw) => ByteSize::parse(raw).map_err(|_| FleetError::InvalidDiskSize { message: raw.clone() })?,
        None => DEFAULT_DISK,
    };

    let vm_result = state.backend.create_vm(name, num_cores, mem_size, disk_space).await;
    let vm = match vm_result {
        Ok(vm) => vm,
        Err(e) => {
            let mut allocator = state.mac_allocator.lock().unwrap();
            allocator.release(&mac);
            return Err(FleetError::StartException {
                name: name.to_string(),
                message: e.to_string(),
            });
        }
    };

    let record = InstanceRecord {
        name: name.to_string(),
        num_cores,
        mem_size,
        disk_space,
        default_mac_address: mac,
        extra_interfaces: Vec::new(),
        ssh_username: "ubuntu".to_string(),
        state: VmState::Off,
        mounts: BTreeMap::new(),
        deleted: false,
        metadata: serde_json::Value::Null,
        clone_count: 0,
    };

    {
        let mut instances = state.instances.lock().unwrap();
        instances.insert_operative(record);
        instances.release_preparing(name);
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;

    send_progress(
        reply_tx,
        ReplyMessage::LaunchProgress {
            percent: None,
            kind: LaunchProgressKind::WaitingForSsh,
        },
    )
    .await;

    start_vm_and_wait(state, name, vm).await?;

    send_progress(reply_tx, ReplyMessage::ReplyMessage { text: format!("Launched {}", name) }).await;
    Ok(RpcStatus::ok())
}

async fn start_vm_and_wait(state: &Arc<AppState>, name: &str, vm: Box<dyn fleet_vm::backend::VirtualMachine>) -> Result<(), FleetError> {
    vm.start().await.map_err(|e| FleetError::StartException {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    state.vms.lock().await.insert(name.to_string(), vm);

    let waiter = {
        let poll_state = Arc::clone(state);
        let poll_name = name.to_string();
        state
            .start_coalescer
            .wait_for_ready(name, move || {
                boxed(async move {
                    let deadline = tokio::time::Instant::now() + READY_DEADLINE;
                    try_action_for(deadline, || {
                        let state = Arc::clone(&poll_state);
                        let name = poll_name.clone();
                        async move {
                            let vms = state.vms.lock().await;
                            Ok(vms.get(&name).map(|vm| vm.current_state() == VmState::Running).unwrap_or(false))
                        }
                    })
                    .await
                })
            })
            .await
    };

    waiter.await?;
    state.start_coalescer.clear(name).await;

    let mut instances = state.instances.lock().unwrap();
    if let Some(record) = instances.get_operative_mut(name) {
        record.state = VmState::Running;
    }
    drop(instances);
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(())
}

async fn start(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NamesRequest = parse_payload(req)?;
    for name in &payload.names {
        let current_state = {
            let instances = state.instances.lock().unwrap();
            instances
                .get_operative(name)
                .ok_or_else(|| FleetError::InstanceSettings {
                    message: format!("no such instance '{}'", name),
                })?
                .state
        };
        fleet_vm::validate_transition(current_state, fleet_vm::state::VmEventKind::Start)?;

        let already_running = state.vms.lock().await.contains_key(name);
        if !already_running {
            let (cores, mem, disk) = {
                let instances = state.instances.lock().unwrap();
                let r = instances.get_operative(name).unwrap();
                (r.num_cores, r.mem_size, r.disk_space)
            };
            let vm = state
                .backend
                .create_vm(name, cores, mem, disk)
                .await
                .map_err(|e| FleetError::StartException { name: name.clone(), message: e.to_string() })?;
            start_vm_and_wait(state, name, vm).await?;
        }
    }
    Ok(RpcStatus::ok())
}

async fn stop(state: &Arc<AppState>, req: &RequestEnvelope, force: bool) -> Result<RpcStatus, FleetError> {
    let payload: NamesRequest = parse_payload(req)?;
    for name in &payload.names {
        state.delayed_shutdown.cancel(name).await;
        if let Some(vm) = state.vms.lock().await.remove(name) {
            vm.shutdown().await.map_err(|e| FleetError::StartException { name: name.clone(), message: e.to_string() })?;
        }
        let mut instances = state.instances.lock().unwrap();
        if let Some(record) = instances.get_operative_mut(name) {
            record.state = VmState::Stopped;
        }
        let _ = force;
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

async fn suspend(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NamesRequest = parse_payload(req)?;
    for name in &payload.names {
        // §4.6's resolved design note: suspend cancels any pending delayed-shutdown timer.
        state.delayed_shutdown.cancel(name).await;
        let vms = state.vms.lock().await;
        if let Some(vm) = vms.get(name) {
            vm.suspend().await.map_err(|e| FleetError::StartException { name: name.clone(), message: e.to_string() })?;
        }
        drop(vms);
        let mut instances = state.instances.lock().unwrap();
        if let Some(record) = instances.get_operative_mut(name) {
            record.state = VmState::Suspended;
        }
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

async fn restart(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NamesRequest = parse_payload(req)?;
    for name in &payload.names {
        let vms = state.vms.lock().await;
        if let Some(vm) = vms.get(name) {
            vm.shutdown().await.ok();
            vm.start().await.map_err(|e| FleetError::StartException { name: name.clone(), message: e.to_string() })?;
        }
    }
    Ok(RpcStatus::ok())
}

fn delete(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NamesRequest = parse_payload(req)?;
    let mut instances = state.instances.lock().unwrap();
    for name in &payload.names {
        instances.soft_delete(name);
    }
    drop(instances);
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

fn recover(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NamesRequest = parse_payload(req)?;
    let mut instances = state.instances.lock().unwrap();
    for name in &payload.names {
        instances.recover(name);
    }
    drop(instances);
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

async fn purge(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: NamesRequest = parse_payload(req)?;
    let removed: Vec<InstanceRecord> = {
        let mut instances = state.instances.lock().unwrap();
        payload.names.iter().filter_map(|name| instances.purge(name)).collect()
    };
    for record in &removed {
        let mut allocator = state.mac_allocator.lock().unwrap();
        for mac in record.all_macs() {
            allocator.release(mac);
        }
        state.snapshots.lock().unwrap().remove(&record.name);
        state.mounts.lock().unwrap().remove(&record.name);
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

async fn mount(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: MountRequest = parse_payload(req)?;
    {
        let instances = state.instances.lock().unwrap();
        instances.get_operative(&payload.instance).ok_or_else(|| FleetError::InstanceSettings {
            message: format!("no such instance '{}'", payload.instance),
        })?;
    }

    let mount_type = match payload.mount_type.as_deref() {
        Some("native") => MountType::Native,
        _ => MountType::Classic,
    };
    let spec = MountSpec {
        source_path: payload.source.clone(),
        uid_mappings: BTreeMap::new(),
        gid_mappings: BTreeMap::new(),
        mount_type,
    };

    let handler: Box<dyn fleet_mount::MountHandler> = match mount_type {
        MountType::Native => Box::new(NativeMountHandler::new(spec.clone())),
        MountType::Classic => Box::new(ClassicMountHandler::new(payload.target.clone(), spec.clone(), vec!["true".to_string()])),
    };

    {
        let mut mounts = state.mounts.lock().unwrap();
        let registry = mounts.entry(payload.instance.clone()).or_default();
        registry.insert(payload.target.clone(), handler).map_err(|e| {
            e.downcast::<FleetError>().unwrap_or_else(|e| FleetError::internal(e.to_string()))
        })?;
    }

    {
        let mut instances = state.instances.lock().unwrap();
        if let Some(record) = instances.get_operative_mut(&payload.instance) {
            record.mounts.insert(payload.target.clone(), spec);
        }
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

async fn umount(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: UmountRequest = parse_payload(req)?;
    {
        let mut mounts = state.mounts.lock().unwrap();
        if let Some(registry) = mounts.get_mut(&payload.instance) {
            if let Some(handler) = registry.remove(&payload.target) {
                handler.deactivate(true).map_err(|e| FleetError::internal(e.to_string()))?;
            }
        }
    }
    {
        let mut instances = state.instances.lock().unwrap();
        if let Some(record) = instances.get_operative_mut(&payload.instance) {
            record.mounts.remove(&payload.target);
        }
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus::ok())
}

async fn clone_instance(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: CloneRequest = parse_payload(req)?;
    let mut source_record = {
        let instances = state.instances.lock().unwrap();
        instances
            .get_operative(&payload.source)
            .cloned()
            .ok_or_else(|| FleetError::InstanceSettings {
                message: format!("no such instance '{}'", payload.source),
            })?
    };

    let dest_name = payload
        .destination
        .clone()
        .unwrap_or_else(|| source_record.next_clone_name(&payload.source));

    {
        let mut instances = state.instances.lock().unwrap();
        if instances.is_name_taken(&dest_name) {
            return Err(FleetError::InvalidSetting {
                message: format!("instance '{}' already exists", dest_name),
            });
        }
        if let Some(original) = instances.get_operative_mut(&payload.source) {
            original.clone_count += 1;
        }
    }

    let mac = {
        let mut allocator = state.mac_allocator.lock().unwrap();
        allocator.generate()?
    };

    source_record.name = dest_name.clone();
    source_record.default_mac_address = mac;
    source_record.extra_interfaces.clear();
    source_record.state = VmState::Stopped;
    source_record.clone_count = 0;

    {
        let mut instances = state.instances.lock().unwrap();
        instances.insert_operative(source_record);
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;
    Ok(RpcStatus {
        message: dest_name,
        ..RpcStatus::ok()
    })
}

fn snapshot(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: SnapshotRequest = parse_payload(req)?;
    let instances = state.instances.lock().unwrap();
    let record = instances
        .get_operative(&payload.instance)
        .ok_or_else(|| FleetError::InstanceSettings {
            message: format!("no such instance '{}'", payload.instance),
        })?
        .clone();
    drop(instances);

    let mut snapshots = state.snapshots.lock().unwrap();
    let tree = snapshots.entry(payload.instance.clone()).or_default();
    let snap = tree.take_snapshot(&record, payload.name.as_deref(), &payload.comment)?;
    Ok(RpcStatus {
        message: snap.name,
        ..RpcStatus::ok()
    })
}

async fn restore(state: &Arc<AppState>, req: &RequestEnvelope) -> Result<RpcStatus, FleetError> {
    let payload: RestoreRequest = parse_payload(req)?;

    let mut record = {
        let instances = state.instances.lock().unwrap();
        instances
            .get_operative(&payload.instance)
            .cloned()
            .ok_or_else(|| FleetError::InstanceSettings {
                message: format!("no such instance '{}'", payload.instance),
            })?
    };

    if !matches!(record.state, VmState::Stopped | VmState::Off) {
        return Err(FleetError::InstanceSettings {
            message: "instance must be stopped to restore a snapshot".to_string(),
        });
    }

    let outcome = {
        let mut snapshots = state.snapshots.lock().unwrap();
        let tree = snapshots
            .get_mut(&payload.instance)
            .ok_or_else(|| FleetError::NoSuchSnapshot { name: payload.snapshot.clone() })?;
        tree.restore_snapshot(&payload.snapshot, &mut record, payload.destructive)?
    };

    {
        let mut mounts = state.mounts.lock().unwrap();
        if let Some(registry) = mounts.get_mut(&payload.instance) {
            for target in &outcome.pruned_mount_targets {
                if let Some(handler) = registry.remove(target) {
                    handler.deactivate(true).ok();
                }
            }
        }
    }

    {
        let mut instances = state.instances.lock().unwrap();
        instances.insert_operative(record);
    }
    state.persist_instances().map_err(|e| FleetError::internal(e.to_string()))?;

    if let Some(auto) = outcome.auto_snapshot {
        warn!(instance = %payload.instance, auto_snapshot = %auto, "captured automatic pre-restore snapshot");
    }
    Ok(RpcStatus::ok())
}

fn parse_payload<T: for<'de> Deserialize<'de>>(req: &RequestEnvelope) -> Result<T, FleetError> {
    serde_json::from_value(req.payload.clone()).map_err(|e| FleetError::InvalidSetting {
        message: format!("malformed request payload: {}", e),
    })
}
