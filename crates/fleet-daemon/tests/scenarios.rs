//! End-to-end scenarios driven straight through the dispatch table against
//! the `NullBackend` test double, one per life-cycle story rather than a
//! mechanical per-RPC grid.

mod support;

use fleet_core::mac::MacAllocator;
use fleet_rpc::message::RpcMethod;
use fleet_vm::VmState;
use serde_json::json;
use support::{call, test_state, JAMMY_ALIAS};

#[tokio::test]
async fn launch_creates_a_running_instance() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    let status = call(&state, RpcMethod::Launch, json!({ "image": JAMMY_ALIAS, "name": "web1" })).await;
    assert!(status.is_ok(), "launch failed: {}", status.message);

    let instances = state.instances.lock().unwrap();
    let record = instances.get_operative("web1").expect("instance should be recorded");
    assert_eq!(record.state, VmState::Running);
    assert!(!record.default_mac_address.to_string().is_empty());
}

#[tokio::test]
async fn duplicate_mac_reservation_is_rejected() {
    let mut allocator = MacAllocator::new();
    let mac = allocator.generate().unwrap();
    allocator.release(&mac);
    allocator.reserve(mac.clone()).expect("first reservation succeeds");

    let err = allocator.reserve(mac).expect_err("duplicate reservation must fail");
    assert!(matches!(err, fleet_core::FleetError::InvalidSetting { .. }));
}

#[tokio::test]
async fn stopping_with_a_pending_delayed_shutdown_cancels_the_timer() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    call(&state, RpcMethod::Launch, json!({ "image": JAMMY_ALIAS, "name": "delayed" })).await;

    let fire_state = std::sync::Arc::clone(&state);
    state
        .delayed_shutdown
        .arm("delayed", std::time::Duration::from_secs(3600), async move {
            if let Some(record) = fire_state.instances.lock().unwrap().get_operative_mut("delayed") {
                record.state = VmState::Off;
            }
        })
        .await;
    assert!(state.delayed_shutdown.is_armed("delayed").await);

    let status = call(&state, RpcMethod::Suspend, json!({ "names": ["delayed"] })).await;
    assert!(status.is_ok(), "suspend failed: {}", status.message);

    assert!(!state.delayed_shutdown.is_armed("delayed").await, "suspend must cancel the pending timer");
    let instances = state.instances.lock().unwrap();
    assert_eq!(instances.get_operative("delayed").unwrap().state, VmState::Suspended);
}

#[tokio::test]
async fn snapshot_then_restore_is_non_destructive() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    call(&state, RpcMethod::Launch, json!({ "image": JAMMY_ALIAS, "name": "snapme" })).await;
    call(&state, RpcMethod::Stop, json!({ "names": ["snapme"] })).await;

    let snap_status = call(
        &state,
        RpcMethod::Snapshot,
        json!({ "instance": "snapme", "name": "before-change", "comment": "pre-change baseline" }),
    )
    .await;
    assert!(snap_status.is_ok(), "snapshot failed: {}", snap_status.message);
    assert_eq!(snap_status.message, "before-change");

    let restore_status = call(
        &state,
        RpcMethod::Restore,
        json!({ "instance": "snapme", "snapshot": "before-change", "destructive": false }),
    )
    .await;
    assert!(restore_status.is_ok(), "non-destructive restore failed: {}", restore_status.message);

    let snapshots = state.snapshots.lock().unwrap();
    let tree = snapshots.get("snapme").expect("snapshot tree must still exist");
    assert!(
        tree.view_snapshots().iter().any(|s| s.name == "before-change"),
        "non-destructive restore must not remove the restored-from snapshot"
    );
}

#[tokio::test]
async fn delete_without_purge_can_be_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    call(&state, RpcMethod::Launch, json!({ "image": JAMMY_ALIAS, "name": "soft" })).await;

    let delete_status = call(&state, RpcMethod::Delete, json!({ "names": ["soft"] })).await;
    assert!(delete_status.is_ok());
    {
        let instances = state.instances.lock().unwrap();
        assert!(instances.get_operative("soft").is_none(), "deleted instance must leave the operative set");
        assert!(instances.get_deleted("soft").is_some(), "deleted instance must be recoverable until purged");
    }

    let recover_status = call(&state, RpcMethod::Recover, json!({ "names": ["soft"] })).await;
    assert!(recover_status.is_ok());

    let instances = state.instances.lock().unwrap();
    assert!(instances.get_operative("soft").is_some(), "recover must restore the instance to the operative set");
    assert!(instances.get_deleted("soft").is_none());
}

#[tokio::test]
async fn getting_an_unknown_settings_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    let status = call(&state, RpcMethod::Get, json!({ "key": "no.such.key" })).await;
    assert!(!status.is_ok(), "unknown settings key must not report success");
}
