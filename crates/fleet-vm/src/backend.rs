//! The hypervisor backend boundary (§1, §9). The core never talks to a
//! real hypervisor directly — it calls through `VirtualMachine` and
//! `VMFactory`, exactly the shape named in the design notes' "polymorphic
//! VMs" section. This crate ships no production backend; `NullBackend`
//! (see `null_backend.rs`) is the only implementation, used by tests and
//! by running the daemon without a real hypervisor attached.

use std::net::Ipv4Addr;

use anyhow::Result;
use fleet_core::{ByteSize, MacAddress};

pub use crate::state::VmEvent;

/// One running (or stopped) VM instance, as seen by the orchestrator.
/// Capability set per §9's design note.
#[async_trait::async_trait]
pub trait VirtualMachine: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<()>;
    async fn suspend(&self) -> Result<()>;
    fn current_state(&self) -> crate::state::VmState;

    fn ssh_hostname(&self) -> Option<String>;
    fn ssh_port(&self) -> Option<u16>;

    async fn resize_memory(&self, new_size: ByteSize) -> Result<()>;
    async fn resize_disk(&self, new_size: ByteSize) -> Result<()>;
    async fn update_cpus(&self, num_cores: u32) -> Result<()>;
    async fn add_network_interface(&self, mac: MacAddress, auto_mode: bool) -> Result<()>;

    async fn take_snapshot(&self, name: &str) -> Result<()>;
    async fn restore_snapshot(&self, name: &str) -> Result<()>;

    fn make_native_mount_handler(&self, target: &str) -> Option<Box<dyn std::any::Any + Send + Sync>>;

    fn management_ipv4(&self) -> Option<Ipv4Addr>;
    fn get_all_ipv4(&self) -> Vec<Ipv4Addr>;
}

/// Constructs `VirtualMachine` handles. Out of scope per §1 beyond this
/// contract — how a VM is actually created/started/paused/snapshotted on
/// disk is a backend concern.
#[async_trait::async_trait]
pub trait VMFactory: Send + Sync {
    async fn create_vm(&self, name: &str, num_cores: u32, mem: ByteSize, disk: ByteSize) -> Result<Box<dyn VirtualMachine>>;

    /// The `networks()` enumeration named in §1's out-of-scope list.
    fn networks(&self) -> Vec<String>;

    /// The `prepare_networking()` hook named in §1's out-of-scope list.
    async fn prepare_networking(&self, name: &str) -> Result<()>;
}
