//! A deterministic in-memory backend, used by unit/integration tests and
//! by running the daemon without a real hypervisor attached: exercises the
//! orchestrator logic without touching the OS.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use fleet_core::{ByteSize, MacAddress};

use crate::backend::{VMFactory, VirtualMachine};
use crate::state::VmState;

pub struct NullVm {
    name: String,
    state: Mutex<VmState>,
    cores: AtomicU32,
}

impl NullVm {
    fn new(name: &str, num_cores: u32) -> Self {
        NullVm {
            name: name.to_string(),
            state: Mutex::new(VmState::Off),
            cores: AtomicU32::new(num_cores),
        }
    }
}

#[async_trait::async_trait]
impl VirtualMachine for NullVm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        *self.state.lock().unwrap() = VmState::Running;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        *self.state.lock().unwrap() = VmState::Stopped;
        Ok(())
    }

    async fn suspend(&self) -> Result<()> {
        *self.state.lock().unwrap() = VmState::Suspended;
        Ok(())
    }

    fn current_state(&self) -> VmState {
        *self.state.lock().unwrap()
    }

    fn ssh_hostname(&self) -> Option<String> {
        Some("127.0.0.1".to_string())
    }

    fn ssh_port(&self) -> Option<u16> {
        Some(22)
    }

    async fn resize_memory(&self, _new_size: ByteSize) -> Result<()> {
        Ok(())
    }

    async fn resize_disk(&self, _new_size: ByteSize) -> Result<()> {
        Ok(())
    }

    async fn update_cpus(&self, num_cores: u32) -> Result<()> {
        self.cores.store(num_cores, Ordering::SeqCst);
        Ok(())
    }

    async fn add_network_interface(&self, _mac: MacAddress, _auto_mode: bool) -> Result<()> {
        Ok(())
    }

    async fn take_snapshot(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn restore_snapshot(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn make_native_mount_handler(&self, _target: &str) -> Option<Box<dyn std::any::Any + Send + Sync>> {
        None
    }

    fn management_ipv4(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::new(10, 0, 0, 2))
    }

    fn get_all_ipv4(&self) -> Vec<Ipv4Addr> {
        vec![Ipv4Addr::new(10, 0, 0, 2)]
    }
}

#[derive(Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        NullBackend
    }
}

#[async_trait::async_trait]
impl VMFactory for NullBackend {
    async fn create_vm(
        &self,
        name: &str,
        num_cores: u32,
        _mem: ByteSize,
        _disk: ByteSize,
    ) -> Result<Box<dyn VirtualMachine>> {
        Ok(Box::new(NullVm::new(name, num_cores)))
    }

    fn networks(&self) -> Vec<String> {
        vec!["default".to_string()]
    }

    async fn prepare_networking(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}
