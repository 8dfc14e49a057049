//! VM state machine (C9) and the `VirtualMachine`/`VMFactory` backend
//! boundary (§1 out-of-scope collaborator, §9 polymorphic VMs design
//! note).

pub mod backend;
pub mod delayed_shutdown;
pub mod null_backend;
pub mod state;

pub use backend::{VMFactory, VirtualMachine, VmEvent};
pub use delayed_shutdown::DelayedShutdownRegistry;
pub use null_backend::NullBackend;
pub use state::{validate_transition, StopDelay, VmEventKind, VmState};
