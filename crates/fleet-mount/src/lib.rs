//! Mount handlers (C8, §4.5).

pub mod handler;
pub mod registry;
pub mod spec;
pub mod validate;

pub use handler::{ClassicMountHandler, MountHandler, NativeMountHandler};
pub use registry::MountRegistry;
pub use spec::{MountSpec, MountType};
pub use validate::validate_target_path;
