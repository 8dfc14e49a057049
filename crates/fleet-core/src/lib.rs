//! Shared value types for the fleet workspace: byte sizes, MAC/hostname
//! validation, content hashes, and the error kinds every other crate
//! propagates through `anyhow` or converts to an RPC status.

pub mod error;
pub mod hash;
pub mod hostname;
pub mod mac;
pub mod progress;
pub mod size;

pub use error::{FleetError, TargetDetail};
pub use hash::ContentHash;
pub use hostname::Hostname;
pub use mac::MacAddress;
pub use progress::{NullProgressSink, ProgressSink};
pub use size::ByteSize;
