//! Orchestrator daemon: wires every domain crate behind the framed,
//! bidirectional-streaming RPC service (§4.8, §4.9).
//!
//! `fleetd` (`src/main.rs`) is a thin CLI wrapper around this crate;
//! everything that can be exercised in a test lives here instead.

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod server;
pub mod settings_handlers;
pub mod state;

pub use config::StaticConfig;
pub use logging::LogFormat;
pub use state::AppState;
