//! Settings registry (C3, §4.7): a keyed get/set/list facade that
//! multiplexes across registered handlers.
//!
//! Per the design note on global singletons (§9), handlers are
//! dependency-injected rather than looked up through a process-wide
//! accessor — `fleet-daemon` constructs the concrete instance/snapshot
//! handlers (which need access to the registry, VM state machine, and
//! snapshot manager) and registers them here at startup. This crate only
//! ships the dispatch machinery plus the one handler that's fully
//! self-contained: the passphrase handler backing C13's `authenticate` RPC.

pub mod passphrase;
pub mod registry;
pub mod value;

pub use passphrase::{PassphraseHandler, PassphraseStore};
pub use registry::{SettingsHandler, SettingsRegistry};
pub use value::SettingValue;
