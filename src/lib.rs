//! `fleetctl`: the CLI client for the fleet VM orchestration daemon.
//! Connects to `fleetd` over its Unix domain socket and drives the same
//! RPC surface the daemon's dispatch table implements.

pub mod cli;
pub mod client;
pub mod identity;
pub mod output;
pub mod ui;

pub use cli::run;
