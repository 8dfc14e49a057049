//! Per-instance snapshot forest (C7, §4.4).

pub mod tree;

pub use tree::{RestoreOutcome, Snapshot, SnapshotTree};
