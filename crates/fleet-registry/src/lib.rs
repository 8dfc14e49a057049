//! Instance registry (C6, §4.1) plus request selection & reaction (C10,
//! described in the same §4.1 section of SPEC_FULL). Three disjoint
//! containers keyed by name: operative, deleted, preparing.

pub mod record;
pub mod select;
pub mod store;

pub use record::{ExtraInterface, InstanceRecord, InstanceRuntimeInfo};
pub use select::{DefaultGroup, Reaction, ReactionOutcome, SelectReport, Trail};
pub use store::{InstanceStore, LoadReport};
