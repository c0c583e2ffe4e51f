//! Conflict-free replicated set.
//!
//! This crate provides:
//! - `VersionMap`: per-actor logical clocks with pointwise-max merge and dominance
//! - `Referenceable`: the identity contract for set elements
//! - `CollectionData`: the persistent state of one replica
//! - `CrdtSet`: operation validation, application and replica merge

mod collection;
mod error;
mod reference;
mod version_map;

pub use collection::{
    Applied, CollectionData, CrdtChange, CrdtSet, DataValue, FastForward, MergeChanges, Operation,
};
pub use error::CrdtError;
pub use reference::{Entity, ReferenceId, Referenceable};
pub use version_map::{Actor, VersionMap};
