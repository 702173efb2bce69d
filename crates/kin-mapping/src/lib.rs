//! The kinstore mapping engine core.
//!
//! Turns a host's [`PersistOperation`] into store writes in three phases:
//!
//! 1. **Validate**: graph checks that need no store access (ownership,
//!    adoption, re-parenting, polymorphism, cardinality).
//! 2. **Assign keys**: new objects get keys level by level down their
//!    ownership chains, with ids reserved in batches.
//! 3. **Plan**: read what the operation builds on, run the relationship
//!    state machine, stamp ordinals, and emit the minimal
//!    [`kin_batch::MutationBatch`], cascade deletes included.
//!
//! # Persisted layout
//!
//! - A relationship is a key or key-list property on the owner. A cleared
//!   relationship is present and null.
//! - An owned child's key is rooted under its owner's key.
//! - Members of an ordered owned collection carry `<property>_INTEGER_IDX`.
//! - Entities of a shared kind carry a `DISCRIMINATOR` property.

pub mod assign;
mod cascade;
pub mod error;
pub mod identity;
pub mod keys;
pub mod operation;
pub mod ordinal;
pub mod planner;
pub mod relation;
pub mod validate;

#[cfg(test)]
mod fixtures;

pub use assign::PreparedOperation;
pub use error::{ErrorClass, MappingError, MappingResult};
pub use identity::{ExplicitId, IdentityValue};
pub use keys::derive_key;
pub use operation::{Change, Link, NodeId, NodeRole, ObjectNode, PersistOperation};
pub use ordinal::{assign_on_insert, compact, repair_after_removal, repair_after_reorder, OrdinalAssignment};
pub use planner::{AssignedKeys, Planner, WritePlan};
pub use relation::LinkState;
pub use validate::{Owner, ValidatedOperation};
