//! Store-facing interface for kinstore.
//!
//! The mapping engine never talks to a concrete store. It goes through the
//! [`Datastore`] trait, which models a hierarchical key-value store with
//! entity-group transactions and id range reservation.
//!
//! # Backends
//!
//! - [`InMemoryDatastore`]: `BTreeMap`-based store for tests and embedding,
//!   with scripted failures through [`Fault`]
//!
//! # Consistency Rules
//!
//! 1. Entity groups are the unit of transactional consistency.
//! 2. A transaction sees a conflict if any group it touched changed before
//!    commit, and then applies nothing.
//! 3. A single-group transaction may not touch a second group. A cross-group
//!    transaction may touch up to [`MAX_CROSS_GROUP_ENTITY_GROUPS`].

pub mod error;
pub mod fault;
pub mod memory;
pub mod traits;
pub mod txn;

pub use error::{StoreError, StoreResult};
pub use fault::{Fault, FaultKind, StoreOp};
pub use memory::{InMemoryDatastore, StoreStats};
pub use traits::Datastore;
pub use txn::{KeyRange, TxnHandle, TxnId, TxnOptions, MAX_CROSS_GROUP_ENTITY_GROUPS};
