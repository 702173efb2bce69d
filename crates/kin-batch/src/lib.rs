//! Concurrency and batch-write coordination for kinstore.
//!
//! A [`MutationBatch`] collects puts and deletes, keeping at most one write
//! per key. The [`BatchCoordinator`] then applies it:
//!
//! - under [`Grouping::Transactional`], inside one store transaction. More
//!   than one entity group is rejected before any store call unless relaxed
//!   mode is on, and relaxed mode is capped.
//! - under [`Grouping::PerGroup`], one atomic store call per entity group in
//!   root-key order. A failure stops the batch and reports which groups
//!   landed through [`GroupProgress`].
//!
//! Conflicts are never retried. They surface as
//! [`BatchError::ConcurrentModification`] naming the write they hit.

pub mod coordinator;
pub mod error;
pub mod mutation;
pub mod observer;

pub use coordinator::{BatchCoordinator, BatchReport, CoordinatorConfig, Grouping, WriteUnit};
pub use error::{BatchError, BatchResult, FailedMutation, GroupProgress, MutationKind};
pub use mutation::{GroupWrites, Mutation, MutationBatch};
pub use observer::{WriteCounter, WriteObserver};
