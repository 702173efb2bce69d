//! # kinstore
//!
//! Object-graph persistence over a hierarchical key-value store.
//!
//! The [`Engine`] is what a host ORM talks to. It owns one id allocator and
//! one batch coordinator over a shared [`kin_store::Datastore`], and reads
//! type metadata through a [`kin_meta::TypeCatalog`].
//!
//! ```text
//! PersistOperation ──validate──▶ begin unit ──assign keys──▶ plan ──▶ execute
//!                                   │                                  │
//!                                   └──────── abort on failure ◀───────┘
//! ```
//!
//! ## Entity groups
//!
//! Owned children are keyed under their parent, so a parent and everything
//! it owns form one entity group. Transactional operations may touch one
//! group unless [`EngineConfig::allow_multi_group_transactions`] is set;
//! other operations are applied group by group and report
//! [`kin_batch::GroupProgress`] when they stop part way.
//!
//! ## Storage layout
//!
//! Entities written before parents tracked their children are upgraded on
//! read, on their next write, or in bulk through [`Engine::migrate_kind`].

pub mod config;
pub mod engine;
pub mod error;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod scenarios;

pub use config::{EngineConfig, MigrationPolicy, SequenceConfig};
pub use engine::{Engine, LoadedEntity, MigrationStatus};
pub use error::{AllocationError, ConfigError, LoadError, LoadResult, PersistError, PersistResult};

pub use kin_alloc::SequenceContext;
pub use kin_batch::{GroupProgress, WriteCounter, WriteObserver};
pub use kin_mapping::{AssignedKeys, ErrorClass, ExplicitId, NodeId, PersistOperation};
pub use kin_meta::{Catalog, TypeCatalog};
pub use kin_migrate::MigrationReport;
pub use kin_store::{Datastore, InMemoryDatastore};
pub use kin_types::{Entity, Key, KeyId, Value};
