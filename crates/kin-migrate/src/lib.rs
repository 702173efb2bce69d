//! Storage-layout migration.
//!
//! Entities were historically written in one of two layouts:
//!
//! - [`StorageLayoutVersion::ParentUnaware`]: children are found only
//!   through their key's ancestor; the parent stores nothing about them.
//! - [`StorageLayoutVersion::ParentTracksChildren`]: the parent holds a key
//!   (or key list) property per owned relationship.
//!
//! The layout is never stored as a tag. [`Migrator::infer_layout`] reads it
//! off the properties present, and [`Migrator::migrate`] upgrades an entity
//! in memory by looking its children up. Writing the upgraded entity back
//! is the caller's decision.

pub mod error;
pub mod layout;
pub mod migrator;

pub use error::{MigrateResult, MigrationError};
pub use layout::StorageLayoutVersion;
pub use migrator::{MigrationReport, Migrator};
