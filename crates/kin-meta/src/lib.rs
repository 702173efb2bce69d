//! Type and relationship metadata for the kinstore mapping engine.
//!
//! The host application owns its type model; the engine only reads it
//! through the [`TypeCatalog`] trait. [`Catalog`] is a ready-made,
//! validated implementation built from [`TypeDescriptor`] values.
//!
//! # Validation
//!
//! [`CatalogBuilder::build`] rejects metadata the engine cannot map:
//! unknown parents or targets, owned children whose identity cannot carry
//! an ancestor, repeated owned relationships to one type, identity shapes
//! that cannot be generated, and kinds mixing id generation schemes.

pub mod catalog;
pub mod descriptor;
pub mod error;
mod validate;

pub use catalog::{Catalog, CatalogBuilder, TypeCatalog, DISCRIMINATOR_PROPERTY};
pub use descriptor::{
    Cardinality, Direction, FieldDescriptor, FieldKind, IdGeneration, IdentityDescriptor,
    IdentityShape, InheritanceStrategy, Ownership, RelationshipDescriptor, TypeDescriptor,
    ORDINAL_SUFFIX,
};
pub use error::{MetaError, MetaResult};
