//! Foundation types for kinstore.
//!
//! This crate provides the identity and record types shared by every other
//! kinstore crate. Nothing here touches a store; these are plain values.
//!
//! # Key Types
//!
//! - [`Key`] : Hierarchical key path: kind, identifier, optional ancestor
//! - [`KeyId`] : Numeric or named identifier within a kind
//! - [`KeyToken`] : Opaque, portable string encoding of a [`Key`]
//! - [`EntityGroupId`] : Stable identifier of the entity group a key lives in
//! - [`Value`] : Property value stored on an entity
//! - [`Entity`] : A key plus an ordered property map

pub mod entity;
pub mod error;
pub mod group;
pub mod key;
pub mod token;
pub mod value;

pub use entity::Entity;
pub use error::TypeError;
pub use group::EntityGroupId;
pub use key::{Key, KeyId};
pub use token::KeyToken;
pub use value::{Value, SHORT_BLOB_MAX_BYTES};
