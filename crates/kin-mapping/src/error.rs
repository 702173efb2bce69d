use kin_alloc::AllocError;
use kin_meta::{InheritanceStrategy, MetaError};
use kin_migrate::MigrationError;
use kin_store::StoreError;
use kin_types::{Key, TypeError};
use serde::{Deserialize, Serialize};

/// Coarse classification of a failure, for choosing a retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// The operation or the metadata is wrong. Never retry.
    Configuration,
    /// Key derivation failed. Never retry.
    Identity,
    Allocation,
    /// Optimistic-concurrency conflict. The caller may rerun the unit.
    Concurrency,
    Store,
    Migration,
}

/// Errors from mapping an operation onto store writes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    /// A node's ancestor is declared in two places that disagree.
    #[error("ambiguous ancestor for {type_name}: {detail}")]
    AmbiguousAncestor { type_name: String, detail: String },

    /// Only new objects can become owned children.
    #[error("{owner_type}.{field} cannot adopt existing entity {child} as an owned child")]
    CannotAdoptExistingOwnedChild {
        owner_type: String,
        field: String,
        child: Key,
    },

    #[error("owned child {child} cannot move to {new_parent}")]
    CannotReparentOwnedChild {
        child: Key,
        current_parent: Option<Key>,
        new_parent: Key,
    },

    #[error("{field} holds polymorphic {target_type}, whose {strategy:?} inheritance cannot share a kind")]
    UnsupportedInheritanceStrategy {
        field: String,
        target_type: String,
        strategy: InheritanceStrategy,
    },

    #[error("{field} expects {expected}, got {actual}")]
    ElementTypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("ownership cycle through node {0}")]
    OwnershipCycle(usize),

    #[error("identity {key} is already in use")]
    DuplicateIdentity { key: Key },

    #[error("identity of {type_name} has the wrong shape: {reason}")]
    IdentityShapeMismatch { type_name: String, reason: String },

    /// The type requires explicit ids and none was given.
    #[error("{type_name} needs an explicit identity")]
    MissingIdentity { type_name: String },

    #[error("entity {0} does not exist")]
    MissingEntity(Key),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Allocation(#[from] AllocError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl MappingError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AmbiguousAncestor { .. }
            | Self::CannotAdoptExistingOwnedChild { .. }
            | Self::CannotReparentOwnedChild { .. }
            | Self::UnsupportedInheritanceStrategy { .. }
            | Self::ElementTypeMismatch { .. }
            | Self::InvalidOperation(_)
            | Self::OwnershipCycle(_)
            | Self::Meta(_) => ErrorClass::Configuration,
            Self::DuplicateIdentity { .. }
            | Self::IdentityShapeMismatch { .. }
            | Self::MissingIdentity { .. }
            | Self::Type(_) => ErrorClass::Identity,
            Self::Allocation(_) => ErrorClass::Allocation,
            Self::Store(e) if e.is_conflict() => ErrorClass::Concurrency,
            Self::Store(_) | Self::MissingEntity(_) => ErrorClass::Store,
            Self::Migration(_) => ErrorClass::Migration,
        }
    }

    pub(crate) fn shape(type_name: &str, reason: impl Into<String>) -> Self {
        Self::IdentityShapeMismatch {
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;
