use kin_batch::{BatchError, GroupProgress};
use kin_mapping::{ErrorClass, MappingError};
use kin_meta::MetaError;
use kin_migrate::MigrationError;
use kin_store::StoreError;
use kin_types::Key;

/// Errors from identifier allocation. Fatal; the partial cache is gone.
pub type AllocationError = kin_alloc::AllocError;

/// Errors from [`crate::Engine::persist`], [`crate::Engine::delete`] and
/// [`crate::Engine::migrate_kind`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PersistError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Mapping(e) => e.class(),
            Self::Batch(
                BatchError::MultiEntityGroupTransactionNotAllowed { .. }
                | BatchError::TooManyEntityGroups { .. },
            ) => ErrorClass::Configuration,
            Self::Batch(BatchError::ConcurrentModification { .. }) => ErrorClass::Concurrency,
            Self::Batch(BatchError::Store { source, .. }) | Self::Store(source) => {
                if source.is_conflict() {
                    ErrorClass::Concurrency
                } else {
                    ErrorClass::Store
                }
            }
            Self::Migration(_) => ErrorClass::Migration,
            Self::Meta(_) => ErrorClass::Configuration,
        }
    }

    /// Which entity groups landed, when the failure happened mid-batch.
    pub fn progress(&self) -> Option<&GroupProgress> {
        match self {
            Self::Batch(e) => e.progress(),
            _ => None,
        }
    }
}

/// Errors from [`crate::Engine::load`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("no entity stored under {0}")]
    NotFound(Key),

    /// The stored entity resolves to a type that is not the declared type
    /// or one of its subtypes.
    #[error("{key} holds a {actual}, which is not a {declared}")]
    TypeMismatch {
        key: Key,
        declared: String,
        actual: String,
    },

    #[error("{key} has discriminator {value:?}, unknown for kind {kind}")]
    UnknownDiscriminator { key: Key, kind: String, value: String },

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Writing back an entity upgraded on read failed.
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Errors from loading an [`crate::EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}

pub type PersistResult<T> = Result<T, PersistError>;
pub type LoadResult<T> = Result<T, LoadError>;
