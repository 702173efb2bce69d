use kin_meta::MetaError;
use kin_store::StoreError;
use kin_types::Key;

/// Errors from layout migration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MigrationError {
    /// Child references for `fields` could not be reconstructed. The entity
    /// keeps its old layout.
    #[error("migration of {key} incomplete, unresolved fields: {}", missing.join(", "))]
    Incomplete { key: Key, missing: Vec<String> },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Meta(#[from] MetaError),
}

/// Result alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;
