use kin_types::Key;

/// Errors from datastore operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// An entity group changed after the transaction first touched it.
    ///
    /// `group` is the root key of the conflicting group when known.
    #[error("concurrent modification of entity group {}", display_group(.group))]
    ConcurrentModification { group: Option<Key> },

    /// The store could not serve the request.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),

    /// The transaction handle is not (or no longer) active.
    #[error("unknown or finished transaction {0}")]
    UnknownTransaction(String),

    /// A transaction touched more entity groups than its options allow.
    #[error("transaction touches {groups} entity groups, limit is {limit}")]
    CrossGroupTransaction { groups: usize, limit: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl StoreError {
    /// Whether this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

fn display_group(group: &Option<Key>) -> String {
    group
        .as_ref()
        .map_or_else(|| "<unknown>".to_string(), |k| k.to_string())
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
