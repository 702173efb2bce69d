use std::fmt;

use serde::{Deserialize, Serialize};

/// Entity groups a cross-group transaction may touch.
pub const MAX_CROSS_GROUP_ENTITY_GROUPS: usize = 25;

/// Unique identifier for a transaction (UUID v7 for time-ordering).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(uuid::Uuid);

impl TxnId {
    /// Generate a new time-ordered transaction ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TxnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxnId({})", self.short_id())
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for [`crate::Datastore::begin_transaction`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnOptions {
    /// Allow the transaction to span several entity groups, up to
    /// [`MAX_CROSS_GROUP_ENTITY_GROUPS`].
    pub cross_group: bool,
}

impl TxnOptions {
    pub fn single_group() -> Self {
        Self { cross_group: false }
    }

    pub fn cross_group() -> Self {
        Self { cross_group: true }
    }

    /// Number of entity groups this transaction may enlist.
    pub fn group_limit(&self) -> usize {
        if self.cross_group {
            MAX_CROSS_GROUP_ENTITY_GROUPS
        } else {
            1
        }
    }
}

/// Handle to an active transaction.
///
/// Not `Clone`: committing or rolling back consumes the handle.
#[derive(Debug, PartialEq, Eq)]
pub struct TxnHandle {
    id: TxnId,
    options: TxnOptions,
}

impl TxnHandle {
    pub fn new(id: TxnId, options: TxnOptions) -> Self {
        Self { id, options }
    }

    pub fn id(&self) -> &TxnId {
        &self.id
    }

    pub fn options(&self) -> TxnOptions {
        self.options
    }
}

/// An inclusive range of reserved identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: i64,
    pub end: i64,
}

impl KeyRange {
    pub fn len(&self) -> u64 {
        (self.end - self.start + 1) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, id: i64) -> bool {
        (self.start..=self.end).contains(&id)
    }
}
