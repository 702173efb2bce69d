use std::fmt;

use kin_store::StoreError;
use kin_types::Key;

/// Which kind of write failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Put,
    Delete,
    Commit,
}

/// The write a failure is attached to.
#[derive(Clone, Debug, PartialEq)]
pub struct FailedMutation {
    pub kind: MutationKind,
    /// Keys sent in the failing call.
    pub keys: Vec<Key>,
    /// Root key of the entity group the call targeted.
    pub group: Key,
}

/// Which entity groups landed before a failure.
///
/// Groups are identified by root key, in execution order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupProgress {
    pub applied: Vec<Key>,
    pub unapplied: Vec<Key>,
}

impl GroupProgress {
    pub fn is_partial(&self) -> bool {
        !self.applied.is_empty() && !self.unapplied.is_empty()
    }
}

impl fmt::Display for GroupProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} group(s) applied, {} not applied",
            self.applied.len(),
            self.unapplied.len()
        )
    }
}

/// Errors from batch execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatchError {
    /// A transactional unit spans several entity groups and relaxed mode is off.
    #[error("transaction would touch {groups} entity groups; multi-group transactions are disabled")]
    MultiEntityGroupTransactionNotAllowed { groups: usize },

    #[error("transaction would touch {groups} entity groups, limit is {max}")]
    TooManyEntityGroups { groups: usize, max: usize },

    /// Optimistic-concurrency conflict. Never retried.
    #[error("concurrent modification of {} ({progress})", failed.group)]
    ConcurrentModification {
        failed: FailedMutation,
        progress: GroupProgress,
    },

    #[error("store failure ({progress}): {source}")]
    Store {
        failed: Option<FailedMutation>,
        progress: GroupProgress,
        #[source]
        source: StoreError,
    },
}

impl BatchError {
    pub fn progress(&self) -> Option<&GroupProgress> {
        match self {
            Self::ConcurrentModification { progress, .. } | Self::Store { progress, .. } => {
                Some(progress)
            }
            _ => None,
        }
    }

    pub fn failed_mutation(&self) -> Option<&FailedMutation> {
        match self {
            Self::ConcurrentModification { failed, .. } => Some(failed),
            Self::Store { failed, .. } => failed.as_ref(),
            _ => None,
        }
    }
}

/// Result alias for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;
