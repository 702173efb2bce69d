//! Scripted failures for [`crate::InMemoryDatastore`].
//!
//! A [`Fault`] describes an operation to sabotage. Injected faults are
//! matched in order against incoming calls; the first match fires once and
//! is removed.

use kin_types::Key;

use crate::error::StoreError;

/// Operation a fault applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Put,
    Delete,
    Commit,
    ReserveIds,
    Query,
}

/// The error a fault produces when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    Unavailable,
    Conflict,
}

/// A single scripted failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    op: StoreOp,
    kind: FaultKind,
    target_kind: Option<String>,
    skip: usize,
}

impl Fault {
    /// Fail the next matching call with `Unavailable`.
    pub fn unavailable(op: StoreOp) -> Self {
        Self {
            op,
            kind: FaultKind::Unavailable,
            target_kind: None,
            skip: 0,
        }
    }

    /// Fail the next matching call with `ConcurrentModification`.
    pub fn conflict(op: StoreOp) -> Self {
        Self {
            op,
            kind: FaultKind::Conflict,
            target_kind: None,
            skip: 0,
        }
    }

    /// Only match calls touching an entity (or sequence) of this kind.
    pub fn for_kind(mut self, kind: impl Into<String>) -> Self {
        self.target_kind = Some(kind.into());
        self
    }

    /// Let `n` matching calls through before firing.
    pub fn after(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub(crate) fn matches<'a>(&self, op: StoreOp, mut kinds: impl Iterator<Item = &'a str>) -> bool {
        if self.op != op {
            return false;
        }
        match &self.target_kind {
            None => true,
            Some(target) => kinds.any(|k| k == target),
        }
    }

    pub(crate) fn into_error(self, group: Option<&Key>) -> StoreError {
        match self.kind {
            FaultKind::Unavailable => {
                StoreError::Unavailable(format!("injected fault on {:?}", self.op))
            }
            FaultKind::Conflict => StoreError::ConcurrentModification {
                group: group.map(|k| k.root().clone()),
            },
        }
    }
}

/// Ordered queue of pending faults.
#[derive(Debug, Default)]
pub(crate) struct FaultQueue {
    pending: Vec<Fault>,
}

impl FaultQueue {
    pub(crate) fn push(&mut self, fault: Fault) {
        self.pending.push(fault);
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    /// Check a call against the queue. Returns the error to raise, if a
    /// fault fires.
    pub(crate) fn check(&mut self, op: StoreOp, keys: &[&Key]) -> Option<StoreError> {
        let idx = self
            .pending
            .iter()
            .position(|f| f.matches(op, keys.iter().map(|k| k.kind())))?;
        if self.pending[idx].skip > 0 {
            self.pending[idx].skip -= 1;
            return None;
        }
        let fault = self.pending.remove(idx);
        Some(fault.into_error(keys.first().copied()))
    }

    /// Like [`FaultQueue::check`] for calls addressed by kind name only.
    pub(crate) fn check_kind(&mut self, op: StoreOp, kind: &str) -> Option<StoreError> {
        let idx = self
            .pending
            .iter()
            .position(|f| f.matches(op, std::iter::once(kind)))?;
        if self.pending[idx].skip > 0 {
            self.pending[idx].skip -= 1;
            return None;
        }
        let fault = self.pending.remove(idx);
        Some(fault.into_error(None))
    }
}
