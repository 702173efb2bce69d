//! The [`BatchCoordinator`]: turns a [`MutationBatch`] into the fewest store
//! calls the entity-group rules allow.

use std::collections::BTreeMap;
use std::sync::Arc;

use kin_store::{Datastore, StoreError, TxnHandle, TxnOptions, MAX_CROSS_GROUP_ENTITY_GROUPS};
use kin_types::Key;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BatchError, BatchResult, FailedMutation, GroupProgress, MutationKind};
use crate::mutation::{GroupWrites, MutationBatch};
use crate::observer::WriteObserver;

/// How mutations are bound together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grouping {
    /// Everything commits in one store transaction or not at all.
    Transactional,
    /// Each entity group is applied on its own, in root-key order.
    PerGroup,
}

/// Configuration for a [`BatchCoordinator`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Let a transactional unit span several entity groups.
    pub allow_multi_group: bool,
    /// Upper bound on groups in one relaxed-mode transaction.
    pub max_groups: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            allow_multi_group: false,
            max_groups: MAX_CROSS_GROUP_ENTITY_GROUPS,
        }
    }
}

/// An open unit of work.
///
/// Transactional units hold a store transaction that reads made while
/// planning should join, so the commit sees their groups' versions.
#[derive(Debug)]
pub struct WriteUnit {
    grouping: Grouping,
    txn: Option<TxnHandle>,
}

impl WriteUnit {
    pub fn grouping(&self) -> Grouping {
        self.grouping
    }

    pub fn txn(&self) -> Option<&TxnHandle> {
        self.txn.as_ref()
    }
}

/// What an executed batch did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub puts: usize,
    pub deletes: usize,
    pub groups: usize,
    /// Store calls that wrote, deleted, or committed.
    pub round_trips: usize,
    /// Mutations folded into an earlier one for the same key.
    pub collapsed: usize,
}

/// Executes mutation batches against a [`Datastore`].
pub struct BatchCoordinator {
    store: Arc<dyn Datastore>,
    observer: Option<Arc<dyn WriteObserver>>,
    config: CoordinatorConfig,
}

impl BatchCoordinator {
    pub fn new(store: Arc<dyn Datastore>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            observer: None,
            config,
        }
    }

    /// Attach an observer notified of every physical write.
    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Open a unit that will touch `groups` entity groups.
    ///
    /// Group limits are enforced here, before any store call.
    pub fn begin(&self, grouping: Grouping, groups: usize) -> BatchResult<WriteUnit> {
        if grouping == Grouping::PerGroup {
            return Ok(WriteUnit { grouping, txn: None });
        }
        self.check_group_count(groups)?;

        let options = if groups > 1 {
            TxnOptions::cross_group()
        } else {
            TxnOptions::single_group()
        };
        let txn = self
            .store
            .begin_transaction(options)
            .map_err(|source| BatchError::Store {
                failed: None,
                progress: GroupProgress::default(),
                source,
            })?;
        Ok(WriteUnit {
            grouping,
            txn: Some(txn),
        })
    }

    /// Abandon a unit without writing. Rollback failures are logged only.
    pub fn abort(&self, unit: WriteUnit) {
        if let Some(txn) = unit.txn {
            let id = txn.id().short_id();
            if let Err(e) = self.store.rollback(txn) {
                warn!(txn = %id, error = %e, "rollback failed");
            }
        }
    }

    /// Open a unit sized for `batch` and execute it.
    pub fn execute_now(&self, batch: MutationBatch, grouping: Grouping) -> BatchResult<BatchReport> {
        let unit = self.begin(grouping, batch.group_roots().len())?;
        self.execute(batch, unit)
    }

    /// Apply `batch` inside `unit`, consuming both.
    pub fn execute(&self, batch: MutationBatch, unit: WriteUnit) -> BatchResult<BatchReport> {
        let collapsed = batch.collapsed();
        let groups = batch.into_groups();
        let mut report = BatchReport {
            groups: groups.len(),
            collapsed,
            ..Default::default()
        };

        match unit.txn {
            Some(txn) => {
                if let Err(e) = self.check_group_count(groups.len()) {
                    self.abort(WriteUnit {
                        grouping: unit.grouping,
                        txn: Some(txn),
                    });
                    return Err(e);
                }
                self.execute_transactional(&groups, txn, &mut report)?;
            }
            None => self.execute_per_group(&groups, &mut report)?,
        }

        debug!(
            groups = report.groups,
            puts = report.puts,
            deletes = report.deletes,
            round_trips = report.round_trips,
            collapsed = report.collapsed,
            "batch executed"
        );
        Ok(report)
    }

    fn check_group_count(&self, groups: usize) -> BatchResult<()> {
        if groups > 1 && !self.config.allow_multi_group {
            return Err(BatchError::MultiEntityGroupTransactionNotAllowed { groups });
        }
        if groups > self.config.max_groups {
            return Err(BatchError::TooManyEntityGroups {
                groups,
                max: self.config.max_groups,
            });
        }
        Ok(())
    }

    fn execute_transactional(
        &self,
        groups: &BTreeMap<Key, GroupWrites>,
        txn: TxnHandle,
        report: &mut BatchReport,
    ) -> BatchResult<()> {
        let all_groups: Vec<Key> = groups.keys().cloned().collect();
        let unapplied = || GroupProgress {
            applied: Vec::new(),
            unapplied: all_groups.clone(),
        };

        for (root, writes) in groups {
            let sent = self.send(root, writes, Some(&txn), report);
            if let Err((failed, source)) = sent {
                let id = txn.id().short_id();
                if let Err(e) = self.store.rollback(txn) {
                    warn!(txn = %id, error = %e, "rollback failed");
                }
                return Err(classify(Some(failed), unapplied(), source));
            }
        }

        report.round_trips += 1;
        if let Err(source) = self.store.commit(txn) {
            let failed = commit_failure(groups, &source);
            warn!(groups = groups.len(), error = %source, "transactional batch failed at commit");
            return Err(classify(failed, unapplied(), source));
        }

        for writes in groups.values() {
            self.notify(writes);
        }
        Ok(())
    }

    fn execute_per_group(
        &self,
        groups: &BTreeMap<Key, GroupWrites>,
        report: &mut BatchReport,
    ) -> BatchResult<()> {
        let mut applied: Vec<Key> = Vec::new();

        for (root, writes) in groups {
            if let Err((failed, source)) = self.apply_group(root, writes, report) {
                let progress = GroupProgress {
                    applied,
                    unapplied: groups
                        .keys()
                        .skip_while(|k| *k != root)
                        .cloned()
                        .collect(),
                };
                warn!(
                    group = %root,
                    applied = progress.applied.len(),
                    unapplied = progress.unapplied.len(),
                    error = %source,
                    "batch stopped at failing entity group"
                );
                return Err(classify(failed, progress, source));
            }
            self.notify(writes);
            applied.push(root.clone());
        }
        Ok(())
    }

    /// Apply one group atomically. A group with both puts and deletes runs
    /// in its own single-group transaction.
    fn apply_group(
        &self,
        root: &Key,
        writes: &GroupWrites,
        report: &mut BatchReport,
    ) -> Result<(), (Option<FailedMutation>, StoreError)> {
        if writes.puts.is_empty() || writes.deletes.is_empty() {
            return self
                .send(root, writes, None, report)
                .map_err(|(failed, e)| (Some(failed), e));
        }

        let txn = self
            .store
            .begin_transaction(TxnOptions::single_group())
            .map_err(|e| (None, e))?;
        if let Err((failed, e)) = self.send(root, writes, Some(&txn), report) {
            if let Err(rb) = self.store.rollback(txn) {
                warn!(group = %root, error = %rb, "rollback failed");
            }
            return Err((Some(failed), e));
        }
        report.round_trips += 1;
        self.store.commit(txn).map_err(|e| {
            let failed = writes.first().map(|(key, is_put)| first_failure(root, key, is_put));
            (failed, e)
        })
    }

    /// Issue the put and delete calls for one group. Counts are only
    /// added to `report` for calls that succeeded.
    fn send(
        &self,
        root: &Key,
        writes: &GroupWrites,
        txn: Option<&TxnHandle>,
        report: &mut BatchReport,
    ) -> Result<(), (FailedMutation, StoreError)> {
        if !writes.puts.is_empty() {
            self.store.put_many(&writes.puts, txn).map_err(|e| {
                let failed = FailedMutation {
                    kind: MutationKind::Put,
                    keys: writes.puts.iter().map(|p| p.key().clone()).collect(),
                    group: root.clone(),
                };
                (failed, e)
            })?;
            report.round_trips += 1;
            report.puts += writes.puts.len();
        }
        if !writes.deletes.is_empty() {
            self.store.delete_many(&writes.deletes, txn).map_err(|e| {
                let failed = FailedMutation {
                    kind: MutationKind::Delete,
                    keys: writes.deletes.clone(),
                    group: root.clone(),
                };
                (failed, e)
            })?;
            report.round_trips += 1;
            report.deletes += writes.deletes.len();
        }
        Ok(())
    }

    fn notify(&self, writes: &GroupWrites) {
        let Some(observer) = &self.observer else {
            return;
        };
        for entity in &writes.puts {
            observer.on_put(entity);
        }
        for key in &writes.deletes {
            observer.on_delete(key);
        }
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCoordinator")
            .field("config", &self.config)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

fn first_failure(root: &Key, key: &Key, is_put: bool) -> FailedMutation {
    FailedMutation {
        kind: if is_put {
            MutationKind::Put
        } else {
            MutationKind::Delete
        },
        keys: vec![key.clone()],
        group: root.clone(),
    }
}

/// A commit conflict names its group; attach it to that group's first write.
fn commit_failure(groups: &BTreeMap<Key, GroupWrites>, source: &StoreError) -> Option<FailedMutation> {
    let (root, writes) = match source {
        StoreError::ConcurrentModification { group: Some(root) } => {
            groups.get_key_value(root).or_else(|| groups.iter().next())?
        }
        _ => groups.iter().next()?,
    };
    writes
        .first()
        .map(|(key, is_put)| first_failure(root, key, is_put))
}

fn classify(failed: Option<FailedMutation>, progress: GroupProgress, source: StoreError) -> BatchError {
    match failed {
        Some(failed) if source.is_conflict() => BatchError::ConcurrentModification { failed, progress },
        failed => BatchError::Store {
            failed,
            progress,
            source,
        },
    }
}
