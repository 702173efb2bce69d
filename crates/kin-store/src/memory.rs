//! In-memory datastore for testing and embedding.
//!
//! [`InMemoryDatastore`] keeps entities in a `BTreeMap` ordered by key, tracks
//! a version counter per entity group for optimistic concurrency, and can be
//! scripted to fail through [`InMemoryDatastore::inject`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use kin_types::{Entity, EntityGroupId, Key};
use tracing::{debug, trace};

use crate::error::{StoreError, StoreResult};
use crate::fault::{Fault, FaultQueue, StoreOp};
use crate::traits::Datastore;
use crate::txn::{KeyRange, TxnHandle, TxnId, TxnOptions};

/// Call counters, for asserting how many round trips an operation made.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub get_calls: u64,
    pub put_calls: u64,
    pub delete_calls: u64,
    pub entities_written: u64,
    pub entities_deleted: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub id_reservations: u64,
    pub queries: u64,
}

impl StoreStats {
    /// Calls that changed (or tried to change) stored data.
    pub fn write_round_trips(&self) -> u64 {
        self.put_calls + self.delete_calls + self.commits
    }
}

#[derive(Debug)]
struct Enlisted {
    root: Key,
    version: u64,
}

#[derive(Debug)]
enum TxnWrite {
    Put(Entity),
    Delete(Key),
}

#[derive(Debug)]
struct TxnState {
    options: TxnOptions,
    enlisted: BTreeMap<EntityGroupId, Enlisted>,
    writes: Vec<TxnWrite>,
}

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<Key, Entity>,
    versions: HashMap<EntityGroupId, u64>,
    next_ids: HashMap<(String, Option<Key>), i64>,
    txns: HashMap<TxnId, TxnState>,
    faults: FaultQueue,
    stats: StoreStats,
}

impl State {
    fn version(&self, group: &EntityGroupId) -> u64 {
        self.versions.get(group).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &Key) {
        *self.versions.entry(key.group()).or_insert(0) += 1;
    }

    /// Record that `txn` has observed `key`'s group, or verify the group has
    /// not moved since it was first observed.
    fn enlist(&mut self, txn: &TxnHandle, key: &Key) -> StoreResult<()> {
        let group = key.group();
        let current = self.version(&group);
        let state = self
            .txns
            .get_mut(txn.id())
            .ok_or_else(|| StoreError::UnknownTransaction(txn.id().to_string()))?;

        if let Some(seen) = state.enlisted.get(&group) {
            if seen.version != current {
                return Err(StoreError::ConcurrentModification {
                    group: Some(seen.root.clone()),
                });
            }
            return Ok(());
        }

        let limit = state.options.group_limit();
        if state.enlisted.len() >= limit {
            return Err(StoreError::CrossGroupTransaction {
                groups: state.enlisted.len() + 1,
                limit,
            });
        }
        state.enlisted.insert(
            group,
            Enlisted {
                root: key.root().clone(),
                version: current,
            },
        );
        Ok(())
    }

    fn buffer(&mut self, txn: &TxnHandle, write: TxnWrite) -> StoreResult<()> {
        let state = self
            .txns
            .get_mut(txn.id())
            .ok_or_else(|| StoreError::UnknownTransaction(txn.id().to_string()))?;
        state.writes.push(write);
        Ok(())
    }
}

/// An in-memory implementation of [`Datastore`].
///
/// All data lives behind a `Mutex`. Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    state: Mutex<State>,
}

impl InMemoryDatastore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Queue a scripted failure. Faults fire in injection order.
    pub fn inject(&self, fault: Fault) -> StoreResult<()> {
        self.lock()?.faults.push(fault);
        Ok(())
    }

    /// Drop every pending fault.
    pub fn clear_faults(&self) -> StoreResult<()> {
        self.lock()?.faults.clear();
        Ok(())
    }

    /// Number of stored entities.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.entities.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock()?.entities.is_empty())
    }

    /// Every stored key, in key order.
    pub fn all_keys(&self) -> StoreResult<Vec<Key>> {
        Ok(self.lock()?.entities.keys().cloned().collect())
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        Ok(self.lock()?.stats.clone())
    }

    pub fn reset_stats(&self) -> StoreResult<()> {
        self.lock()?.stats = StoreStats::default();
        Ok(())
    }
}

impl Datastore for InMemoryDatastore {
    fn get(&self, key: &Key, txn: Option<&TxnHandle>) -> StoreResult<Option<Entity>> {
        let mut state = self.lock()?;
        state.stats.get_calls += 1;
        if let Some(err) = state.faults.check(StoreOp::Get, &[key]) {
            return Err(err);
        }
        if let Some(txn) = txn {
            state.enlist(txn, key)?;
        }
        Ok(state.entities.get(key).cloned())
    }

    fn get_many(&self, keys: &[Key], txn: Option<&TxnHandle>) -> StoreResult<Vec<Option<Entity>>> {
        let mut state = self.lock()?;
        state.stats.get_calls += 1;
        let refs: Vec<&Key> = keys.iter().collect();
        if let Some(err) = state.faults.check(StoreOp::Get, &refs) {
            return Err(err);
        }
        if let Some(txn) = txn {
            for key in keys {
                state.enlist(txn, key)?;
            }
        }
        Ok(keys.iter().map(|k| state.entities.get(k).cloned()).collect())
    }

    fn put(&self, entity: &Entity, txn: Option<&TxnHandle>) -> StoreResult<()> {
        self.put_many(std::slice::from_ref(entity), txn)
    }

    fn put_many(&self, entities: &[Entity], txn: Option<&TxnHandle>) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.stats.put_calls += 1;
        let keys: Vec<&Key> = entities.iter().map(Entity::key).collect();
        if let Some(err) = state.faults.check(StoreOp::Put, &keys) {
            return Err(err);
        }

        match txn {
            Some(txn) => {
                for entity in entities {
                    state.enlist(txn, entity.key())?;
                    state.buffer(txn, TxnWrite::Put(entity.clone()))?;
                }
            }
            None => {
                for entity in entities {
                    state.bump(entity.key());
                    state.entities.insert(entity.key().clone(), entity.clone());
                }
                state.stats.entities_written += entities.len() as u64;
                trace!(count = entities.len(), "put applied");
            }
        }
        Ok(())
    }

    fn delete(&self, key: &Key, txn: Option<&TxnHandle>) -> StoreResult<()> {
        self.delete_many(std::slice::from_ref(key), txn)
    }

    fn delete_many(&self, keys: &[Key], txn: Option<&TxnHandle>) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.stats.delete_calls += 1;
        let refs: Vec<&Key> = keys.iter().collect();
        if let Some(err) = state.faults.check(StoreOp::Delete, &refs) {
            return Err(err);
        }

        match txn {
            Some(txn) => {
                for key in keys {
                    state.enlist(txn, key)?;
                    state.buffer(txn, TxnWrite::Delete(key.clone()))?;
                }
            }
            None => {
                for key in keys {
                    state.bump(key);
                    state.entities.remove(key);
                }
                state.stats.entities_deleted += keys.len() as u64;
                trace!(count = keys.len(), "delete applied");
            }
        }
        Ok(())
    }

    fn begin_transaction(&self, options: TxnOptions) -> StoreResult<TxnHandle> {
        let mut state = self.lock()?;
        let id = TxnId::new();
        state.txns.insert(
            id.clone(),
            TxnState {
                options,
                enlisted: BTreeMap::new(),
                writes: Vec::new(),
            },
        );
        debug!(txn = %id.short_id(), cross_group = options.cross_group, "transaction started");
        Ok(TxnHandle::new(id, options))
    }

    fn commit(&self, txn: TxnHandle) -> StoreResult<()> {
        let mut state = self.lock()?;
        let txn_state = state
            .txns
            .remove(txn.id())
            .ok_or_else(|| StoreError::UnknownTransaction(txn.id().to_string()))?;
        state.stats.commits += 1;

        let roots: Vec<&Key> = txn_state.enlisted.values().map(|e| &e.root).collect();
        if let Some(err) = state.faults.check(StoreOp::Commit, &roots) {
            return Err(err);
        }

        for (group, seen) in &txn_state.enlisted {
            if state.version(group) != seen.version {
                debug!(txn = %txn.id().short_id(), group = %group, "commit conflict");
                return Err(StoreError::ConcurrentModification {
                    group: Some(seen.root.clone()),
                });
            }
        }

        let groups = txn_state.enlisted.len();
        let writes = txn_state.writes.len();
        for write in txn_state.writes {
            match write {
                TxnWrite::Put(entity) => {
                    state.bump(entity.key());
                    state.stats.entities_written += 1;
                    state.entities.insert(entity.key().clone(), entity);
                }
                TxnWrite::Delete(key) => {
                    state.bump(&key);
                    state.stats.entities_deleted += 1;
                    state.entities.remove(&key);
                }
            }
        }
        debug!(txn = %txn.id().short_id(), groups, writes, "transaction committed");
        Ok(())
    }

    fn rollback(&self, txn: TxnHandle) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .txns
            .remove(txn.id())
            .ok_or_else(|| StoreError::UnknownTransaction(txn.id().to_string()))?;
        state.stats.rollbacks += 1;
        debug!(txn = %txn.id().short_id(), "transaction rolled back");
        Ok(())
    }

    fn reserve_id_range(
        &self,
        kind: &str,
        ancestor: Option<&Key>,
        size: u64,
    ) -> StoreResult<KeyRange> {
        if size == 0 || size > i64::MAX as u64 {
            return Err(StoreError::InvalidArgument(format!(
                "cannot reserve {size} ids"
            )));
        }
        let mut state = self.lock()?;
        state.stats.id_reservations += 1;
        if let Some(err) = state.faults.check_kind(StoreOp::ReserveIds, kind) {
            return Err(err);
        }

        let next = state
            .next_ids
            .entry((kind.to_string(), ancestor.cloned()))
            .or_insert(1);
        let start = *next;
        let end = start
            .checked_add(size as i64 - 1)
            .ok_or_else(|| StoreError::InvalidArgument(format!("id space exhausted for {kind}")))?;
        *next = end.saturating_add(1);
        debug!(kind, start, end, "reserved id range");
        Ok(KeyRange { start, end })
    }

    fn query_keys(&self, kind: &str, ancestor: Option<&Key>) -> StoreResult<Vec<Key>> {
        let mut state = self.lock()?;
        state.stats.queries += 1;
        if let Some(err) = state.faults.check_kind(StoreOp::Query, kind) {
            return Err(err);
        }
        Ok(state
            .entities
            .keys()
            .filter(|k| k.kind() == kind)
            .filter(|k| ancestor.map_or(true, |a| a.is_ancestor_of(k)))
            .cloned()
            .collect())
    }
}
