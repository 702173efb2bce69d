//! The [`Datastore`] trait: everything the mapping engine needs from the
//! underlying hierarchical key-value store.

use kin_types::{Entity, Key};

use crate::error::StoreResult;
use crate::txn::{KeyRange, TxnHandle, TxnOptions};

/// Hierarchical key-value store with entity-group transactions.
///
/// Implementations must be thread-safe (`Send + Sync`) and satisfy:
/// - A call made without a transaction is applied atomically on its own.
///   Batch calls (`put_many`, `delete_many`) are all-or-nothing.
/// - Writes made inside a transaction become visible only on `commit`.
/// - A transaction observing an entity group that another writer changed
///   before commit fails with `ConcurrentModification` and applies nothing.
/// - Reserved id ranges never overlap for the same `(kind, ancestor)`.
pub trait Datastore: Send + Sync {
    /// Read one entity. Returns `Ok(None)` if absent.
    fn get(&self, key: &Key, txn: Option<&TxnHandle>) -> StoreResult<Option<Entity>>;

    /// Write (create or replace) one entity.
    fn put(&self, entity: &Entity, txn: Option<&TxnHandle>) -> StoreResult<()>;

    /// Delete one entity. Deleting an absent key is not an error.
    fn delete(&self, key: &Key, txn: Option<&TxnHandle>) -> StoreResult<()>;

    /// Start a transaction.
    fn begin_transaction(&self, options: TxnOptions) -> StoreResult<TxnHandle>;

    /// Apply every write buffered in `txn`, or none of them.
    fn commit(&self, txn: TxnHandle) -> StoreResult<()>;

    /// Discard `txn` and its buffered writes.
    fn rollback(&self, txn: TxnHandle) -> StoreResult<()>;

    /// Reserve `size` contiguous ids for `kind` under `ancestor`.
    fn reserve_id_range(&self, kind: &str, ancestor: Option<&Key>, size: u64)
        -> StoreResult<KeyRange>;

    /// Keys of every entity of `kind` that descends from `ancestor`
    /// (any depth), in key order. With no ancestor, every key of `kind`.
    fn query_keys(&self, kind: &str, ancestor: Option<&Key>) -> StoreResult<Vec<Key>>;

    /// Read several entities in one call.
    ///
    /// Default implementation calls `get()` for each key.
    fn get_many(&self, keys: &[Key], txn: Option<&TxnHandle>) -> StoreResult<Vec<Option<Entity>>> {
        keys.iter().map(|k| self.get(k, txn)).collect()
    }

    /// Write several entities in one call.
    ///
    /// Default implementation calls `put()` for each entity, which is not
    /// atomic. Backends should override.
    fn put_many(&self, entities: &[Entity], txn: Option<&TxnHandle>) -> StoreResult<()> {
        entities.iter().try_for_each(|e| self.put(e, txn))
    }

    /// Delete several entities in one call.
    ///
    /// Default implementation calls `delete()` for each key.
    fn delete_many(&self, keys: &[Key], txn: Option<&TxnHandle>) -> StoreResult<()> {
        keys.iter().try_for_each(|k| self.delete(k, txn))
    }
}
