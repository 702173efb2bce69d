//! Second planning phase: every new node gets its key.
//!
//! Nodes are keyed level by level down the ownership chains, since a child's
//! key embeds its owner's. Within a level, generated ids are reserved with
//! one allocator call per sequence and one store call per (kind, ancestor).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use kin_alloc::{AllocError, BlockAllocator, SequenceContext};
use kin_meta::{IdGeneration, TypeCatalog};
use kin_store::Datastore;
use kin_types::Key;
use tracing::debug;

use crate::error::{MappingError, MappingResult};
use crate::identity::ExplicitId;
use crate::keys::derive_key;
use crate::operation::{Change, NodeId, PersistOperation};
use crate::validate::{node, ValidatedOperation};

/// An operation whose nodes all have keys.
#[derive(Debug)]
pub struct PreparedOperation<'op> {
    pub(crate) validated: ValidatedOperation<'op>,
    pub(crate) keys: HashMap<NodeId, Key>,
}

impl<'op> PreparedOperation<'op> {
    pub fn operation(&self) -> &'op PersistOperation {
        self.validated.op
    }

    pub fn key_of(&self, node: NodeId) -> Option<&Key> {
        self.keys.get(&node)
    }

    pub(crate) fn require_key(&self, node: NodeId) -> MappingResult<&Key> {
        self.key_of(node)
            .ok_or_else(|| MappingError::InvalidOperation(format!("node {node} has no key")))
    }

    /// Root keys of every entity group written, in key order.
    pub fn groups(&self) -> BTreeSet<Key> {
        let op = self.operation();
        op.changes()
            .iter()
            .filter_map(|change| match change {
                Change::Insert(id) | Change::Update(id) => self.keys.get(id),
                Change::Delete(key) => Some(key),
            })
            .map(|k| k.root().clone())
            .collect()
    }
}

struct Pending {
    node: NodeId,
    kind: String,
    ancestor: Option<Key>,
}

pub(crate) fn assign_keys<'op>(
    catalog: &dyn TypeCatalog,
    store: &dyn Datastore,
    allocator: &mut BlockAllocator,
    sequence_appendage: Option<&str>,
    validated: ValidatedOperation<'op>,
) -> MappingResult<PreparedOperation<'op>> {
    let op = validated.op;
    let mut keys: HashMap<NodeId, Key> = op
        .nodes()
        .filter_map(|(id, n)| n.key.clone().map(|k| (id, k)))
        .collect();

    let mut levels: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for (id, n) in op.nodes() {
        if n.is_new() {
            let depth = validated.depth.get(&id).copied().unwrap_or(0);
            levels.entry(depth).or_default().push(id);
        }
    }

    let mut allocated = 0usize;
    for level in levels.values() {
        let mut by_sequence: BTreeMap<String, (SequenceContext, Vec<Pending>)> = BTreeMap::new();
        let mut by_store: BTreeMap<(String, Option<Key>), Vec<NodeId>> = BTreeMap::new();

        for &id in level {
            let n = node(op, id)?;
            let kind = catalog.root_kind(&n.type_name)?;
            let identity = catalog.identity(&n.type_name)?;
            let ancestor = match validated.owners.get(&id) {
                Some(owner) => Some(
                    keys.get(&owner.node)
                        .cloned()
                        .ok_or_else(|| MappingError::InvalidOperation(format!("owner of {id} has no key")))?,
                ),
                None => None,
            };

            if let Some(explicit) = &n.explicit_id {
                let key = derive_key(&n.type_name, &kind, identity.shape, explicit, ancestor.as_ref())?;
                keys.insert(id, key);
                continue;
            }
            match identity.generation {
                IdGeneration::Explicit => {
                    return Err(MappingError::MissingIdentity {
                        type_name: n.type_name.clone(),
                    });
                }
                IdGeneration::Sequence => {
                    let mut ctx = match &identity.sequence {
                        Some(name) => SequenceContext::named(name.as_str()),
                        None => SequenceContext::for_kind(&kind),
                    };
                    if let Some(appendage) = sequence_appendage {
                        ctx = ctx.with_appendage(appendage);
                    }
                    by_sequence
                        .entry(ctx.name())
                        .or_insert_with(|| (ctx, Vec::new()))
                        .1
                        .push(Pending {
                            node: id,
                            kind,
                            ancestor,
                        });
                }
                IdGeneration::Store => by_store.entry((kind, ancestor)).or_default().push(id),
            }
        }

        for (ctx, waiting) in by_sequence.into_values() {
            let ids = allocator.reserve(&ctx, waiting.len() as u64)?;
            allocated += ids.len();
            for (pending, id) in waiting.into_iter().zip(ids) {
                let n = node(op, pending.node)?;
                let shape = catalog.identity(&n.type_name)?.shape;
                let key = derive_key(
                    &n.type_name,
                    &pending.kind,
                    shape,
                    &ExplicitId::Numeric(id),
                    pending.ancestor.as_ref(),
                )?;
                keys.insert(pending.node, key);
            }
        }

        for ((kind, ancestor), waiting) in by_store {
            let range = store
                .reserve_id_range(&kind, ancestor.as_ref(), waiting.len() as u64)
                .map_err(|source| AllocError::AllocationFailed {
                    sequence: kind.clone(),
                    source,
                })?;
            allocated += waiting.len();
            for (id, value) in waiting.into_iter().zip(range.start..=range.end) {
                keys.insert(id, Key::with_ancestor(ancestor.as_ref(), kind.as_str(), value)?);
            }
        }
    }

    check_duplicates(store, op, &keys)?;
    debug!(
        nodes = op.node_count(),
        levels = levels.len(),
        allocated,
        "keys assigned"
    );
    Ok(PreparedOperation { validated, keys })
}

/// New keys must be unique within the operation, and explicit ones must
/// not exist in the store yet.
fn check_duplicates(
    store: &dyn Datastore,
    op: &PersistOperation,
    keys: &HashMap<NodeId, Key>,
) -> MappingResult<()> {
    let persisted: HashSet<&Key> = op.nodes().filter_map(|(_, n)| n.key.as_ref()).collect();
    let mut seen: HashSet<&Key> = HashSet::new();
    let mut explicit: Vec<Key> = Vec::new();
    for (id, n) in op.nodes() {
        if !n.is_new() {
            continue;
        }
        let Some(key) = keys.get(&id) else {
            continue;
        };
        if persisted.contains(key) || !seen.insert(key) {
            return Err(MappingError::DuplicateIdentity { key: key.clone() });
        }
        if n.explicit_id.is_some() {
            explicit.push(key.clone());
        }
    }

    if explicit.is_empty() {
        return Ok(());
    }
    let found = store.get_many(&explicit, None)?;
    if let Some((key, _)) = explicit.iter().zip(found).find(|(_, e)| e.is_some()) {
        return Err(MappingError::DuplicateIdentity { key: key.clone() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::catalog;
    use crate::validate::validate;
    use kin_alloc::AllocatorConfig;
    use kin_store::{Fault, InMemoryDatastore, StoreError, StoreOp};
    use kin_types::Entity;
    use std::sync::Arc;

    fn prepare<'op>(
        store: &Arc<InMemoryDatastore>,
        alloc: &mut BlockAllocator,
        op: &'op PersistOperation,
    ) -> MappingResult<PreparedOperation<'op>> {
        let cat = catalog();
        let v = validate(cat.as_ref(), op)?;
        assign_keys(cat.as_ref(), store.as_ref(), alloc, None, v)
    }

    fn allocator(store: &Arc<InMemoryDatastore>) -> BlockAllocator {
        BlockAllocator::new(store.clone(), AllocatorConfig::default())
    }

    #[test]
    fn children_rooted_under_new_parent() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut alloc = allocator(&store);
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let c1 = op.insert("Chapter");
        let c2 = op.insert("Chapter");
        let p = op.insert("Paragraph");
        op.link_many(b, "chapters", vec![c1, c2]).link_many(c1, "paragraphs", vec![p]);

        let prepared = prepare(&store, &mut alloc, &op).unwrap();
        let book = prepared.key_of(b).unwrap();
        assert_eq!(prepared.key_of(c1).unwrap().parent(), Some(book));
        assert_eq!(prepared.key_of(p).unwrap().parent(), prepared.key_of(c1));
        assert_eq!(prepared.groups().len(), 1);
        // One reservation per sequence per level.
        assert_eq!(store.stats().unwrap().id_reservations, 3);
    }

    #[test]
    fn sequence_space_ignores_ancestor() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut alloc = allocator(&store);
        let mut op = PersistOperation::new();
        let a = op.insert("Book");
        let b = op.insert("Book");
        let ca = op.insert("Chapter");
        let cb = op.insert("Chapter");
        op.link_many(a, "chapters", vec![ca]).link_many(b, "chapters", vec![cb]);

        let prepared = prepare(&store, &mut alloc, &op).unwrap();
        let id_a = prepared.key_of(ca).unwrap().id().clone();
        let id_b = prepared.key_of(cb).unwrap().id().clone();
        assert_ne!(id_a, id_b);
        assert_eq!(prepared.groups().len(), 2);
    }

    #[test]
    fn store_generation_per_ancestor() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut alloc = allocator(&store);
        let mut op = PersistOperation::new();
        let t1 = op.insert("Ticket");
        let t2 = op.insert("Ticket");
        let prepared = prepare(&store, &mut alloc, &op).unwrap();
        assert_eq!(prepared.key_of(t1).unwrap(), &Key::new("Ticket", 1).unwrap());
        assert_eq!(prepared.key_of(t2).unwrap(), &Key::new("Ticket", 2).unwrap());
        assert!(alloc.cached(&SequenceContext::for_kind("Ticket")).is_none());
    }

    #[test]
    fn explicit_id_already_stored() {
        let store = Arc::new(InMemoryDatastore::new());
        store
            .put(&Entity::new(Key::new("Tag", "rust").unwrap()), None)
            .unwrap();
        let mut alloc = allocator(&store);
        let mut op = PersistOperation::new();
        op.insert_with_id("Tag", "rust");

        let err = prepare(&store, &mut alloc, &op).unwrap_err();
        assert_eq!(
            err,
            MappingError::DuplicateIdentity {
                key: Key::new("Tag", "rust").unwrap()
            }
        );
    }

    #[test]
    fn explicit_id_repeated_in_operation() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut alloc = allocator(&store);
        let mut op = PersistOperation::new();
        op.insert_with_id("Tag", "rust");
        op.insert_with_id("Tag", "rust");
        let err = prepare(&store, &mut alloc, &op).unwrap_err();
        assert!(matches!(err, MappingError::DuplicateIdentity { .. }));
    }

    #[test]
    fn allocation_failure_is_fatal() {
        let store = Arc::new(InMemoryDatastore::new());
        store.inject(Fault::unavailable(StoreOp::ReserveIds)).unwrap();
        let mut alloc = allocator(&store);
        let mut op = PersistOperation::new();
        op.insert("Book");

        let err = prepare(&store, &mut alloc, &op).unwrap_err();
        assert!(matches!(
            err,
            MappingError::Allocation(AllocError::AllocationFailed {
                source: StoreError::Unavailable(_),
                ..
            })
        ));
        assert_eq!(err.class(), crate::ErrorClass::Allocation);
    }

    #[test]
    fn appendage_selects_separate_sequence() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut alloc = allocator(&store);
        let cat = catalog();
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let v = validate(cat.as_ref(), &op).unwrap();
        let prepared = assign_keys(cat.as_ref(), store.as_ref(), &mut alloc, Some("-test"), v).unwrap();
        assert_eq!(prepared.key_of(b).unwrap(), &Key::new("Book", 1).unwrap());
        assert!(alloc
            .cached(&SequenceContext::for_kind("Book").with_appendage("-test"))
            .is_some());
    }
}
