//! Transitive delete planning over owned relationships.

use std::collections::HashSet;

use kin_meta::{TypeCatalog, DISCRIMINATOR_PROPERTY};
use kin_store::{Datastore, TxnHandle};
use kin_types::{Entity, Key, Value};
use tracing::trace;

use crate::error::MappingResult;

/// Every key to delete when `roots` are deleted: the roots and all owned
/// descendants, deepest first.
///
/// Reads one level of the ownership tree per store call. Entities still
/// in the parent-unaware layout are expanded through an ancestor query.
/// Unowned targets are never included.
pub(crate) fn plan_cascade(
    catalog: &dyn TypeCatalog,
    store: &dyn Datastore,
    roots: &[Key],
    txn: Option<&TxnHandle>,
) -> MappingResult<Vec<Key>> {
    let mut seen: HashSet<Key> = HashSet::new();
    let mut frontier: Vec<Key> = roots.iter().filter(|k| seen.insert((*k).clone())).cloned().collect();
    let mut levels: Vec<Vec<Key>> = Vec::new();

    while !frontier.is_empty() {
        let found = store.get_many(&frontier, txn)?;
        let mut next = Vec::new();
        for entity in found.into_iter().flatten() {
            for child in owned_children(catalog, store, &entity)? {
                if seen.insert(child.clone()) {
                    next.push(child);
                }
            }
        }
        trace!(level = levels.len(), keys = frontier.len(), children = next.len(), "cascade level");
        levels.push(frontier);
        frontier = next;
    }
    Ok(levels.into_iter().rev().flatten().collect())
}

fn owned_children(catalog: &dyn TypeCatalog, store: &dyn Datastore, entity: &Entity) -> MappingResult<Vec<Key>> {
    let discriminator = entity.get(DISCRIMINATOR_PROPERTY).and_then(Value::as_text);
    let ty = catalog.resolve_concrete_type(entity.kind(), discriminator)?;
    let parent = entity.key();

    let mut children = Vec::new();
    for field in catalog.fields(&ty.name)? {
        let Some(rel) = field.relation_descriptor().filter(|r| r.is_owned()) else {
            continue;
        };
        match entity.get(field.property_name()) {
            Some(value) => children.extend(
                value
                    .referenced_keys()
                    .into_iter()
                    .filter(|k| k.parent() == Some(parent))
                    .cloned(),
            ),
            None => {
                let kind = catalog.root_kind(&rel.target_type)?;
                children.extend(
                    store
                        .query_keys(&kind, Some(parent))?
                        .into_iter()
                        .filter(|k| k.parent() == Some(parent)),
                );
            }
        }
    }
    Ok(children)
}
