//! The relationship state machine: turns a prepared operation into the
//! exact set of puts and deletes it implies.

use std::collections::{BTreeMap, HashMap, HashSet};

use kin_alloc::BlockAllocator;
use kin_batch::MutationBatch;
use kin_meta::{Direction, TypeCatalog, DISCRIMINATOR_PROPERTY};
use kin_migrate::{MigrationError, Migrator};
use kin_store::{Datastore, TxnHandle};
use kin_types::{Entity, Key, Value};
use tracing::debug;

use crate::assign::{assign_keys, PreparedOperation};
use crate::cascade::plan_cascade;
use crate::error::{MappingError, MappingResult};
use crate::operation::{Change, NodeId, NodeRole, PersistOperation};
use crate::ordinal::{assign_on_insert, compact, repair_after_removal, repair_after_reorder};
use crate::relation::{member_transitions, relation_value, stored_members, LinkState};
use crate::validate::{field, node, validate, ValidatedOperation};

/// Keys given to the new nodes of an operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssignedKeys(BTreeMap<NodeId, Key>);

impl AssignedKeys {
    pub fn get(&self, node: NodeId) -> Option<&Key> {
        self.0.get(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Key)> {
        self.0.iter().map(|(n, k)| (*n, k))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything an operation writes.
#[derive(Clone, Debug, Default)]
pub struct WritePlan {
    pub batch: MutationBatch,
    pub assigned: AssignedKeys,
    /// Updated entities that were read in the old layout and are written
    /// back upgraded.
    pub upgraded: Vec<Key>,
    /// Every deleted key, cascades included, deepest first.
    pub deleted: Vec<Key>,
}

/// An ordered owned collection whose ordinals need computing.
struct OrdinalJob {
    property: String,
    members: Vec<Key>,
    owner_is_new: bool,
    positional: bool,
}

/// Plans persist operations against one store and catalog.
pub struct Planner<'a> {
    catalog: &'a dyn TypeCatalog,
    store: &'a dyn Datastore,
    migrator: &'a Migrator,
    sequence_appendage: Option<&'a str>,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a dyn TypeCatalog, store: &'a dyn Datastore, migrator: &'a Migrator) -> Self {
        Self {
            catalog,
            store,
            migrator,
            sequence_appendage: None,
        }
    }

    pub fn with_sequence_appendage(mut self, appendage: Option<&'a str>) -> Self {
        self.sequence_appendage = appendage;
        self
    }

    /// Check the operation's graph. Makes no store calls.
    pub fn validate<'op>(&self, op: &'op PersistOperation) -> MappingResult<ValidatedOperation<'op>> {
        validate(self.catalog, op)
    }

    /// Give every new node a key, reserving ids as needed.
    pub fn assign_keys<'op>(
        &self,
        validated: ValidatedOperation<'op>,
        allocator: &mut BlockAllocator,
    ) -> MappingResult<PreparedOperation<'op>> {
        assign_keys(self.catalog, self.store, allocator, self.sequence_appendage, validated)
    }

    /// Validate and assign keys in one step.
    pub fn prepare<'op>(
        &self,
        op: &'op PersistOperation,
        allocator: &mut BlockAllocator,
    ) -> MappingResult<PreparedOperation<'op>> {
        let validated = self.validate(op)?;
        self.assign_keys(validated, allocator)
    }

    /// Keys deleted when `keys` are deleted, owned descendants first.
    pub fn plan_delete(&self, keys: &[Key], txn: Option<&TxnHandle>) -> MappingResult<Vec<Key>> {
        plan_cascade(self.catalog, self.store, keys, txn)
    }

    /// Compute the writes for a prepared operation.
    ///
    /// Reads go through `txn` when given, so a transactional commit
    /// detects concurrent changes to anything the plan was based on.
    pub fn plan(&self, prepared: &PreparedOperation<'_>, txn: Option<&TxnHandle>) -> MappingResult<WritePlan> {
        let op = prepared.operation();
        let mut originals: HashMap<Key, Entity> = HashMap::new();
        let mut drafts: BTreeMap<Key, Entity> = BTreeMap::new();
        let mut upgraded = Vec::new();
        let mut unresolved: HashMap<Key, Vec<String>> = HashMap::new();

        // Baselines of updated entities, upgraded to the current layout.
        let updated: Vec<NodeId> = op
            .changes()
            .iter()
            .filter_map(|c| match c {
                Change::Update(id) => Some(*id),
                _ => None,
            })
            .collect();
        let update_keys = updated
            .iter()
            .map(|id| prepared.require_key(*id).cloned())
            .collect::<MappingResult<Vec<Key>>>()?;
        if !update_keys.is_empty() {
            let found = self.store.get_many(&update_keys, txn)?;
            for ((id, key), stored) in updated.iter().zip(&update_keys).zip(found) {
                let stored = stored.ok_or_else(|| MappingError::MissingEntity(key.clone()))?;
                let type_name = &node(op, *id)?.type_name;
                let baseline = match self.migrator.migrate(stored.clone(), type_name) {
                    Ok((entity, changed)) => {
                        if changed {
                            upgraded.push(key.clone());
                        }
                        entity
                    }
                    // Old layout stays; only links through the unresolved
                    // fields are refused below.
                    Err(MigrationError::Incomplete { missing, .. }) => {
                        debug!(key = %key, fields = ?missing, "updating entity in its old layout");
                        unresolved.insert(key.clone(), missing);
                        stored.clone()
                    }
                    Err(e) => return Err(e.into()),
                };
                originals.insert(key.clone(), stored);
                drafts.insert(key.clone(), baseline);
            }
        }

        // Fresh entities: discriminator plus every relationship present.
        for change in op.changes() {
            let Change::Insert(id) = change else { continue };
            let n = node(op, *id)?;
            let key = prepared.require_key(*id)?.clone();
            let mut entity = Entity::new(key.clone());
            if self.catalog.needs_discriminator(&n.type_name)? {
                let ty = self.catalog.describe(&n.type_name)?;
                entity.set(DISCRIMINATOR_PROPERTY, ty.discriminator_value());
            }
            for f in self.catalog.fields(&n.type_name)? {
                if f.relation_descriptor().is_some() {
                    entity.set(f.property_name(), Value::Null);
                }
            }
            drafts.insert(key, entity);
        }

        let mut removed: Vec<Key> = Vec::new();
        let mut jobs: Vec<OrdinalJob> = Vec::new();
        let mut back_refs: Vec<(Key, String, Key)> = Vec::new();
        let mut dropped_refs: Vec<(Key, String, Key)> = Vec::new();

        for (id, n) in op.nodes() {
            if n.role == NodeRole::Referenced {
                continue;
            }
            let owner_key = prepared.require_key(id)?.clone();
            let draft = drafts
                .get_mut(&owner_key)
                .ok_or_else(|| MappingError::InvalidOperation(format!("node {id} is not part of a change")))?;

            for (name, value) in &n.scalars {
                let f = field(self.catalog, &n.type_name, name)?;
                draft.set(f.property_name(), value.clone());
            }

            for (name, link) in &n.links {
                let f = field(self.catalog, &n.type_name, name)?;
                let Some(rel) = f.relation_descriptor() else { continue };
                if let Some(missing) = unresolved.get(&owner_key) {
                    if missing.contains(name) {
                        return Err(MigrationError::Incomplete {
                            key: owner_key,
                            missing: missing.clone(),
                        }
                        .into());
                    }
                }
                let members = link
                    .members()
                    .into_iter()
                    .map(|m| prepared.require_key(m).cloned())
                    .collect::<MappingResult<Vec<Key>>>()?;
                let before = stored_members(draft.get(f.property_name()));
                draft.set(f.property_name(), relation_value(members.clone(), rel.is_collection()));

                if rel.is_owned() {
                    removed.extend(
                        member_transitions(&before, &members)
                            .into_iter()
                            .filter(|(_, state)| *state == LinkState::Removed)
                            .map(|(k, _)| k),
                    );
                    if let Some(property) = f.ordinal_property() {
                        jobs.push(OrdinalJob {
                            property,
                            members,
                            owner_is_new: n.is_new(),
                            positional: n.positional.iter().any(|p| p == name),
                        });
                    }
                } else if rel.direction == Direction::Bidirectional {
                    if let Some(mapped_by) = &rel.mapped_by {
                        for (member, state) in member_transitions(&before, &members) {
                            let entry = (member, mapped_by.clone(), owner_key.clone());
                            match state {
                                LinkState::Removed => dropped_refs.push(entry),
                                _ => back_refs.push(entry),
                            }
                        }
                    }
                }
            }
        }

        self.stamp_ordinals(&jobs, &mut drafts, &mut originals, txn)?;

        // Unlinked targets written in this operation stop pointing back,
        // unless another owner claimed them.
        for (target, property, owner) in dropped_refs {
            if let Some(draft) = drafts.get_mut(&target) {
                if draft.get(&property) == Some(&Value::Key(owner)) {
                    draft.set(property, Value::Null);
                }
            }
        }
        for (target, property, owner) in back_refs {
            if let Some(draft) = drafts.get_mut(&target) {
                draft.set(property, Value::Key(owner));
            }
        }

        // Only entities that differ from what is stored are written, and
        // children go before their parents.
        let mut puts: Vec<Entity> = drafts
            .into_values()
            .filter(|d| originals.get(d.key()) != Some(d))
            .collect();
        puts.sort_by_key(|e| std::cmp::Reverse(e.key().depth()));

        let mut delete_roots: Vec<Key> = op
            .changes()
            .iter()
            .filter_map(|c| match c {
                Change::Delete(key) => Some(key.clone()),
                _ => None,
            })
            .collect();
        delete_roots.extend(removed);
        let deleted = if delete_roots.is_empty() {
            Vec::new()
        } else {
            plan_cascade(self.catalog, self.store, &delete_roots, txn)?
        };

        let mut batch = MutationBatch::new();
        for entity in puts {
            batch.put(entity);
        }
        for key in &deleted {
            batch.delete(key.clone());
        }

        let assigned = AssignedKeys(
            op.nodes()
                .filter(|(_, n)| n.is_new())
                .filter_map(|(id, _)| prepared.key_of(id).map(|k| (id, k.clone())))
                .collect(),
        );
        debug!(
            assigned = assigned.len(),
            writes = batch.len(),
            deletes = deleted.len(),
            upgraded = upgraded.len(),
            "persist planned"
        );
        Ok(WritePlan {
            batch,
            assigned,
            upgraded,
            deleted,
        })
    }

    /// Compute ordinals for every ordered owned collection touched and set
    /// them on the members whose ordinal changes.
    fn stamp_ordinals(
        &self,
        jobs: &[OrdinalJob],
        drafts: &mut BTreeMap<Key, Entity>,
        originals: &mut HashMap<Key, Entity>,
        txn: Option<&TxnHandle>,
    ) -> MappingResult<()> {
        let new_keys: HashSet<&Key> = drafts
            .keys()
            .filter(|k| !originals.contains_key(*k))
            .collect();
        let to_read: Vec<Key> = jobs
            .iter()
            .filter(|j| !j.owner_is_new)
            .flat_map(|j| j.members.iter())
            .filter(|k| !new_keys.contains(k) && !drafts.contains_key(*k))
            .cloned()
            .collect::<HashSet<Key>>()
            .into_iter()
            .collect();
        let new_keys: HashSet<Key> = new_keys.into_iter().cloned().collect();

        if !to_read.is_empty() {
            for (key, found) in to_read.iter().zip(self.store.get_many(&to_read, txn)?) {
                let entity = found.ok_or_else(|| MappingError::MissingEntity(key.clone()))?;
                originals.insert(key.clone(), entity.clone());
                drafts.insert(key.clone(), entity);
            }
        }

        for job in jobs {
            let assignment = if job.owner_is_new {
                assign_on_insert(job.members.len())
            } else {
                let existing: Vec<Option<i64>> = job
                    .members
                    .iter()
                    .map(|k| {
                        if new_keys.contains(k) {
                            None
                        } else {
                            drafts.get(k).and_then(|e| e.get(&job.property)).and_then(Value::as_int)
                        }
                    })
                    .collect();
                if job.positional {
                    compact(&existing)
                } else if existing.iter().all(Option::is_some) {
                    repair_after_removal(&existing)
                } else {
                    repair_after_reorder(&existing)
                }
            };
            for pos in assignment.changed {
                let key = &job.members[pos];
                if let Some(draft) = drafts.get_mut(key) {
                    draft.set(job.property.clone(), assignment.ordinals[pos]);
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Planner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("sequence_appendage", &self.sequence_appendage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::catalog;
    use kin_alloc::AllocatorConfig;
    use kin_batch::{BatchCoordinator, CoordinatorConfig, Grouping, Mutation};
    use kin_meta::Catalog;
    use kin_store::InMemoryDatastore;
    use std::sync::Arc;

    struct Harness {
        store: Arc<InMemoryDatastore>,
        catalog: Arc<Catalog>,
        migrator: Migrator,
        alloc: BlockAllocator,
    }

    impl Harness {
        fn new() -> Self {
            let _ = tracing_subscriber::fmt().with_test_writer().try_init();
            let store = Arc::new(InMemoryDatastore::new());
            let catalog = catalog();
            Self {
                migrator: Migrator::new(store.clone(), catalog.clone()),
                alloc: BlockAllocator::new(store.clone(), AllocatorConfig::default()),
                store,
                catalog,
            }
        }

        fn plan(&mut self, op: &PersistOperation) -> MappingResult<WritePlan> {
            let planner = Planner::new(self.catalog.as_ref(), self.store.as_ref(), &self.migrator);
            let prepared = planner.prepare(op, &mut self.alloc)?;
            planner.plan(&prepared, None)
        }

        fn apply(&mut self, op: &PersistOperation) -> WritePlan {
            let plan = self.plan(op).unwrap();
            BatchCoordinator::new(self.store.clone(), CoordinatorConfig::default())
                .execute_now(plan.batch.clone(), Grouping::PerGroup)
                .unwrap();
            self.store.reset_stats().unwrap();
            plan
        }

        fn get(&self, key: &Key) -> Entity {
            self.store.get(key, None).unwrap().unwrap()
        }

        /// Book with three chapters; returns (book, chapters).
        fn book_with_chapters(&mut self) -> (Key, Vec<Key>) {
            let mut op = PersistOperation::new();
            let b = op.insert("Book");
            let chapters: Vec<NodeId> = (0..3).map(|_| op.insert("Chapter")).collect();
            op.link_many(b, "chapters", chapters.clone());
            let plan = self.apply(&op);
            let keys = chapters.iter().map(|c| plan.assigned.get(*c).unwrap().clone()).collect();
            (plan.assigned.get(b).unwrap().clone(), keys)
        }
    }

    fn puts(plan: &WritePlan) -> Vec<Key> {
        plan.batch.iter().filter(|m| m.is_put()).map(|m| m.key().clone()).collect()
    }

    fn ordinal(e: &Entity) -> Option<i64> {
        e.get("chapters_INTEGER_IDX").and_then(Value::as_int)
    }

    // ---- insert ----

    #[test]
    fn insert_writes_children_before_parent() {
        let mut h = Harness::new();
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let c1 = op.insert("Chapter");
        let c2 = op.insert("Chapter");
        op.set(b, "title", "Rust").link_many(b, "chapters", vec![c1, c2]);

        let plan = h.plan(&op).unwrap();
        let book = plan.assigned.get(b).unwrap().clone();
        let written = puts(&plan);
        assert_eq!(written.len(), 3);
        assert_eq!(written.last(), Some(&book));

        let parent = match plan.batch.get(&book) {
            Some(Mutation::Put(e)) => e.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(
            parent.get("chapters"),
            Some(&Value::KeyList(vec![
                plan.assigned.get(c1).unwrap().clone(),
                plan.assigned.get(c2).unwrap().clone()
            ]))
        );
        // Unset relationships are present but null.
        assert_eq!(parent.get("cover"), Some(&Value::Null));
        assert_eq!(parent.get("authors"), Some(&Value::Null));
        assert!(parent.get(DISCRIMINATOR_PROPERTY).is_none());
    }

    #[test]
    fn insert_assigns_ordinals() {
        let mut h = Harness::new();
        let (_, chapters) = h.book_with_chapters();
        let ordinals: Vec<Option<i64>> = chapters.iter().map(|c| ordinal(&h.get(c))).collect();
        assert_eq!(ordinals, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn polymorphic_members_share_root_kind() {
        let mut h = Harness::new();
        let mut op = PersistOperation::new();
        let canvas = op.insert("Canvas");
        let circle = op.insert("Circle");
        let square = op.insert("Square");
        op.set(circle, "radius", 2i64)
            .link_many(canvas, "shapes", vec![circle, square]);

        let plan = h.apply(&op);
        let circle_key = plan.assigned.get(circle).unwrap();
        let square_key = plan.assigned.get(square).unwrap();
        assert_eq!(circle_key.kind(), "Shape");
        assert_eq!(square_key.kind(), "Shape");
        assert_eq!(
            h.get(circle_key).get(DISCRIMINATOR_PROPERTY),
            Some(&Value::from("circle"))
        );
        assert_eq!(
            h.get(square_key).get(DISCRIMINATOR_PROPERTY),
            Some(&Value::from("Square"))
        );
    }

    #[test]
    fn unowned_bidirectional_sets_back_reference() {
        let mut h = Harness::new();
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let a = op.insert("Author");
        op.link_many(b, "authors", vec![a]);

        let plan = h.apply(&op);
        let book = plan.assigned.get(b).unwrap();
        let author = plan.assigned.get(a).unwrap();
        assert!(author.is_root());
        assert_eq!(h.get(author).get("book"), Some(&Value::Key(book.clone())));
        assert_eq!(h.get(book).get("authors"), Some(&Value::KeyList(vec![author.clone()])));
    }

    #[test]
    fn unlinked_author_written_in_same_operation_drops_back_reference() {
        let mut h = Harness::new();
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let a1 = op.insert("Author");
        let a2 = op.insert("Author");
        op.link_many(b, "authors", vec![a1, a2]);
        let plan = h.apply(&op);
        let book = plan.assigned.get(b).unwrap().clone();
        let kept = plan.assigned.get(a1).unwrap().clone();
        let dropped = plan.assigned.get(a2).unwrap().clone();

        let mut op = PersistOperation::new();
        let b = op.update("Book", book.clone());
        let a1 = op.existing("Author", kept.clone());
        let a2 = op.update("Author", dropped.clone());
        op.set(a2, "name", "Gone").link_many(b, "authors", vec![a1]);
        h.apply(&op);

        let author = h.get(&dropped);
        assert_eq!(author.get("book"), Some(&Value::Null));
        assert_eq!(author.get("name"), Some(&Value::from("Gone")));
        assert_eq!(h.get(&kept).get("book"), Some(&Value::Key(book.clone())));
        assert_eq!(h.get(&book).get("authors"), Some(&Value::KeyList(vec![kept])));
    }

    #[test]
    fn unowned_link_to_existing_object() {
        let mut h = Harness::new();
        h.store
            .put(&Entity::new(Key::new("Author", 9).unwrap()), None)
            .unwrap();
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let a = op.existing("Author", Key::new("Author", 9).unwrap());
        op.link_many(b, "authors", vec![a]);

        let plan = h.plan(&op).unwrap();
        assert_eq!(plan.batch.len(), 1);
    }

    // ---- update ----

    #[test]
    fn child_update_rewrites_only_child() {
        let mut h = Harness::new();
        let (_, chapters) = h.book_with_chapters();
        let mut op = PersistOperation::new();
        let c = op.update("Chapter", chapters[1].clone());
        op.set(c, "title", "Middle");

        let plan = h.plan(&op).unwrap();
        assert_eq!(puts(&plan), vec![chapters[1].clone()]);
    }

    #[test]
    fn unchanged_parent_is_not_rewritten() {
        let mut h = Harness::new();
        let (book, chapters) = h.book_with_chapters();
        let mut op = PersistOperation::new();
        let b = op.update("Book", book);
        let members: Vec<NodeId> = chapters.iter().map(|c| op.existing("Chapter", c.clone())).collect();
        op.link_many(b, "chapters", members);

        let plan = h.plan(&op).unwrap();
        assert!(plan.batch.is_empty());
    }

    #[test]
    fn remove_subset_keeps_survivor_ordinals() {
        let mut h = Harness::new();
        let (book, chapters) = h.book_with_chapters();
        let mut op = PersistOperation::new();
        let b = op.update("Book", book.clone());
        let c1 = op.existing("Chapter", chapters[0].clone());
        let c3 = op.existing("Chapter", chapters[2].clone());
        op.link_many(b, "chapters", vec![c1, c3]);

        let plan = h.apply(&op);
        assert_eq!(puts(&plan), vec![book.clone()]);
        assert_eq!(plan.deleted, vec![chapters[1].clone()]);
        assert_eq!(ordinal(&h.get(&chapters[0])), Some(0));
        assert_eq!(ordinal(&h.get(&chapters[2])), Some(2));
    }

    #[test]
    fn reorder_rewrites_moved_members() {
        let mut h = Harness::new();
        let (book, chapters) = h.book_with_chapters();
        let mut op = PersistOperation::new();
        let b = op.update("Book", book.clone());
        let nodes: Vec<NodeId> = [1, 2, 0]
            .iter()
            .map(|i| op.existing("Chapter", chapters[*i].clone()))
            .collect();
        op.link_many(b, "chapters", nodes);

        let plan = h.apply(&op);
        // C2 and C3 keep 1 and 2; C1 moves to the end.
        assert_eq!(puts(&plan).len(), 2);
        assert_eq!(ordinal(&h.get(&chapters[1])), Some(1));
        assert_eq!(ordinal(&h.get(&chapters[2])), Some(2));
        assert_eq!(ordinal(&h.get(&chapters[0])), Some(3));
    }

    #[test]
    fn insert_at_position_in_existing_list() {
        let mut h = Harness::new();
        let (book, chapters) = h.book_with_chapters();
        let mut op = PersistOperation::new();
        let b = op.update("Book", book);
        let c1 = op.existing("Chapter", chapters[0].clone());
        let fresh = op.insert("Chapter");
        let c2 = op.existing("Chapter", chapters[1].clone());
        let c3 = op.existing("Chapter", chapters[2].clone());
        op.link_many(b, "chapters", vec![c1, fresh, c2, c3]);

        let plan = h.apply(&op);
        let fresh_key = plan.assigned.get(fresh).unwrap();
        assert_eq!(ordinal(&h.get(&chapters[0])), Some(0));
        assert_eq!(ordinal(&h.get(fresh_key)), Some(1));
        assert_eq!(ordinal(&h.get(&chapters[1])), Some(2));
        assert_eq!(ordinal(&h.get(&chapters[2])), Some(3));
    }

    #[test]
    fn positional_mode_compacts() {
        let mut h = Harness::new();
        let (book, chapters) = h.book_with_chapters();
        let mut op = PersistOperation::new();
        let b = op.update("Book", book);
        let c1 = op.existing("Chapter", chapters[0].clone());
        let c3 = op.existing("Chapter", chapters[2].clone());
        op.link_many(b, "chapters", vec![c1, c3]).mark_positional(b, "chapters");

        h.apply(&op);
        assert_eq!(ordinal(&h.get(&chapters[2])), Some(1));
    }

    #[test]
    fn clear_deletes_members_and_nulls_property() {
        let mut h = Harness::new();
        let (book, chapters) = h.book_with_chapters();
        let mut op = PersistOperation::new();
        let b = op.update("Book", book.clone());
        op.clear(b, "chapters", true);

        let plan = h.apply(&op);
        assert_eq!(plan.deleted.len(), 3);
        let stored = h.get(&book);
        assert_eq!(stored.get("chapters"), Some(&Value::Null));
        for c in &chapters {
            assert!(h.store.get(c, None).unwrap().is_none());
        }
    }

    #[test]
    fn replacing_one_to_one_deletes_old_child() {
        let mut h = Harness::new();
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let cover = op.insert("Cover");
        op.link_one(b, "cover", Some(cover));
        let first = h.apply(&op);
        let book = first.assigned.get(b).unwrap().clone();
        let old_cover = first.assigned.get(cover).unwrap().clone();

        let mut op = PersistOperation::new();
        let b = op.update("Book", book.clone());
        let new_cover = op.insert("Cover");
        op.link_one(b, "cover", Some(new_cover));
        let plan = h.apply(&op);

        assert_eq!(plan.deleted, vec![old_cover]);
        let new_key = plan.assigned.get(new_cover).unwrap();
        assert_eq!(new_key.parent(), Some(&book));
        assert_eq!(h.get(&book).get("cover"), Some(&Value::Key(new_key.clone())));
    }

    #[test]
    fn update_of_missing_entity() {
        let mut h = Harness::new();
        let mut op = PersistOperation::new();
        let b = op.update("Book", Key::new("Book", 404).unwrap());
        op.set(b, "title", "x");
        let err = h.plan(&op).unwrap_err();
        assert_eq!(err, MappingError::MissingEntity(Key::new("Book", 404).unwrap()));
    }

    #[test]
    fn update_upgrades_old_layout() {
        let mut h = Harness::new();
        let book = Key::new("Book", 1).unwrap();
        let chapter = Key::with_parent(&book, "Chapter", 1).unwrap();
        h.store
            .put_many(
                &[
                    Entity::new(book.clone()).with("title", "old"),
                    Entity::new(chapter.clone()).with("chapters_INTEGER_IDX", 0i64),
                ],
                None,
            )
            .unwrap();

        let mut op = PersistOperation::new();
        let b = op.update("Book", book.clone());
        op.set(b, "title", "new");
        let plan = h.apply(&op);

        assert_eq!(plan.upgraded, vec![book.clone()]);
        let stored = h.get(&book);
        assert_eq!(stored.get("chapters"), Some(&Value::KeyList(vec![chapter])));
        assert_eq!(stored.get("title"), Some(&Value::from("new")));
    }

    // ---- delete ----

    #[test]
    fn delete_cascades_through_owned_tree() {
        let mut h = Harness::new();
        let mut op = PersistOperation::new();
        let b = op.insert("Book");
        let c = op.insert("Chapter");
        let p = op.insert("Paragraph");
        let a = op.insert("Author");
        op.link_many(b, "chapters", vec![c])
            .link_many(c, "paragraphs", vec![p])
            .link_many(b, "authors", vec![a]);
        let plan = h.apply(&op);
        let book = plan.assigned.get(b).unwrap().clone();
        let author = plan.assigned.get(a).unwrap().clone();

        let mut op = PersistOperation::new();
        op.delete(book.clone());
        let plan = h.apply(&op);
        assert_eq!(plan.deleted.len(), 3);
        assert_eq!(plan.deleted.last(), Some(&book));
        assert_eq!(h.store.all_keys().unwrap(), vec![author]);
    }
}
