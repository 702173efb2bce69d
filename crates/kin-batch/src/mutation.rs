use std::collections::{BTreeMap, HashMap};

use kin_types::{Entity, Key};

/// One physical write.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Put(Entity),
    Delete(Key),
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Self::Put(entity) => entity.key(),
            Self::Delete(key) => key,
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, Self::Put(_))
    }
}

/// Writes destined for one entity group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupWrites {
    pub puts: Vec<Entity>,
    pub deletes: Vec<Key>,
}

impl GroupWrites {
    pub fn len(&self) -> usize {
        self.puts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }

    /// The first write in the group, puts before deletes.
    pub fn first(&self) -> Option<(&Key, bool)> {
        self.puts
            .first()
            .map(|e| (e.key(), true))
            .or_else(|| self.deletes.first().map(|k| (k, false)))
    }
}

/// Ordered set of mutations with at most one mutation per key.
///
/// A later mutation of an already-present key replaces the earlier one in
/// place: the last write wins, and it keeps the first one's position.
#[derive(Clone, Debug, Default)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
    positions: HashMap<Key, usize>,
    collapsed: usize,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        match self.positions.get(mutation.key()) {
            Some(&idx) => {
                self.mutations[idx] = mutation;
                self.collapsed += 1;
            }
            None => {
                self.positions
                    .insert(mutation.key().clone(), self.mutations.len());
                self.mutations.push(mutation);
            }
        }
    }

    pub fn put(&mut self, entity: Entity) {
        self.push(Mutation::Put(entity));
    }

    pub fn delete(&mut self, key: Key) {
        self.push(Mutation::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Mutations merged into an earlier one for the same key.
    pub fn collapsed(&self) -> usize {
        self.collapsed
    }

    pub fn get(&self, key: &Key) -> Option<&Mutation> {
        self.positions.get(key).map(|&idx| &self.mutations[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    /// Root keys of the entity groups touched, in key order.
    pub fn group_roots(&self) -> Vec<Key> {
        let mut roots: Vec<Key> = self.mutations.iter().map(|m| m.key().root().clone()).collect();
        roots.sort();
        roots.dedup();
        roots
    }

    /// Split into per-group writes keyed by root key, preserving order
    /// within each group.
    pub fn into_groups(self) -> BTreeMap<Key, GroupWrites> {
        let mut groups: BTreeMap<Key, GroupWrites> = BTreeMap::new();
        for mutation in self.mutations {
            let writes = groups.entry(mutation.key().root().clone()).or_default();
            match mutation {
                Mutation::Put(entity) => writes.puts.push(entity),
                Mutation::Delete(key) => writes.deletes.push(key),
            }
        }
        groups
    }
}

impl Extend<Mutation> for MutationBatch {
    fn extend<I: IntoIterator<Item = Mutation>>(&mut self, iter: I) {
        for mutation in iter {
            self.push(mutation);
        }
    }
}

impl FromIterator<Mutation> for MutationBatch {
    fn from_iter<I: IntoIterator<Item = Mutation>>(iter: I) -> Self {
        let mut batch = Self::new();
        batch.extend(iter);
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kin_types::Value;

    fn key(id: i64) -> Key {
        Key::new("Book", id).unwrap()
    }

    #[test]
    fn repeated_puts_collapse_to_last() {
        let mut batch = MutationBatch::new();
        batch.put(Entity::new(key(1)).with("v", 1i64));
        batch.put(Entity::new(key(2)));
        batch.put(Entity::new(key(1)).with("v", 2i64));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.collapsed(), 1);
        let first = batch.iter().next().unwrap();
        match first {
            Mutation::Put(e) => assert_eq!(e.get("v"), Some(&Value::Int(2))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn delete_after_put_wins() {
        let mut batch = MutationBatch::new();
        batch.put(Entity::new(key(1)));
        batch.delete(key(1));
        assert_eq!(batch.get(&key(1)), Some(&Mutation::Delete(key(1))));
    }

    #[test]
    fn put_after_delete_is_put() {
        let mut batch = MutationBatch::new();
        batch.delete(key(1));
        batch.put(Entity::new(key(1)));
        assert!(batch.get(&key(1)).unwrap().is_put());
    }

    #[test]
    fn groups_split_by_root() {
        let parent = key(1);
        let child = Key::with_parent(&parent, "Chapter", 1).unwrap();
        let batch: MutationBatch = vec![
            Mutation::Put(Entity::new(child.clone())),
            Mutation::Put(Entity::new(key(2))),
            Mutation::Delete(parent.clone()),
        ]
        .into_iter()
        .collect();

        assert_eq!(batch.group_roots(), vec![key(1), key(2)]);
        let groups = batch.into_groups();
        let first = &groups[&key(1)];
        assert_eq!(first.puts.len(), 1);
        assert_eq!(first.deletes, vec![parent]);
        assert_eq!(first.first(), Some((&child, true)));
    }
}
