use std::collections::HashSet;

use kin_types::{Key, Value};

/// Life cycle of a relationship member, seen from its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Not part of the relationship.
    Unlinked,
    /// Added in this operation, not yet written.
    Linked,
    /// Stored as a member before and still a member.
    Persisted,
    /// Stored as a member before and dropped in this operation.
    Removed,
}

impl LinkState {
    /// Transition for a member given whether it was stored as a member and
    /// whether it is one now.
    pub fn transition(was_member: bool, is_member: bool) -> Self {
        match (was_member, is_member) {
            (false, false) => Self::Unlinked,
            (false, true) => Self::Linked,
            (true, true) => Self::Persisted,
            (true, false) => Self::Removed,
        }
    }
}

/// Member keys stored in a relationship property. Null and absent are both
/// empty here.
pub fn stored_members(value: Option<&Value>) -> Vec<Key> {
    value
        .map(|v| v.referenced_keys().into_iter().cloned().collect())
        .unwrap_or_default()
}

/// Pair every old and new member with its transition, new members first in
/// list order, then removed ones in stored order.
pub fn member_transitions(before: &[Key], after: &[Key]) -> Vec<(Key, LinkState)> {
    let old: HashSet<&Key> = before.iter().collect();
    let new: HashSet<&Key> = after.iter().collect();
    let mut out: Vec<(Key, LinkState)> = after
        .iter()
        .map(|k| (k.clone(), LinkState::transition(old.contains(k), true)))
        .collect();
    out.extend(
        before
            .iter()
            .filter(|k| !new.contains(k))
            .map(|k| (k.clone(), LinkState::Removed)),
    );
    out
}

/// Property value for a relationship holding `members`. Cleared
/// relationships are present but null.
pub fn relation_value(members: Vec<Key>, collection: bool) -> Value {
    match (collection, members.len()) {
        (_, 0) => Value::Null,
        (false, _) => members.into_iter().next().map_or(Value::Null, Value::Key),
        (true, _) => Value::KeyList(members),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: i64) -> Key {
        Key::with_parent(&Key::new("Book", 1).unwrap(), "Chapter", id).unwrap()
    }

    #[test]
    fn transitions() {
        let got = member_transitions(&[ch(1), ch(2), ch(3)], &[ch(3), ch(1), ch(4)]);
        assert_eq!(
            got,
            vec![
                (ch(3), LinkState::Persisted),
                (ch(1), LinkState::Persisted),
                (ch(4), LinkState::Linked),
                (ch(2), LinkState::Removed),
            ]
        );
    }

    #[test]
    fn stored_members_of_null_and_absent() {
        assert!(stored_members(None).is_empty());
        assert!(stored_members(Some(&Value::Null)).is_empty());
        assert_eq!(stored_members(Some(&Value::Key(ch(1)))), vec![ch(1)]);
    }

    #[test]
    fn empty_relation_is_null() {
        assert_eq!(relation_value(vec![], true), Value::Null);
        assert_eq!(relation_value(vec![], false), Value::Null);
        assert_eq!(relation_value(vec![ch(1)], false), Value::Key(ch(1)));
        assert_eq!(relation_value(vec![ch(1)], true), Value::KeyList(vec![ch(1)]));
    }
}
