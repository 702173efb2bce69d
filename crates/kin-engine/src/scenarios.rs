//! End-to-end behavior of the engine against the in-memory store.
//!
//! Physical writes are counted through the engine's [`WriteCounter`]
//! observer, so each test checks exactly what reached the store.

use std::collections::HashSet;
use std::sync::Arc;

use kin_alloc::SequenceContext;
use kin_batch::{BatchError, MutationKind};
use kin_mapping::{ErrorClass, MappingError, NodeId, PersistOperation};
use kin_migrate::MigrationError;
use kin_store::{Datastore, Fault, InMemoryDatastore, StoreOp};
use kin_types::{Entity, Key, Value};
use proptest::prelude::*;

use crate::config::EngineConfig;
use crate::engine::{Engine, MigrationStatus};
use crate::error::PersistError;
use crate::fixtures::{library, setup, Setup};

const ORDINAL: &str = "chapters_INTEGER_IDX";

/// Persist a book with `n` chapters and return (book, chapters).
fn book_with_chapters(s: &mut Setup, n: usize) -> (Key, Vec<Key>) {
    let mut op = PersistOperation::new();
    let b = op.insert("Book");
    let chapters: Vec<NodeId> = (0..n).map(|_| op.insert("Chapter")).collect();
    op.set(b, "title", "P").link_many(b, "chapters", chapters.clone());
    let keys = s.engine.persist(&op).unwrap();

    let book = keys.get(b).unwrap().clone();
    let chapters = chapters.iter().map(|c| keys.get(*c).unwrap().clone()).collect();
    s.writes.reset();
    s.store.reset_stats().unwrap();
    (book, chapters)
}

/// Keep only `keep` (indexes into `chapters`) in the book's list.
fn keep_chapters(s: &mut Setup, book: &Key, chapters: &[Key], keep: &[usize]) {
    let mut op = PersistOperation::new();
    let b = op.update("Book", book.clone());
    let members = keep
        .iter()
        .map(|i| op.existing("Chapter", chapters[*i].clone()))
        .collect();
    op.link_many(b, "chapters", members);
    s.engine.persist(&op).unwrap();
}

fn stored(s: &Setup, key: &Key) -> Option<Entity> {
    s.store.get(key, None).unwrap()
}

fn ordinal(s: &Setup, key: &Key) -> Option<i64> {
    stored(s, key)?.get(ORDINAL).and_then(Value::as_int)
}

// ---- key immutability ----

#[test]
fn owned_child_cannot_move_to_another_parent() {
    let mut s = setup();
    let (first, chapters) = book_with_chapters(&mut s, 1);
    let (second, _) = book_with_chapters(&mut s, 0);

    let mut op = PersistOperation::new();
    let b = op.update("Book", second.clone());
    let c = op.existing("Chapter", chapters[0].clone());
    op.link_many(b, "chapters", vec![c]);

    let err = s.engine.persist(&op).unwrap_err();
    assert_eq!(
        err,
        PersistError::Mapping(MappingError::CannotReparentOwnedChild {
            child: chapters[0].clone(),
            current_parent: Some(first.clone()),
            new_parent: second.clone(),
        })
    );
    assert_eq!(err.class(), ErrorClass::Configuration);

    // Nothing was read or written, and the child still lives under its parent.
    let stats = s.store.stats().unwrap();
    assert_eq!(stats.get_calls, 0);
    assert_eq!(stats.write_round_trips(), 0);
    assert_eq!(stored(&s, &chapters[0]).unwrap().key().parent(), Some(&first));
    assert_eq!(stored(&s, &second).unwrap().get("chapters"), Some(&Value::Null));
}

#[test]
fn new_parent_cannot_adopt_persisted_child() {
    let mut s = setup();
    let (_, chapters) = book_with_chapters(&mut s, 1);

    let mut op = PersistOperation::new();
    let b = op.insert("Book");
    let c = op.existing("Chapter", chapters[0].clone());
    op.link_many(b, "chapters", vec![c]);

    let err = s.engine.persist(&op).unwrap_err();
    assert!(matches!(
        err,
        PersistError::Mapping(MappingError::CannotAdoptExistingOwnedChild { .. })
    ));
    assert_eq!(s.store.stats().unwrap().id_reservations, 0);
    assert_eq!(s.writes.total(), 0);
}

// ---- cascade completeness ----

#[test]
fn deleting_parent_deletes_every_owned_child() {
    let mut s = setup();
    let (book, chapters) = book_with_chapters(&mut s, 3);

    s.engine.delete(std::slice::from_ref(&book)).unwrap();

    assert_eq!(s.writes.deletes(), 4);
    assert_eq!(s.writes.puts(), 0);
    assert!(stored(&s, &book).is_none());
    for c in &chapters {
        assert!(stored(&s, c).is_none());
    }
    assert!(s.store.is_empty().unwrap());
}

#[test]
fn cascade_reaches_grandchildren() {
    let mut s = setup();
    let mut op = PersistOperation::new();
    let b = op.insert("Book");
    let c1 = op.insert("Chapter");
    let c2 = op.insert("Chapter");
    let paragraphs: Vec<NodeId> = (0..3).map(|_| op.insert("Paragraph")).collect();
    op.link_many(b, "chapters", vec![c1, c2])
        .link_many(c1, "paragraphs", paragraphs[..2].to_vec())
        .link_many(c2, "paragraphs", paragraphs[2..].to_vec());
    let keys = s.engine.persist(&op).unwrap();
    s.writes.reset();

    let mut delete = PersistOperation::new();
    delete.delete(keys.get(b).unwrap().clone());
    s.engine.persist(&delete).unwrap();

    assert_eq!(s.writes.deletes(), 6);
    assert!(s.store.is_empty().unwrap());
}

#[test]
fn cascade_finds_children_of_old_layout_parent() {
    let s = setup();
    let book = Key::new("Book", 1i64).unwrap();
    s.store.put(&Entity::new(book.clone()), None).unwrap();
    for i in 1..=2i64 {
        let c = Key::with_parent(&book, "Chapter", i).unwrap();
        s.store.put(&Entity::new(c).with(ORDINAL, i - 1), None).unwrap();
    }

    s.engine.delete(&[book]).unwrap();
    assert_eq!(s.writes.deletes(), 3);
    assert!(s.store.is_empty().unwrap());
}

// ---- write minimality ----

#[test]
fn editing_one_child_is_one_physical_write() {
    let mut s = setup();
    let (book, chapters) = book_with_chapters(&mut s, 3);

    let mut op = PersistOperation::new();
    let c = op.update("Chapter", chapters[1].clone());
    op.set(c, "title", "Middle");
    s.engine.persist(&op).unwrap();

    assert_eq!(s.writes.total(), 1);
    assert_eq!(s.writes.keys(), vec![chapters[1].clone()]);
    assert_eq!(
        stored(&s, &chapters[1]).unwrap().get("title"),
        Some(&Value::from("Middle"))
    );
    assert_eq!(
        stored(&s, &book).unwrap().get("chapters"),
        Some(&Value::KeyList(chapters))
    );
}

#[test]
fn unchanged_update_writes_nothing() {
    let mut s = setup();
    let (book, _) = book_with_chapters(&mut s, 2);

    let mut op = PersistOperation::new();
    let b = op.update("Book", book);
    op.set(b, "title", "P");
    s.engine.persist(&op).unwrap();

    assert_eq!(s.writes.total(), 0);
    assert_eq!(s.store.stats().unwrap().write_round_trips(), 0);
}

// ---- index stability ----

#[test]
fn partial_removal_keeps_surviving_ordinals() {
    let mut s = setup();
    let (book, chapters) = book_with_chapters(&mut s, 5);

    keep_chapters(&mut s, &book, &chapters, &[0, 2, 4]);

    assert_eq!(s.writes.puts(), 1);
    assert_eq!(s.writes.deletes(), 2);
    assert_eq!(ordinal(&s, &chapters[0]), Some(0));
    assert_eq!(ordinal(&s, &chapters[2]), Some(2));
    assert_eq!(ordinal(&s, &chapters[4]), Some(4));
    assert!(stored(&s, &chapters[1]).is_none());
    assert!(stored(&s, &chapters[3]).is_none());
}

#[test]
fn remove_middle_child_end_to_end() {
    let mut s = setup();
    let (p, c) = book_with_chapters(&mut s, 3);
    assert_eq!(
        c.iter().map(|k| ordinal(&s, k)).collect::<Vec<_>>(),
        vec![Some(0), Some(1), Some(2)]
    );
    assert!(c.iter().all(|k| k.parent() == Some(&p)));

    keep_chapters(&mut s, &p, &c, &[0, 2]);

    let parent = stored(&s, &p).unwrap();
    assert_eq!(
        parent.get("chapters"),
        Some(&Value::KeyList(vec![c[0].clone(), c[2].clone()]))
    );
    assert!(stored(&s, &c[1]).is_none());
    assert_eq!(ordinal(&s, &c[0]), Some(0));
    assert_eq!(ordinal(&s, &c[2]), Some(2));
    assert_eq!(s.writes.puts(), 1);
    assert_eq!(s.writes.deletes(), 1);

    let loaded = s.engine.load(&p, "Book").unwrap();
    assert_eq!(loaded.migration, MigrationStatus::Current);
}

// ---- migration ----

fn old_layout_book(store: &InMemoryDatastore) -> (Key, Vec<Key>) {
    let book = Key::new("Book", 1i64).unwrap();
    store.put(&Entity::new(book.clone()).with("title", "Old"), None).unwrap();
    let chapters: Vec<Key> = (1..=3i64)
        .map(|i| Key::with_parent(&book, "Chapter", i).unwrap())
        .collect();
    // Written out of order; the ordinal decides list position.
    for (ordinal, c) in [(2i64, &chapters[2]), (0, &chapters[0]), (1, &chapters[1])] {
        store
            .put(
                &Entity::new(c.clone()).with(ORDINAL, ordinal).with("paragraphs", Value::Null),
                None,
            )
            .unwrap();
    }
    store.reset_stats().unwrap();
    (book, chapters)
}

#[test]
fn migration_is_idempotent() {
    let s = setup();
    let (book, chapters) = old_layout_book(&s.store);

    let first = s.engine.migrate_kind("Book").unwrap();
    assert_eq!(first.changed, vec![book.clone()]);
    let migrated = stored(&s, &book).unwrap();
    assert_eq!(migrated.get("chapters"), Some(&Value::KeyList(chapters)));
    assert_eq!(migrated.get("title"), Some(&Value::from("Old")));

    let second = s.engine.migrate_kind("Book").unwrap();
    assert!(second.changed.is_empty());
    assert_eq!(stored(&s, &book).unwrap(), migrated);
    assert_eq!(s.writes.puts(), 1);
    assert_eq!(
        s.engine.load(&book, "Book").unwrap().migration,
        MigrationStatus::Current
    );
}

#[test]
fn update_writes_old_layout_entity_upgraded() {
    let mut s = setup();
    let (book, chapters) = old_layout_book(&s.store);

    let mut op = PersistOperation::new();
    let b = op.update("Book", book.clone());
    op.set(b, "title", "New");
    s.engine.persist(&op).unwrap();

    let written = stored(&s, &book).unwrap();
    assert_eq!(written.get("title"), Some(&Value::from("New")));
    assert_eq!(written.get("chapters"), Some(&Value::KeyList(chapters)));
    assert_eq!(s.writes.keys(), vec![book.clone()]);
    assert!(s.engine.migrate_kind("Book").unwrap().changed.is_empty());
}

/// An old-layout book whose only chapter has no ordinal, so its list
/// cannot be rebuilt.
fn unmigratable_book(store: &InMemoryDatastore) -> (Key, Key) {
    let book = Key::new("Book", 1i64).unwrap();
    let chapter = Key::with_parent(&book, "Chapter", 1i64).unwrap();
    store.put(&Entity::new(book.clone()).with("title", "Old"), None).unwrap();
    store.put(&Entity::new(chapter.clone()), None).unwrap();
    store.reset_stats().unwrap();
    (book, chapter)
}

#[test]
fn scalar_update_of_unmigratable_entity_keeps_old_layout() {
    let mut s = setup();
    let (book, chapter) = unmigratable_book(&s.store);

    let mut op = PersistOperation::new();
    let b = op.update("Book", book.clone());
    op.set(b, "title", "New");
    s.engine.persist(&op).unwrap();

    let written = stored(&s, &book).unwrap();
    assert_eq!(written.get("title"), Some(&Value::from("New")));
    assert!(!written.has("chapters"));
    assert_eq!(s.writes.keys(), vec![book.clone()]);
    assert!(stored(&s, &chapter).is_some());
}

#[test]
fn relinking_unresolved_field_is_refused() {
    let mut s = setup();
    let (book, _) = unmigratable_book(&s.store);

    let mut op = PersistOperation::new();
    let b = op.update("Book", book.clone());
    let c = op.insert("Chapter");
    op.link_many(b, "chapters", vec![c]);

    let err = s.engine.persist(&op).unwrap_err();
    assert_eq!(
        err,
        PersistError::Mapping(MappingError::Migration(MigrationError::Incomplete {
            key: book.clone(),
            missing: vec!["chapters".into()],
        }))
    );
    assert_eq!(err.class(), ErrorClass::Migration);
    assert_eq!(s.writes.total(), 0);
    assert_eq!(stored(&s, &book).unwrap().get("title"), Some(&Value::from("Old")));
}

// ---- allocation ----

#[test]
fn engines_sharing_a_store_assign_distinct_keys() {
    let store = Arc::new(InMemoryDatastore::new());
    let small = EngineConfig {
        default_key_cache_size: 2,
        ..Default::default()
    };
    let mut a = Engine::new(store.clone(), library(), small.clone());
    let mut b = Engine::new(store.clone(), library(), small);

    let mut seen = HashSet::new();
    for round in 0..5 {
        let engine = if round % 2 == 0 { &mut a } else { &mut b };
        let mut op = PersistOperation::new();
        let authors: Vec<NodeId> = (0..3).map(|_| op.insert("Author")).collect();
        let keys = engine.persist(&op).unwrap();
        for node in authors {
            assert!(seen.insert(keys.get(node).unwrap().clone()));
        }
    }
    assert_eq!(store.len().unwrap(), 15);
}

proptest! {
    #[test]
    fn interleaved_allocation_never_collides(
        requests in prop::collection::vec((any::<bool>(), 1u64..12), 1..30),
    ) {
        let store = Arc::new(InMemoryDatastore::new());
        let mut a = Engine::new(store.clone(), library(), EngineConfig::default());
        let mut b = Engine::new(
            store.clone(),
            library(),
            EngineConfig { default_key_cache_size: 3, ..Default::default() },
        );
        let ctx = SequenceContext::for_kind("Author");

        let mut seen = HashSet::new();
        for (use_a, count) in requests {
            let engine = if use_a { &mut a } else { &mut b };
            for id in engine.allocate(&ctx, count).unwrap() {
                prop_assert!(seen.insert(id), "id {} issued twice", id);
            }
        }
    }
}

// ---- failures ----

#[test]
fn partial_failure_reports_applied_groups() {
    let mut s = setup();
    s.store.inject(Fault::unavailable(StoreOp::Put).after(1)).unwrap();

    let mut op = PersistOperation::new();
    op.insert("Book");
    op.insert("Book");
    let err = s.engine.persist(&op).unwrap_err();

    assert_eq!(err.class(), ErrorClass::Store);
    let progress = err.progress().unwrap();
    assert!(progress.is_partial());
    assert_eq!(progress.applied.len(), 1);
    assert_eq!(progress.unapplied.len(), 1);
    assert!(stored(&s, &progress.applied[0]).is_some());
    assert!(stored(&s, &progress.unapplied[0]).is_none());
    assert_eq!(s.writes.puts(), 1);
}

#[test]
fn commit_conflict_applies_nothing() {
    let mut s = setup();
    let (book, _) = book_with_chapters(&mut s, 1);
    s.store.inject(Fault::conflict(StoreOp::Commit)).unwrap();

    let mut op = PersistOperation::new().transactional();
    let b = op.update("Book", book.clone());
    op.set(b, "title", "Q");
    let err = s.engine.persist(&op).unwrap_err();

    assert_eq!(err.class(), ErrorClass::Concurrency);
    match &err {
        PersistError::Batch(BatchError::ConcurrentModification { failed, .. }) => {
            assert_eq!(failed.group, book);
            assert_eq!(failed.kind, MutationKind::Put);
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
    assert_eq!(stored(&s, &book).unwrap().get("title"), Some(&Value::from("P")));
    assert_eq!(s.writes.total(), 0);
}
