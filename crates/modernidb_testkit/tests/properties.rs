//! Model-based property tests: the catalog against a `BTreeMap`.

use modernidb::{AsyncOp, CursorDirection, Key, TransactionMode, TransactionOptions};
use modernidb_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn apply(writes: &[Write]) -> (TestFactory, modernidb::ModernIdb, BTreeMap<String, Item>) {
    let factory = TestFactory::memory();
    let db = open_catalog(&factory);
    let mut model = BTreeMap::new();
    let (items, done) = db
        .transaction::<Item>("items", TransactionMode::ReadWrite, TransactionOptions::default())
        .unwrap();
    for write in writes {
        match write {
            Write::Put(item) => {
                items.put(item, None).unwrap();
                model.insert(item.id.clone(), item.clone());
            }
            Write::Delete(id) => {
                items.delete(id.as_str()).unwrap();
                model.remove(id);
            }
        }
    }
    done.wait().unwrap();
    (factory, db, model)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn store_matches_model(writes in write_sequence_strategy(40)) {
        let (_factory, db, model) = apply(&writes);
        let (items, _done) = db
            .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        let stored = items.get_all(None, None).unwrap();
        let expected: Vec<Item> = model.values().cloned().collect();
        prop_assert_eq!(stored, expected);
        prop_assert_eq!(items.count(None).unwrap(), model.len() as u64);
    }

    #[test]
    fn cursors_follow_direction(writes in write_sequence_strategy(30), direction in direction_strategy()) {
        let (_factory, db, model) = apply(&writes);
        let (items, _done) = db
            .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        let seen: Vec<String> = items
            .open_cursor(None, direction)
            .unwrap()
            .map(|cursor| cursor.unwrap().into_value().id)
            .collect();
        // Primary keys are unique, so the unique directions change nothing.
        let mut expected: Vec<String> = model.keys().cloned().collect();
        if matches!(direction, CursorDirection::Prev | CursorDirection::PrevUnique) {
            expected.reverse();
        }
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn range_counts_match_model(writes in write_sequence_strategy(30), range in key_range_strategy()) {
        let (_factory, db, model) = apply(&writes);
        let (items, _done) = db
            .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        let expected = model
            .keys()
            .filter(|id| range.includes(&Key::from(id.as_str())))
            .count();
        prop_assert_eq!(items.count(Some(range)).unwrap(), expected as u64);
    }

    #[test]
    fn tag_index_has_one_entry_per_distinct_tag(writes in write_sequence_strategy(30)) {
        let (_factory, db, model) = apply(&writes);
        let (items, _done) = db
            .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        let expected: usize = model
            .values()
            .map(|item| {
                let mut tags = item.tags.clone();
                tags.sort();
                tags.dedup();
                tags.len()
            })
            .sum();
        let by_tag = items.index("by_tag").unwrap();
        prop_assert_eq!(by_tag.count(None).unwrap(), expected as u64);
    }

    #[test]
    fn fold_takes_the_first_failure(ops in prop::collection::vec(0u8..3, 0..8)) {
        let ops: Vec<AsyncOp<u8, usize>> = ops
            .iter()
            .enumerate()
            .map(|(i, kind)| match kind {
                0 => AsyncOp::Success(i as u8),
                1 => AsyncOp::Pending,
                _ => AsyncOp::Failure(i),
            })
            .collect();
        let first_failure = ops.iter().find_map(|op| op.as_ref().failure().copied());
        let any_pending = ops.iter().any(AsyncOp::is_pending);
        let folded = AsyncOp::fold(ops.clone());
        match (first_failure, any_pending) {
            (Some(index), _) => prop_assert_eq!(folded, AsyncOp::Failure(index)),
            (None, true) => prop_assert!(folded.is_pending()),
            (None, false) => prop_assert_eq!(folded.success().map(|v| v.len()), Some(ops.len())),
        }
    }
}
