//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, key ranges, catalog items and write
//! sequences.

use crate::fixtures::Item;
use modernidb::{CursorDirection, Key, KeyRange};
use proptest::prelude::*;

/// Strategy for valid keys of every kind, nested up to two array levels.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    let leaf = prop_oneof![
        (-1.0e9f64..1.0e9).prop_map(Key::Number),
        (0.0f64..1.0e12).prop_map(Key::Date),
        "[a-z]{0,6}".prop_map(Key::String),
        prop::collection::vec(any::<u8>(), 0..4).prop_map(Key::Binary),
    ];
    leaf.prop_recursive(2, 8, 3, |inner| {
        prop::collection::vec(inner, 0..3).prop_map(Key::Array)
    })
}

/// Strategy for short string keys; collisions are likely, which is what
/// put/delete sequences want.
pub fn small_string_key_strategy() -> impl Strategy<Value = String> {
    "[a-f]{1,2}"
}

fn bound_strategy() -> impl Strategy<Value = (String, bool)> {
    (small_string_key_strategy(), any::<bool>())
}

/// Strategy for ranges over [`small_string_key_strategy`] keys, including
/// single-key and half-open ranges.
pub fn key_range_strategy() -> impl Strategy<Value = KeyRange> {
    prop_oneof![
        small_string_key_strategy().prop_map(KeyRange::only),
        bound_strategy().prop_map(|(key, open)| KeyRange::lower_bound(key, open)),
        bound_strategy().prop_map(|(key, open)| KeyRange::upper_bound(key, open)),
        (bound_strategy(), bound_strategy()).prop_filter_map(
            "empty range",
            |((a, a_open), (b, b_open))| {
                let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
                KeyRange::bound(lower, upper, a_open, b_open).ok()
            }
        ),
    ]
}

/// Strategy for cursor directions.
pub fn direction_strategy() -> impl Strategy<Value = CursorDirection> {
    prop_oneof![
        Just(CursorDirection::Next),
        Just(CursorDirection::NextUnique),
        Just(CursorDirection::Prev),
        Just(CursorDirection::PrevUnique),
    ]
}

/// Strategy for catalog items keyed by [`small_string_key_strategy`].
pub fn item_strategy() -> impl Strategy<Value = Item> {
    (
        small_string_key_strategy(),
        prop::sample::select(vec!["books", "games", "tools"]),
        0u32..20,
        prop::collection::vec(prop::sample::select(vec!["red", "green", "blue"]), 0..3),
    )
        .prop_map(|(id, category, price, tags)| {
            Item::new(&id, category, price).with_tags(&tags)
        })
}

/// One write of a [`write_sequence_strategy`].
#[derive(Debug, Clone)]
pub enum Write {
    /// Put (insert or replace) an item.
    Put(Item),
    /// Delete the item with this id.
    Delete(String),
}

/// Strategy for sequences of puts and deletes over a small key space.
pub fn write_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Write>> {
    prop::collection::vec(
        prop_oneof![
            3 => item_strategy().prop_map(Write::Put),
            1 => small_string_key_strategy().prop_map(Write::Delete),
        ],
        0..max_len,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_keys_are_valid(key in key_strategy()) {
            prop_assert!(key.is_valid());
        }

        #[test]
        fn generated_ranges_include_their_bounds_when_closed(range in key_range_strategy()) {
            if let Some(lower) = range.lower() {
                prop_assert_eq!(range.includes(lower), !range.lower_open());
            }
        }
    }
}
