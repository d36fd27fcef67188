//! Typed stores, indexes and cursor streams end to end.

use modernidb::{
    CursorDirection, Factory, Key, KeyRange, ModernIdb, StoreParams, TransactionMode,
    TransactionOptions,
};
use modernidb_testkit::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Widget {
    id: String,
    qty: u32,
}

#[test]
fn widgets_walkthrough() {
    init_tracing();
    let factory = Factory::in_memory();
    let db = ModernIdb::builder(&factory, "widgets")
        .version(1)
        .on_init(|ctx| {
            ctx.manager
                .create_object_store::<Widget>("widgets", StoreParams::new().key_path("id"))?;
            Ok(())
        })
        .build()
        .unwrap();
    db.open().unwrap();

    let record = Widget {
        id: "a".into(),
        qty: 3,
    };
    db.put_to_store("widgets", &record, None).unwrap();
    assert_eq!(
        db.get_from_store::<Widget>("widgets", "a").unwrap(),
        Some(record.clone())
    );

    let (widgets, done) = db
        .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
        .unwrap();
    let values: Vec<Widget> = widgets
        .open_cursor(None, CursorDirection::Next)
        .unwrap()
        .map(|cursor| cursor.unwrap().into_value())
        .collect();
    assert_eq!(values, [record]);
    done.wait().unwrap();
}

#[test]
fn cursors_yield_every_record_in_key_order() {
    let (_factory, db) = scenarios::populated_catalog(25);
    let (items, _done) = db
        .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
        .unwrap();

    let forward: Vec<Key> = items
        .open_key_cursor(None, CursorDirection::Next)
        .unwrap()
        .map(|cursor| cursor.unwrap().key().clone())
        .collect();
    assert_eq!(forward.len(), 25);
    assert!(forward.windows(2).all(|pair| pair[0] < pair[1]));

    let backward: Vec<Key> = items
        .open_key_cursor(None, CursorDirection::Prev)
        .unwrap()
        .map(|cursor| cursor.unwrap().key().clone())
        .collect();
    let mut reversed = forward.clone();
    reversed.reverse();
    assert_eq!(backward, reversed);
}

#[test]
fn empty_stores_yield_nothing() {
    with_catalog(|db| {
        let (items, _done) = db
            .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        assert_eq!(items.open_cursor(None, CursorDirection::Next).unwrap().count(), 0);
        let by_price = items.index("by_price").unwrap();
        assert_eq!(by_price.open_key_cursor(None, CursorDirection::Prev).unwrap().count(), 0);
    });
}

#[test]
fn advance_skips_entries() {
    let (_factory, db) = scenarios::populated_catalog(10);
    let (items, _done) = db
        .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
        .unwrap();
    let mut ids = Vec::new();
    for cursor in items.open_cursor(None, CursorDirection::Next).unwrap() {
        let cursor = cursor.unwrap();
        ids.push(cursor.value().id.clone());
        cursor.advance(3).unwrap();
    }
    assert_eq!(ids, ["item-000", "item-003", "item-006", "item-009"]);
}

#[test]
fn index_queries_by_category_and_tag() {
    let (_factory, db) = scenarios::populated_catalog(9);
    let (items, _done) = db
        .transaction::<Item>("items", TransactionMode::ReadOnly, TransactionOptions::default())
        .unwrap();

    let by_category = items.index("by_category").unwrap();
    assert_eq!(by_category.count(Some(KeyRange::only("games"))).unwrap(), 3);
    let games: Vec<String> = by_category
        .get_all(Some(KeyRange::only("games")), None)
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(games, ["item-001", "item-004", "item-007"]);

    let by_tag = items.index("by_tag").unwrap();
    let unique_tags: Vec<Key> = by_tag
        .open_key_cursor(None, CursorDirection::NextUnique)
        .unwrap()
        .map(|cursor| cursor.unwrap().key().clone())
        .collect();
    assert_eq!(
        unique_tags,
        [Key::from("books"), Key::from("games"), Key::from("tools")]
    );
}

#[test]
fn cursor_writes_land_in_the_store() {
    let (_factory, db) = scenarios::populated_catalog(6);
    let (items, done) = db
        .transaction::<Item>("items", TransactionMode::ReadWrite, TransactionOptions::default())
        .unwrap();
    let by_category = items.index("by_category").unwrap();
    for cursor in by_category
        .open_cursor(Some(KeyRange::only("books")), CursorDirection::Next)
        .unwrap()
    {
        let cursor = cursor.unwrap();
        let mut item = cursor.value().clone();
        item.price += 100;
        cursor.update(&item).unwrap();
    }
    for cursor in items
        .open_cursor(Some(KeyRange::only("item-001")), CursorDirection::Next)
        .unwrap()
    {
        cursor.unwrap().delete().unwrap();
    }
    done.wait().unwrap();

    let books = db.get_from_store::<Item>("items", "item-003").unwrap().unwrap();
    assert_eq!(books.price, 121);
    assert_eq!(db.get_from_store::<Item>("items", "item-001").unwrap(), None);
}

#[test]
fn reads_after_writes_see_the_write() {
    with_catalog(|db| {
        for price in 0..5 {
            db.put_to_store("items", &Item::new("x", "tools", price), None)
                .unwrap();
            let item: Item = db.get_from_store("items", "x").unwrap().unwrap();
            assert_eq!(item.price, price);
        }
    });
}

#[test]
fn log_store_generates_keys() {
    with_catalog(|db| {
        let first = db
            .put_to_store("log", &serde_json::json!({"event": "opened"}), None)
            .unwrap();
        let second = db
            .put_to_store("log", &serde_json::json!({"event": "closed"}), None)
            .unwrap();
        assert_eq!((first, second), (Key::from(1), Key::from(2)));
        let explicit = db
            .put_to_store("log", &serde_json::json!({}), Some(Key::from(10)))
            .unwrap();
        assert_eq!(explicit, Key::from(10));
        let next = db.put_to_store("log", &serde_json::json!({}), None).unwrap();
        assert_eq!(next, Key::from(11));
    });
}
