//! Helpers shared by the unit tests.

use crate::{
    Connection, Durability, Factory, IndexParams, OpenOutcome, StoreParams, Transaction,
    TransactionMode,
};
use serde_json::{json, Value};

/// Opens `name` at `version`, panicking unless it opens.
pub(crate) fn open_with<'f>(
    factory: &'f Factory,
    name: &str,
    version: u64,
    upgrade: impl FnOnce(&Connection, &Transaction) + 'f,
) -> Connection {
    let outcome = factory
        .open(name, version)
        .on_upgrade_needed(|needed| {
            upgrade(&needed.connection, &needed.transaction);
            Ok(())
        })
        .send()
        .unwrap();
    match outcome {
        OpenOutcome::Opened(connection, _) => connection,
        OpenOutcome::Blocked(event) => panic!("open blocked: {event:?}"),
    }
}

/// A `widgets` store keyed by `id` with a `by_qty` index and a multi-entry
/// `by_tag` index.
pub(crate) fn widgets(factory: &Factory) -> Connection {
    open_with(factory, "inventory", 1, |connection, _| {
        let store = connection
            .create_object_store("widgets", StoreParams::new().key_path("id"))
            .unwrap();
        store
            .create_index("by_qty", "qty", IndexParams::new())
            .unwrap();
        store
            .create_index("by_tag", "tags", IndexParams::new().multi_entry(true))
            .unwrap();
    })
}

pub(crate) fn widget(id: &str, qty: i64, tags: &[&str]) -> Value {
    json!({"id": id, "qty": qty, "tags": tags})
}

pub(crate) fn write(connection: &Connection) -> Transaction {
    connection
        .transaction(["widgets"], TransactionMode::ReadWrite, Durability::Default)
        .unwrap()
}

pub(crate) fn read(connection: &Connection) -> Transaction {
    connection
        .transaction(["widgets"], TransactionMode::ReadOnly, Durability::Default)
        .unwrap()
}

/// Puts each record in its own committed transaction.
pub(crate) fn seed(connection: &Connection, records: &[Value]) {
    let tx = write(connection);
    let store = tx.object_store("widgets").unwrap();
    for record in records {
        store.put(record.clone(), None).unwrap();
    }
    tx.commit().unwrap();
}
