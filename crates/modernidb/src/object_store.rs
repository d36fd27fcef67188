//! Typed object store handles.

use crate::adapters::{request_to_result, CursorStream};
use crate::cursor::{Cursor, CursorWithValue};
use crate::error::Result;
use crate::index::ObjectStoreIndex;
use crate::schema::SchemaDescriptor;
use modernidb_engine::{
    CursorDirection, IndexParams, Key, KeyPath, KeyRange, ObjectStoreHandle, Transaction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// One store inside one transaction, holding records of type `T`.
///
/// Every call settles its request before returning, so the result (or the
/// error) is the store's state at that point of the transaction.
pub struct ObjectStore<T> {
    handle: ObjectStoreHandle,
    schema: Option<Arc<SchemaDescriptor>>,
    record: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectStore<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            schema: self.schema.clone(),
            record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ObjectStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.handle.name())
            .field("record", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: 'static> ObjectStore<T> {
    /// Wraps `handle` after checking `T` against the schema.
    pub(crate) fn new(
        handle: ObjectStoreHandle,
        schema: Option<Arc<SchemaDescriptor>>,
    ) -> Result<Self> {
        if let Some(schema) = &schema {
            schema.check_store::<T>(handle.name())?;
        }
        Ok(Self {
            handle,
            schema,
            record: PhantomData,
        })
    }
}

impl<T> ObjectStore<T> {
    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Key path for in-line keys.
    #[must_use]
    pub fn key_path(&self) -> Option<&KeyPath> {
        self.handle.key_path()
    }

    /// Whether keys are generated.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.handle.auto_increment()
    }

    /// The owning engine transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        self.handle.transaction()
    }

    /// The untyped engine handle.
    #[must_use]
    pub fn handle(&self) -> &ObjectStoreHandle {
        &self.handle
    }

    /// Names of the store's indexes, sorted.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn index_names(&self) -> Result<Vec<String>> {
        Ok(self.handle.index_names()?)
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// `ReadOnlyError` in read-only transactions, `TransactionInactiveError`
    /// once settled.
    pub fn clear(&self) -> Result<()> {
        request_to_result(self.handle.clear()?)
    }

    /// Number of records in `query`, or in the store.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn count(&self, query: Option<KeyRange>) -> Result<u64> {
        request_to_result(self.handle.count(query)?)
    }

    /// Deletes every record in `query`.
    ///
    /// # Errors
    ///
    /// `ReadOnlyError` in read-only transactions, `TransactionInactiveError`
    /// once settled.
    pub fn delete(&self, query: impl Into<KeyRange>) -> Result<()> {
        request_to_result(self.handle.delete(query)?)
    }

    /// Keys in `query`, at most `count` of them.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_all_keys(&self, query: Option<KeyRange>, count: Option<u32>) -> Result<Vec<Key>> {
        request_to_result(self.handle.get_all_keys(query, count)?)
    }

    /// Key of the first record in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_key(&self, query: impl Into<KeyRange>) -> Result<Option<Key>> {
        request_to_result(self.handle.get_key(query)?)
    }

    /// Opens a key-only cursor over `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn open_key_cursor(
        &self,
        query: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<CursorStream<Cursor>> {
        Ok(CursorStream::new(self.handle.open_key_cursor(query, direction)?))
    }
}

impl<T: Serialize + DeserializeOwned + 'static> ObjectStore<T> {
    /// Inserts a record. Returns its key.
    ///
    /// # Errors
    ///
    /// `ConstraintError` when the key exists or a unique index is violated,
    /// `DataError` for a missing or invalid key, `ReadOnlyError` in
    /// read-only transactions.
    pub fn add(&self, value: &T, key: Option<Key>) -> Result<Key> {
        request_to_result(self.handle.add(encode(value)?, key)?)
    }

    /// Inserts or replaces a record. Returns its key.
    ///
    /// # Errors
    ///
    /// `ConstraintError` when a unique index is violated, `DataError` for a
    /// missing or invalid key, `ReadOnlyError` in read-only transactions.
    pub fn put(&self, value: &T, key: Option<Key>) -> Result<Key> {
        request_to_result(self.handle.put(encode(value)?, key)?)
    }

    /// The first record in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled, a serialization error when
    /// the record does not decode as `T`.
    pub fn get(&self, query: impl Into<KeyRange>) -> Result<Option<T>> {
        request_to_result(self.handle.get(query)?)?
            .map(decode)
            .transpose()
    }

    /// Records in `query`, at most `count` of them.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled, a serialization error when a
    /// record does not decode as `T`.
    pub fn get_all(&self, query: Option<KeyRange>, count: Option<u32>) -> Result<Vec<T>> {
        request_to_result(self.handle.get_all(query, count)?)?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Handle to one of the store's indexes.
    ///
    /// # Errors
    ///
    /// [`UndeclaredIndex`](crate::ModernIdbError::UndeclaredIndex) when the
    /// schema does not declare it, `NotFoundError` when the store has no
    /// such index.
    pub fn index(&self, name: &str) -> Result<ObjectStoreIndex<T>> {
        if let Some(schema) = &self.schema {
            schema.check_index(self.name(), name)?;
        }
        Ok(ObjectStoreIndex::new(self.handle.index(name)?))
    }

    /// Opens a cursor over records in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn open_cursor(
        &self,
        query: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<CursorStream<CursorWithValue<T>>> {
        Ok(CursorStream::new(self.handle.open_cursor(query, direction)?))
    }
}

/// An [`ObjectStore`] inside an upgrade, which can also change indexes.
pub struct VersionChangeObjectStore<T> {
    store: ObjectStore<T>,
}

impl<T> Clone for VersionChangeObjectStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T> fmt::Debug for VersionChangeObjectStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VersionChangeObjectStore")
            .field(&self.store)
            .finish()
    }
}

impl<T> Deref for VersionChangeObjectStore<T> {
    type Target = ObjectStore<T>;

    fn deref(&self) -> &ObjectStore<T> {
        &self.store
    }
}

impl<T: Serialize + DeserializeOwned + 'static> VersionChangeObjectStore<T> {
    pub(crate) fn new(
        handle: ObjectStoreHandle,
        schema: Option<Arc<SchemaDescriptor>>,
    ) -> Result<Self> {
        Ok(Self {
            store: ObjectStore::new(handle, schema)?,
        })
    }

    /// Creates an index and fills it from the existing records.
    ///
    /// # Errors
    ///
    /// [`UndeclaredIndex`](crate::ModernIdbError::UndeclaredIndex) when the
    /// schema does not declare it; `ConstraintError` when the name is taken
    /// or existing records violate `unique`, which also aborts the upgrade.
    pub fn create_index(
        &self,
        name: &str,
        key_path: impl Into<KeyPath>,
        params: IndexParams,
    ) -> Result<ObjectStoreIndex<T>> {
        if let Some(schema) = &self.store.schema {
            schema.check_index(self.name(), name)?;
        }
        let index = self.store.handle.create_index(name, key_path, params)?;
        Ok(ObjectStoreIndex::new(index))
    }

    /// Drops an index.
    ///
    /// # Errors
    ///
    /// `NotFoundError` when the store has no such index.
    pub fn delete_index(&self, name: &str) -> Result<()> {
        Ok(self.store.handle.delete_index(name)?)
    }

    /// Renames an index by creating `new_name` with the same key path and
    /// options, then dropping `current`.
    ///
    /// # Errors
    ///
    /// As [`create_index`](Self::create_index) and
    /// [`delete_index`](Self::delete_index).
    pub fn rename_index(&self, current: &str, new_name: &str) -> Result<ObjectStoreIndex<T>> {
        let existing = self.store.handle.index(current)?;
        let params = IndexParams::new()
            .unique(existing.unique())
            .multi_entry(existing.multi_entry());
        let renamed = self.create_index(new_name, existing.key_path().clone(), params)?;
        self.delete_index(current)?;
        debug!(store = self.name(), from = current, to = new_name, "index renamed");
        Ok(renamed)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{widget, widgets_db, Widget};
    use crate::{CursorDirection, Key, KeyRange, ModernIdbError, TransactionMode, TransactionOptions};
    use serde_json::{json, Value};

    #[test]
    fn crud_round_trip() {
        let (_factory, db) = widgets_db();
        let (store, done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadWrite, TransactionOptions::default())
            .unwrap();
        assert_eq!(store.add(&widget("a", 3, &["red"]), None).unwrap(), Key::from("a"));
        assert_eq!(store.put(&widget("b", 1, &[]), None).unwrap(), Key::from("b"));
        assert_eq!(store.get("a").unwrap(), Some(widget("a", 3, &["red"])));
        assert_eq!(store.get("zzz").unwrap(), None);
        assert_eq!(store.count(None).unwrap(), 2);
        assert_eq!(store.get_key(KeyRange::lower_bound("a", true)).unwrap(), Some(Key::from("b")));
        assert_eq!(store.get_all_keys(None, Some(1)).unwrap(), vec![Key::from("a")]);
        assert_eq!(store.get_all(None, None).unwrap().len(), 2);

        let duplicate = store.add(&widget("a", 9, &[]), None).unwrap_err();
        assert_eq!(duplicate.name(), "ConstraintError");
        done.wait().unwrap_err();
    }

    #[test]
    fn deletes_and_clear() {
        let (_factory, db) = widgets_db();
        let (store, done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadWrite, TransactionOptions::default())
            .unwrap();
        for (id, qty) in [("a", 1), ("b", 2), ("c", 3)] {
            store.put(&widget(id, qty, &[]), None).unwrap();
        }
        store.delete("b").unwrap();
        assert_eq!(store.count(None).unwrap(), 2);
        store.clear().unwrap();
        assert_eq!(store.count(None).unwrap(), 0);
        done.wait().unwrap();
    }

    #[test]
    fn read_only_stores_refuse_writes() {
        let (_factory, db) = widgets_db();
        let (store, done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        let error = store.put(&widget("a", 1, &[]), None).unwrap_err();
        assert_eq!(error.name(), "ReadOnlyError");
        done.wait().unwrap();
    }

    #[test]
    fn records_that_do_not_decode_are_reported() {
        let (_factory, db) = widgets_db();
        let (raw, done) = db
            .transaction::<Value>("widgets", TransactionMode::ReadWrite, TransactionOptions::default())
            .unwrap();
        raw.put(&json!({"id": "odd", "qty": "many"}), None).unwrap();
        done.wait().unwrap();

        let (store, _done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        assert!(matches!(
            store.get("odd"),
            Err(ModernIdbError::Serialization { .. })
        ));
    }

    #[test]
    fn cursors_stream_records_and_keys() {
        let (_factory, db) = widgets_db();
        for (id, qty) in [("c", 3), ("a", 1), ("b", 2)] {
            db.put_to_store("widgets", &widget(id, qty, &[]), None).unwrap();
        }
        let (store, _done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();

        let ids: Vec<String> = store
            .open_cursor(None, CursorDirection::Next)
            .unwrap()
            .map(|cursor| cursor.unwrap().into_value().id)
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);

        let keys: Vec<_> = store
            .open_key_cursor(Some(KeyRange::upper_bound("b", false)), CursorDirection::Prev)
            .unwrap()
            .map(|cursor| cursor.unwrap().key().clone())
            .collect();
        assert_eq!(keys, vec![Key::from("b"), Key::from("a")]);
    }

    #[test]
    fn consumer_moves_are_not_repeated() {
        let (_factory, db) = widgets_db();
        for id in ["a", "b", "c", "d", "e"] {
            db.put_to_store("widgets", &widget(id, 1, &[]), None).unwrap();
        }
        let (store, _done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        let mut seen = Vec::new();
        for cursor in store.open_cursor(None, CursorDirection::Next).unwrap() {
            let cursor = cursor.unwrap();
            seen.push(cursor.value().id.clone());
            if cursor.key() == &Key::from("a") {
                cursor.advance(2).unwrap();
            } else if cursor.key() == &Key::from("c") {
                cursor.continue_(Some(Key::from("e"))).unwrap();
            }
        }
        assert_eq!(seen, ["a", "c", "e"]);
    }

    #[test]
    fn cursor_updates_and_deletes() {
        let (_factory, db) = widgets_db();
        for (id, qty) in [("a", 1), ("b", 2), ("c", 3)] {
            db.put_to_store("widgets", &widget(id, qty, &[]), None).unwrap();
        }
        let (store, done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadWrite, TransactionOptions::default())
            .unwrap();
        for cursor in store.open_cursor(None, CursorDirection::Next).unwrap() {
            let cursor = cursor.unwrap();
            if cursor.value().qty == 2 {
                cursor.delete().unwrap();
            } else {
                let mut changed = cursor.value().clone();
                changed.qty *= 10;
                assert_eq!(cursor.update(&changed).unwrap(), cursor.primary_key().clone());
            }
        }
        done.wait().unwrap();

        let quantities: Vec<u32> = db
            .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap()
            .0
            .get_all(None, None)
            .unwrap()
            .into_iter()
            .map(|w| w.qty)
            .collect();
        assert_eq!(quantities, [10, 30]);
    }

    #[test]
    fn undeclared_indexes_are_refused() {
        let (_factory, db) = widgets_db();
        let (store, _done) = db
            .transaction::<Widget>("widgets", TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        assert!(store.index("by_qty").is_ok());
        assert!(matches!(
            store.index("by_colour"),
            Err(ModernIdbError::UndeclaredIndex { .. })
        ));
    }
}
