//! Object store handles.

use crate::cursor::{CursorRequest, CursorSource};
use crate::error::{EngineError, EngineResult};
use crate::index::IndexHandle;
use crate::journal::JournalOp;
use crate::schema::{IndexParams, IndexSchema, StoreSchema};
use crate::store::StoreState;
use crate::transaction::{Request, Transaction};
use modernidb_codec::{CursorDirection, Key, KeyPath, KeyRange};
use serde_json::Value;
use tracing::{debug, trace};

/// A store as seen through one transaction.
#[derive(Debug, Clone)]
pub struct ObjectStoreHandle {
    transaction: Transaction,
    schema: StoreSchema,
}

/// Checks what can be checked about a write before it is queued.
pub(crate) fn check_key(schema: &StoreSchema, value: &Value, key: Option<&Key>) -> EngineResult<()> {
    match (&schema.key_path, key) {
        (Some(_), Some(_)) => Err(EngineError::data(
            "the store uses in-line keys and a key was also provided",
        )),
        (Some(path), None) => match path.evaluate(value) {
            Some(found) => match Key::from_value(&found) {
                Some(key) if key.is_valid() => Ok(()),
                _ => Err(EngineError::data(format!("value at {path} is not a valid key"))),
            },
            None if schema.auto_increment && path.can_inject(value) => Ok(()),
            None if schema.auto_increment => Err(EngineError::data(format!(
                "a generated key cannot be stored at {path}"
            ))),
            None => Err(EngineError::data(format!("record has no key at {path}"))),
        },
        (None, Some(key)) if !key.is_valid() => {
            Err(EngineError::data(format!("{key} is not a valid key")))
        }
        (None, None) if !schema.auto_increment => Err(EngineError::data(
            "the store uses out-of-line keys and no key was provided",
        )),
        (None, _) => Ok(()),
    }
}

/// Queues a write. Shared with cursor updates.
pub(crate) fn enqueue_put(
    transaction: &Transaction,
    schema: &StoreSchema,
    value: Value,
    key: Option<Key>,
    no_overwrite: bool,
) -> EngineResult<Request<Key>> {
    transaction.ensure_active()?;
    transaction.ensure_writable()?;
    check_key(schema, &value, key.as_ref())?;
    let name = schema.name.clone();
    transaction.enqueue(move |working| {
        let (key, value) = working.store_mut(&name)?.put(value, key, no_overwrite)?;
        working.record(JournalOp::Put {
            store: name,
            key: key.clone(),
            value,
        });
        Ok(key)
    })
}

/// Queues a delete. Shared with cursor deletes.
pub(crate) fn enqueue_delete(
    transaction: &Transaction,
    store: &str,
    range: KeyRange,
) -> EngineResult<Request<()>> {
    transaction.ensure_active()?;
    transaction.ensure_writable()?;
    let name = store.to_owned();
    transaction.enqueue(move |working| {
        if working.store_mut(&name)?.delete_range(&range) > 0 {
            working.record(JournalOp::Delete { store: name, range });
        }
        Ok(())
    })
}

impl ObjectStoreHandle {
    pub(crate) fn new(transaction: Transaction, schema: StoreSchema) -> Self {
        Self {
            transaction,
            schema,
        }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Key path for in-line keys, if the store has one.
    #[must_use]
    pub fn key_path(&self) -> Option<&KeyPath> {
        self.schema.key_path.as_ref()
    }

    /// Whether the store generates keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.schema.auto_increment
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Names of the store's indexes, sorted.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once the transaction has settled.
    pub fn index_names(&self) -> EngineResult<Vec<String>> {
        let name = self.schema.name.clone();
        self.transaction
            .with_working(|working| Ok(working.store(&name)?.index_names()))
    }

    /// Inserts a record; fails with `ConstraintError` if the key is taken.
    ///
    /// # Errors
    ///
    /// Key problems that can be seen up front (`DataError`), read-only
    /// or settled transactions.
    pub fn add(&self, value: Value, key: Option<Key>) -> EngineResult<Request<Key>> {
        enqueue_put(&self.transaction, &self.schema, value, key, true)
    }

    /// Inserts or replaces a record.
    ///
    /// # Errors
    ///
    /// As for [`ObjectStoreHandle::add`].
    pub fn put(&self, value: Value, key: Option<Key>) -> EngineResult<Request<Key>> {
        enqueue_put(&self.transaction, &self.schema, value, key, false)
    }

    /// First record in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get(&self, query: impl Into<KeyRange>) -> EngineResult<Request<Option<Value>>> {
        let range = query.into();
        self.read(move |store| Ok(store.get(&range).cloned()))
    }

    /// Key of the first record in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_key(&self, query: impl Into<KeyRange>) -> EngineResult<Request<Option<Key>>> {
        let range = query.into();
        self.read(move |store| Ok(store.get_key(&range).cloned()))
    }

    /// Records in `query`, at most `count` of them.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_all(
        &self,
        query: Option<KeyRange>,
        count: Option<u32>,
    ) -> EngineResult<Request<Vec<Value>>> {
        self.read(move |store| Ok(store.get_all(query.as_ref(), count)))
    }

    /// Keys in `query`, at most `count` of them.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_all_keys(
        &self,
        query: Option<KeyRange>,
        count: Option<u32>,
    ) -> EngineResult<Request<Vec<Key>>> {
        self.read(move |store| Ok(store.get_all_keys(query.as_ref(), count)))
    }

    /// Number of records in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn count(&self, query: Option<KeyRange>) -> EngineResult<Request<u64>> {
        self.read(move |store| Ok(store.count(query.as_ref())))
    }

    /// Deletes every record in `query`.
    ///
    /// # Errors
    ///
    /// Read-only or settled transactions.
    pub fn delete(&self, query: impl Into<KeyRange>) -> EngineResult<Request<()>> {
        enqueue_delete(&self.transaction, &self.schema.name, query.into())
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// Read-only or settled transactions.
    pub fn clear(&self) -> EngineResult<Request<()>> {
        self.transaction.ensure_active()?;
        self.transaction.ensure_writable()?;
        let name = self.schema.name.clone();
        self.transaction.enqueue(move |working| {
            working.store_mut(&name)?.clear();
            working.record(JournalOp::Clear { store: name });
            Ok(())
        })
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
    ) -> EngineResult<CursorRequest> {
        self.cursor(query, direction, false)
    }

    /// Opens a cursor over keys in `query`, without values.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn open_key_cursor(
        &self,
        query: Option<KeyRange>,
        direction: CursorDirection,
    ) -> EngineResult<CursorRequest> {
        self.cursor(query, direction, true)
    }

    fn cursor(
        &self,
        query: Option<KeyRange>,
        direction: CursorDirection,
        key_only: bool,
    ) -> EngineResult<CursorRequest> {
        CursorRequest::open(
            self.transaction.clone(),
            CursorSource::Store {
                name: self.schema.name.clone(),
            },
            self.schema.clone(),
            query,
            direction,
            key_only,
        )
    }

    /// Handle to an existing index.
    ///
    /// # Errors
    ///
    /// `NotFoundError` for unknown names.
    pub fn index(&self, name: &str) -> EngineResult<IndexHandle> {
        let store = self.schema.name.clone();
        let schema = self
            .transaction
            .with_working(|working| Ok(working.store(&store)?.index(name)?.schema().clone()))?;
        Ok(IndexHandle::new(
            self.transaction.clone(),
            self.schema.clone(),
            schema,
        ))
    }

    /// Creates an index and fills it from the existing records. Upgrades only.
    ///
    /// If existing records violate a unique index the upgrade aborts with
    /// `ConstraintError`.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` outside an upgrade, `SyntaxError` for a bad key
    /// path, `InvalidAccessError` for a multi-entry index on an array path,
    /// `ConstraintError` if the name is taken.
    pub fn create_index(
        &self,
        name: &str,
        key_path: impl Into<KeyPath>,
        params: IndexParams,
    ) -> EngineResult<IndexHandle> {
        self.transaction.ensure_upgrade()?;
        let schema = IndexSchema::new(name, key_path.into(), params)?;
        let store = self.schema.name.clone();
        let created = schema.clone();
        let applied = self.transaction.with_working(|working| {
            let state = working.store_mut(&store)?;
            if state.index(name).is_ok() {
                return Ok(Err(EngineError::constraint(format!(
                    "store {store:?} already has an index named {name:?}"
                ))));
            }
            state.create_index(created.clone())?;
            working.record(JournalOp::CreateIndex {
                store: store.clone(),
                schema: created,
            });
            Ok(Ok(()))
        });
        match applied {
            Ok(Ok(())) => {
                debug!(store = %self.schema.name, index = name, "index created");
                Ok(IndexHandle::new(
                    self.transaction.clone(),
                    self.schema.clone(),
                    schema,
                ))
            }
            Ok(Err(taken)) => Err(taken),
            Err(error) => {
                if let Err(settled) = self.transaction.abort_with(error.clone()) {
                    trace!(
                        store = %self.schema.name,
                        index = name,
                        %settled,
                        "index build failed after the upgrade ended"
                    );
                }
                Err(error)
            }
        }
    }

    /// Drops an index. Upgrades only.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` outside an upgrade, `NotFoundError` for unknown
    /// names.
    pub fn delete_index(&self, name: &str) -> EngineResult<()> {
        self.transaction.ensure_upgrade()?;
        let store = self.schema.name.clone();
        self.transaction.with_working(|working| {
            working.store_mut(&store)?.delete_index(name)?;
            working.record(JournalOp::DeleteIndex {
                store,
                name: name.to_owned(),
            });
            Ok(())
        })?;
        debug!(store = %self.schema.name, index = name, "index deleted");
        Ok(())
    }

    fn read<T: Send + 'static>(
        &self,
        op: impl FnOnce(&StoreState) -> EngineResult<T> + Send + 'static,
    ) -> EngineResult<Request<T>> {
        self.transaction.ensure_active()?;
        let name = self.schema.name.clone();
        self.transaction
            .enqueue(move |working| op(working.store(&name)?))
    }
}
