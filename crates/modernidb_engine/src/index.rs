//! Index handles.

use crate::cursor::{CursorRequest, CursorSource};
use crate::error::EngineResult;
use crate::schema::{IndexSchema, StoreSchema};
use crate::store::{IndexState, StoreState};
use crate::transaction::{Request, Transaction};
use modernidb_codec::{CursorDirection, Key, KeyPath, KeyRange};
use serde_json::Value;

/// An index as seen through one transaction. Queries are by index key;
/// results are the records (or primary keys) the index points at.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    transaction: Transaction,
    store: StoreSchema,
    schema: IndexSchema,
}

impl IndexHandle {
    pub(crate) fn new(transaction: Transaction, store: StoreSchema, schema: IndexSchema) -> Self {
        Self {
            transaction,
            store,
            schema,
        }
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Name of the indexed store.
    #[must_use]
    pub fn object_store_name(&self) -> &str {
        &self.store.name
    }

    /// Path of the index key inside records.
    #[must_use]
    pub fn key_path(&self) -> &KeyPath {
        &self.schema.key_path
    }

    /// Whether index keys are unique.
    #[must_use]
    pub fn unique(&self) -> bool {
        self.schema.unique
    }

    /// Whether array keys fan out per element.
    #[must_use]
    pub fn multi_entry(&self) -> bool {
        self.schema.multi_entry
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Record of the first entry in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get(&self, query: impl Into<KeyRange>) -> EngineResult<Request<Option<Value>>> {
        let range = query.into();
        self.read(move |store, index| {
            Ok(index
                .first_primary_key(&range)
                .and_then(|pk| store.records().get(&pk).cloned()))
        })
    }

    /// Primary key of the first entry in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_key(&self, query: impl Into<KeyRange>) -> EngineResult<Request<Option<Key>>> {
        let range = query.into();
        self.read(move |_, index| Ok(index.first_primary_key(&range)))
    }

    /// Records of the entries in `query`, at most `count`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_all(
        &self,
        query: Option<KeyRange>,
        count: Option<u32>,
    ) -> EngineResult<Request<Vec<Value>>> {
        self.read(move |store, index| {
            Ok(index
                .primary_keys(query.as_ref(), count)
                .iter()
                .filter_map(|pk| store.records().get(pk).cloned())
                .collect())
        })
    }

    /// Primary keys of the entries in `query`, at most `count`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_all_keys(
        &self,
        query: Option<KeyRange>,
        count: Option<u32>,
    ) -> EngineResult<Request<Vec<Key>>> {
        self.read(move |_, index| Ok(index.primary_keys(query.as_ref(), count)))
    }

    /// Number of entries in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn count(&self, query: Option<KeyRange>) -> EngineResult<Request<u64>> {
        self.read(move |_, index| Ok(index.count(query.as_ref())))
    }

    /// Opens a cursor over index entries with their records.
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

    /// Opens a cursor over index entries without loading records.
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
            CursorSource::Index {
                store: self.store.name.clone(),
                name: self.schema.name.clone(),
            },
            self.store.clone(),
            query,
            direction,
            key_only,
        )
    }

    fn read<T: Send + 'static>(
        &self,
        op: impl FnOnce(&StoreState, &IndexState) -> EngineResult<T> + Send + 'static,
    ) -> EngineResult<Request<T>> {
        self.transaction.ensure_active()?;
        let store = self.store.name.clone();
        let index = self.schema.name.clone();
        self.transaction.enqueue(move |working| {
            let state = working.store(&store)?;
            op(state, state.index(&index)?)
        })
    }
}
