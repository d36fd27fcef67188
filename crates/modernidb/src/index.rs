//! Typed, read-only index handles.

use crate::adapters::{request_to_result, CursorStream};
use crate::cursor::{IndexCursor, IndexCursorWithValue};
use crate::error::Result;
use crate::object_store::decode;
use modernidb_engine::{CursorDirection, IndexHandle, Key, KeyPath, KeyRange};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

/// An index of a store holding records of type `T`. Queries take index
/// keys; results are the records (or primary keys) the index points at.
pub struct ObjectStoreIndex<T> {
    handle: IndexHandle,
    record: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectStoreIndex<T> {
    fn clone(&self) -> Self {
        Self::new(self.handle.clone())
    }
}

impl<T> fmt::Debug for ObjectStoreIndex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreIndex")
            .field("store", &self.handle.object_store_name())
            .field("name", &self.handle.name())
            .finish()
    }
}

impl<T> ObjectStoreIndex<T> {
    pub(crate) fn new(handle: IndexHandle) -> Self {
        Self {
            handle,
            record: PhantomData,
        }
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Name of the indexed store.
    #[must_use]
    pub fn object_store_name(&self) -> &str {
        self.handle.object_store_name()
    }

    /// Path of the index key inside records.
    #[must_use]
    pub fn key_path(&self) -> &KeyPath {
        self.handle.key_path()
    }

    /// Whether index keys are unique.
    #[must_use]
    pub fn unique(&self) -> bool {
        self.handle.unique()
    }

    /// Whether array keys fan out per element.
    #[must_use]
    pub fn multi_entry(&self) -> bool {
        self.handle.multi_entry()
    }

    /// Number of index entries in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn count(&self, query: Option<KeyRange>) -> Result<u64> {
        request_to_result(self.handle.count(query)?)
    }

    /// Primary key of the first entry in `query`.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_key(&self, query: impl Into<KeyRange>) -> Result<Option<Key>> {
        request_to_result(self.handle.get_key(query)?)
    }

    /// Primary keys of the entries in `query`, at most `count` of them.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn get_all_keys(&self, query: Option<KeyRange>, count: Option<u32>) -> Result<Vec<Key>> {
        request_to_result(self.handle.get_all_keys(query, count)?)
    }

    /// Opens a cursor over index entries without their records.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn open_key_cursor(
        &self,
        query: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<CursorStream<IndexCursor>> {
        Ok(CursorStream::new(self.handle.open_key_cursor(query, direction)?))
    }
}

impl<T: DeserializeOwned> ObjectStoreIndex<T> {
    /// Record of the first entry in `query`.
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

    /// Records of the entries in `query`, at most `count` of them.
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

    /// Opens a cursor over index entries and their records.
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn open_cursor(
        &self,
        query: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<CursorStream<IndexCursorWithValue<T>>> {
        Ok(CursorStream::new(self.handle.open_cursor(query, direction)?))
    }
}
