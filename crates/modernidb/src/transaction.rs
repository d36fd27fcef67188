//! Transactions spanning several stores.

use crate::error::Result;
use crate::object_store::{ObjectStore, VersionChangeObjectStore};
use crate::schema::SchemaDescriptor;
use modernidb_engine::{self as engine, Durability, TransactionMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Options for [`ModernIdb::transaction`](crate::ModernIdb::transaction).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Skip the transaction event on commit.
    pub no_emit: bool,
    /// Commit durability.
    pub durability: Durability,
}

impl TransactionOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `no_emit`.
    #[must_use]
    pub const fn no_emit(mut self, value: bool) -> Self {
        self.no_emit = value;
        self
    }

    /// Sets the durability.
    #[must_use]
    pub const fn durability(mut self, value: Durability) -> Self {
        self.durability = value;
        self
    }
}

/// A read-only or read-write transaction over a fixed set of stores.
#[derive(Debug, Clone)]
pub struct Transaction {
    inner: engine::Transaction,
    store_names: Vec<String>,
    schema: Option<Arc<SchemaDescriptor>>,
}

impl Transaction {
    pub(crate) fn new(
        inner: engine::Transaction,
        store_names: Vec<String>,
        schema: Option<Arc<SchemaDescriptor>>,
    ) -> Self {
        Self {
            inner,
            store_names,
            schema,
        }
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.inner.mode()
    }

    /// Store names in the order they were requested.
    #[must_use]
    pub fn store_names(&self) -> &[String] {
        &self.store_names
    }

    /// The engine transaction.
    #[must_use]
    pub fn inner(&self) -> &engine::Transaction {
        &self.inner
    }

    /// Typed handle to one store of the scope.
    ///
    /// # Errors
    ///
    /// Schema mismatches, `NotFoundError` when the store is not in scope.
    pub fn object_store<T: Serialize + DeserializeOwned + 'static>(
        &self,
        name: &str,
    ) -> Result<ObjectStore<T>> {
        ObjectStore::new(self.inner.object_store(name)?, self.schema.clone())
    }

    /// Untyped handles for every store, parallel to
    /// [`store_names`](Self::store_names).
    ///
    /// # Errors
    ///
    /// `TransactionInactiveError` once settled.
    pub fn stores(&self) -> Result<Vec<ObjectStore<Value>>> {
        self.store_names
            .iter()
            .map(|name| self.object_store::<Value>(name))
            .collect()
    }
}

/// The upgrade transaction; its store handles can change indexes.
#[derive(Debug, Clone)]
pub struct VersionChangeTransaction {
    inner: engine::Transaction,
    schema: Option<Arc<SchemaDescriptor>>,
}

impl VersionChangeTransaction {
    pub(crate) fn new(inner: engine::Transaction, schema: Option<Arc<SchemaDescriptor>>) -> Self {
        Self { inner, schema }
    }

    /// The engine transaction.
    #[must_use]
    pub fn inner(&self) -> &engine::Transaction {
        &self.inner
    }

    /// Every store of the database, including ones created so far.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.inner.object_store_names()
    }

    /// Typed handle to an existing store.
    ///
    /// # Errors
    ///
    /// Schema mismatches, `NotFoundError` for unknown stores.
    pub fn object_store<T: Serialize + DeserializeOwned + 'static>(
        &self,
        name: &str,
    ) -> Result<VersionChangeObjectStore<T>> {
        VersionChangeObjectStore::new(self.inner.object_store(name)?, self.schema.clone())
    }

    /// Aborts the upgrade; `open` then fails with `AbortError`.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` if the upgrade has already settled.
    pub fn abort(&self) -> Result<()> {
        Ok(self.inner.abort()?)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{widget, widgets_db, Widget};
    use crate::{ModernIdbError, TransactionMode, TransactionOptions};
    use serde_json::{json, Value};

    #[test]
    fn many_stores_share_one_transaction() {
        let (_factory, db) = widgets_db();
        let (tx, done) = db
            .transaction_many(["widgets", "orders"], TransactionMode::ReadWrite, TransactionOptions::default())
            .unwrap();
        assert_eq!(tx.store_names(), ["widgets", "orders"]);
        let stores = tx.stores().unwrap();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[1].name(), "orders");

        tx.object_store::<Widget>("widgets")
            .unwrap()
            .put(&widget("a", 1, &[]), None)
            .unwrap();
        stores[1].put(&json!({"item": "a"}), None).unwrap();
        done.wait().unwrap();

        assert!(db.get_from_store::<Widget>("widgets", "a").unwrap().is_some());
    }

    #[test]
    fn typed_handles_check_the_schema() {
        let (_factory, db) = widgets_db();
        let (tx, _done) = db
            .transaction_many(["widgets"], TransactionMode::ReadOnly, TransactionOptions::default())
            .unwrap();
        assert!(matches!(
            tx.object_store::<String>("widgets"),
            Err(ModernIdbError::RecordTypeMismatch { .. })
        ));
        assert_eq!(
            tx.object_store::<Value>("orders").unwrap_err().name(),
            "NotFoundError"
        );
    }
}
