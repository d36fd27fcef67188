//! The schema-migration context handed to `on_init` and `on_upgrade`.

use crate::error::Result;
use crate::object_store::VersionChangeObjectStore;
use crate::schema::SchemaDescriptor;
use crate::transaction::VersionChangeTransaction;
use modernidb_engine::{Connection, StoreParams, VersionChangeEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Creates and deletes stores during an upgrade. Index changes go through
/// [`VersionChangeObjectStore`].
///
/// Every call is applied to the upgrade transaction right away; if any of
/// them fails and the handler returns the error, nothing of the upgrade is
/// kept.
#[derive(Debug)]
pub struct VersionChangeManager {
    connection: Connection,
    event: VersionChangeEvent,
    transaction: VersionChangeTransaction,
    schema: Option<Arc<SchemaDescriptor>>,
}

impl VersionChangeManager {
    pub(crate) fn new(
        connection: Connection,
        event: VersionChangeEvent,
        transaction: VersionChangeTransaction,
        schema: Option<Arc<SchemaDescriptor>>,
    ) -> Self {
        Self {
            connection,
            event,
            transaction,
            schema,
        }
    }

    /// The `upgradeneeded` event.
    #[must_use]
    pub fn event(&self) -> &VersionChangeEvent {
        &self.event
    }

    /// Version persisted before the upgrade; 0 for a new database.
    #[must_use]
    pub fn old_version(&self) -> u64 {
        self.event.old_version
    }

    /// Version being upgraded to.
    #[must_use]
    pub fn new_version(&self) -> u64 {
        self.connection.version()
    }

    /// The upgrade transaction.
    #[must_use]
    pub fn transaction(&self) -> &VersionChangeTransaction {
        &self.transaction
    }

    /// Store names, including the ones created so far.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        self.connection.object_store_names()
    }

    /// Creates a store holding records of type `T`.
    ///
    /// # Errors
    ///
    /// Schema mismatches; `ConstraintError` if the name is taken,
    /// `SyntaxError` or `InvalidAccessError` for bad key options.
    pub fn create_object_store<T: Serialize + DeserializeOwned + 'static>(
        &self,
        name: &str,
        params: StoreParams,
    ) -> Result<VersionChangeObjectStore<T>> {
        if let Some(schema) = &self.schema {
            schema.check_store::<T>(name)?;
        }
        let handle = self.connection.create_object_store(name, params)?;
        VersionChangeObjectStore::new(handle, self.schema.clone())
    }

    /// Deletes a store and its records.
    ///
    /// # Errors
    ///
    /// `NotFoundError` for unknown stores.
    pub fn delete_object_store(&self, name: &str) -> Result<()> {
        Ok(self.connection.delete_object_store(name)?)
    }
}
