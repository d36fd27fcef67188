//! Runtime schema descriptors.
//!
//! A [`SchemaDescriptor`] records which stores a database is expected to hold,
//! the Rust type of each store's records and the indexes each store may be
//! queried by. Typed handles are checked against it when they are created.

use crate::error::{ModernIdbError, Result};
use serde_json::Value;
use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoreDescriptor {
    record_type: TypeId,
    record_name: &'static str,
    indexes: BTreeSet<String>,
}

/// Store name to record type and declared index names.
///
/// ```
/// use modernidb::SchemaDescriptor;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Widget {
///     id: String,
///     qty: u32,
/// }
///
/// let schema = SchemaDescriptor::builder()
///     .store::<Widget>("widgets")
///     .index("by_qty")
///     .build();
/// assert!(schema.check_store::<Widget>("widgets").is_ok());
/// assert!(schema.check_index("widgets", "by_name").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDescriptor {
    stores: BTreeMap<String, StoreDescriptor>,
}

impl SchemaDescriptor {
    /// Starts a descriptor.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Declared store names, sorted.
    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Declared index names of `store`, sorted.
    pub fn index_names(&self, store: &str) -> impl Iterator<Item = &str> {
        self.stores
            .get(store)
            .into_iter()
            .flat_map(|descriptor| descriptor.indexes.iter().map(String::as_str))
    }

    /// Checks that `store` is declared with records of type `T`.
    /// `serde_json::Value` matches every store.
    ///
    /// # Errors
    ///
    /// [`ModernIdbError::UnknownStore`] or
    /// [`ModernIdbError::RecordTypeMismatch`].
    pub fn check_store<T: 'static>(&self, store: &str) -> Result<()> {
        let descriptor = self.descriptor(store)?;
        let requested = TypeId::of::<T>();
        if requested != descriptor.record_type && requested != TypeId::of::<Value>() {
            return Err(ModernIdbError::RecordTypeMismatch {
                store: store.to_owned(),
                expected: descriptor.record_name,
                actual: type_name::<T>(),
            });
        }
        Ok(())
    }

    /// Checks that `index` is declared for `store`.
    ///
    /// # Errors
    ///
    /// [`ModernIdbError::UnknownStore`] or
    /// [`ModernIdbError::UndeclaredIndex`].
    pub fn check_index(&self, store: &str, index: &str) -> Result<()> {
        if self.descriptor(store)?.indexes.contains(index) {
            Ok(())
        } else {
            Err(ModernIdbError::UndeclaredIndex {
                store: store.to_owned(),
                index: index.to_owned(),
            })
        }
    }

    fn descriptor(&self, store: &str) -> Result<&StoreDescriptor> {
        self.stores
            .get(store)
            .ok_or_else(|| ModernIdbError::UnknownStore {
                store: store.to_owned(),
            })
    }
}

/// Builds a [`SchemaDescriptor`].
#[derive(Debug, Default)]
#[must_use]
pub struct SchemaBuilder {
    stores: BTreeMap<String, StoreDescriptor>,
}

impl SchemaBuilder {
    /// Declares a store holding records of type `T`.
    pub fn store<T: 'static>(mut self, name: impl Into<String>) -> StoreBuilder {
        let name = name.into();
        self.stores.insert(
            name.clone(),
            StoreDescriptor {
                record_type: TypeId::of::<T>(),
                record_name: type_name::<T>(),
                indexes: BTreeSet::new(),
            },
        );
        StoreBuilder {
            schema: self,
            current: name,
        }
    }

    /// Finishes the descriptor.
    pub fn build(self) -> SchemaDescriptor {
        SchemaDescriptor {
            stores: self.stores,
        }
    }
}

/// A [`SchemaBuilder`] positioned on its last declared store.
#[derive(Debug)]
#[must_use]
pub struct StoreBuilder {
    schema: SchemaBuilder,
    current: String,
}

impl StoreBuilder {
    /// Declares an index on the current store.
    pub fn index(mut self, name: impl Into<String>) -> Self {
        if let Some(store) = self.schema.stores.get_mut(&self.current) {
            store.indexes.insert(name.into());
        }
        self
    }

    /// Declares another store.
    pub fn store<T: 'static>(self, name: impl Into<String>) -> Self {
        self.schema.store::<T>(name)
    }

    /// Finishes the descriptor.
    pub fn build(self) -> SchemaDescriptor {
        self.schema.build()
    }
}
