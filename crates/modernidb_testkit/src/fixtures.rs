//! Test fixtures and database helpers.
//!
//! Provides factories that clean up after themselves and a small "catalog"
//! database used across the integration tests.

use modernidb::{
    Factory, FactoryConfig, IndexParams, ModernIdb, SchemaDescriptor, StoreParams,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

/// A factory with automatic cleanup.
pub struct TestFactory {
    /// The factory.
    pub factory: Factory,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestFactory {
    /// Creates an in-memory factory.
    pub fn memory() -> Self {
        Self {
            factory: Factory::in_memory(),
            temp_dir: None,
        }
    }

    /// Creates a factory over a fresh temporary directory.
    pub fn dir() -> Self {
        Self::dir_with_config(FactoryConfig::default())
    }

    /// Creates a factory over a fresh temporary directory with `config`.
    pub fn dir_with_config(config: FactoryConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let factory = Factory::open_dir_with_config(temp_dir.path().join("databases"), config)
            .expect("Failed to open factory");
        Self {
            factory,
            temp_dir: Some(temp_dir),
        }
    }

    /// The database directory, if file-backed.
    pub fn path(&self) -> Option<std::path::PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("databases"))
    }

    /// Drops the factory and opens the same directory again, replaying every
    /// journal. Clients of the old factory must be dropped first, or the
    /// directory is still locked.
    ///
    /// # Panics
    ///
    /// For in-memory factories.
    pub fn reopen(self) -> Self {
        let Self { factory, temp_dir } = self;
        let temp_dir = temp_dir.expect("Only file-backed factories can be reopened");
        let config = *factory.config();
        drop(factory);
        let factory = Factory::open_dir_with_config(temp_dir.path().join("databases"), config)
            .expect("Failed to reopen factory");
        Self {
            factory,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestFactory {
    type Target = Factory;

    fn deref(&self) -> &Self::Target {
        &self.factory
    }
}

/// A catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Primary key.
    pub id: String,
    /// Indexed by `by_category`.
    pub category: String,
    /// Indexed by `by_price`.
    pub price: u32,
    /// Indexed by the multi-entry `by_tag`.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Item {
    /// An item without tags.
    pub fn new(id: &str, category: &str, price: u32) -> Self {
        Self {
            id: id.to_owned(),
            category: category.to_owned(),
            price,
            tags: Vec::new(),
        }
    }

    /// Replaces the tags.
    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|tag| (*tag).to_owned()).collect();
        self
    }
}

/// Name of the catalog database.
pub const CATALOG: &str = "catalog";

/// `items` holds [`Item`]s with `by_category`, `by_price` and `by_tag`;
/// `log` holds untyped JSON.
pub fn catalog_schema() -> SchemaDescriptor {
    SchemaDescriptor::builder()
        .store::<Item>("items")
        .index("by_category")
        .index("by_price")
        .index("by_tag")
        .store::<Value>("log")
        .build()
}

/// A closed catalog client at version 1. `on_init` creates `items` keyed
/// by `id` and an auto-increment `log` store.
pub fn catalog_db(factory: &Factory) -> ModernIdb {
    ModernIdb::builder(factory, CATALOG)
        .version(1)
        .schema(catalog_schema())
        .on_init(|ctx| {
            let items = ctx
                .manager
                .create_object_store::<Item>("items", StoreParams::new().key_path("id"))?;
            items.create_index("by_category", "category", IndexParams::new())?;
            items.create_index("by_price", "price", IndexParams::new())?;
            items.create_index("by_tag", "tags", IndexParams::new().multi_entry(true))?;
            ctx.manager
                .create_object_store::<Value>("log", StoreParams::new().auto_increment(true))?;
            Ok(())
        })
        .build()
        .expect("Failed to build catalog client")
}

/// [`catalog_db`], opened.
pub fn open_catalog(factory: &Factory) -> ModernIdb {
    let db = catalog_db(factory);
    db.open().expect("Failed to open catalog");
    db
}

/// Runs a test against an open in-memory catalog.
pub fn with_catalog<F, R>(f: F) -> R
where
    F: FnOnce(&ModernIdb) -> R,
{
    let factory = TestFactory::memory();
    let db = open_catalog(&factory);
    f(&db)
}

/// Runs a test against an open catalog in a temporary directory.
pub fn with_file_catalog<F, R>(f: F) -> R
where
    F: FnOnce(&ModernIdb, &Path) -> R,
{
    let factory = TestFactory::dir();
    let path = factory.path().expect("File factory should have a path");
    let db = open_catalog(&factory);
    f(&db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use modernidb::{TransactionMode, TransactionOptions};

    const CATEGORIES: [&str; 3] = ["books", "games", "tools"];

    /// `count` items with ids `item-000`, `item-001`, ... spread over three
    /// categories, priced `(i * 7) % 50`.
    pub fn sample_items(count: usize) -> Vec<Item> {
        (0..count)
            .map(|i| {
                let price = u32::try_from((i * 7) % 50).unwrap_or_default();
                Item::new(&format!("item-{i:03}"), CATEGORIES[i % 3], price)
                    .with_tags(&[CATEGORIES[(i + 1) % 3]])
            })
            .collect()
    }

    /// An open in-memory catalog holding [`sample_items`]`(count)`.
    pub fn populated_catalog(count: usize) -> (TestFactory, ModernIdb) {
        let factory = TestFactory::memory();
        let db = open_catalog(&factory);
        let (items, done) = db
            .transaction::<Item>("items", TransactionMode::ReadWrite, TransactionOptions::default())
            .expect("Failed to start transaction");
        for item in sample_items(count) {
            items.put(&item, None).expect("Failed to put item");
        }
        done.wait().expect("Failed to commit");
        (factory, db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_catalog_opens() {
        with_catalog(|db| {
            assert!(db.is_open());
            assert_eq!(db.name(), CATALOG);
        });
    }

    #[test]
    fn populated_catalog_holds_items() {
        let (_factory, db) = scenarios::populated_catalog(10);
        let item: Option<Item> = db.get_from_store("items", "item-004").unwrap();
        assert_eq!(item.unwrap().category, "games");
    }

    #[test]
    fn file_factories_survive_reopen() {
        let factory = TestFactory::dir();
        {
            let db = open_catalog(&factory);
            db.put_to_store("items", &Item::new("a", "tools", 1), None).unwrap();
            db.close();
        }
        let factory = factory.reopen();
        let db = open_catalog(&factory);
        let item: Option<Item> = db.get_from_store("items", "a").unwrap();
        assert_eq!(item, Some(Item::new("a", "tools", 1)));
    }
}
