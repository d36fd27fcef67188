//! The entry point: opening, listing and deleting databases.

use crate::config::FactoryConfig;
use crate::connection::Connection;
use crate::database::DatabaseCore;
#[cfg(feature = "std")]
use crate::dir::DatabaseDir;
use crate::error::{EngineError, EngineResult};
use crate::transaction::Transaction;
use crate::types::{
    Durability, EventType, SuccessEvent, TransactionMode, TransactionOutcome, VersionChangeEvent,
};
#[cfg(feature = "std")]
use modernidb_storage::FileBackend;
use modernidb_codec::Key;
use modernidb_storage::{InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
#[cfg(feature = "std")]
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

enum Location {
    Memory,
    #[cfg(feature = "std")]
    Directory(DatabaseDir),
}

struct FactoryInner {
    config: FactoryConfig,
    location: Location,
    databases: Mutex<BTreeMap<String, Arc<DatabaseCore>>>,
}

/// Opens, lists and deletes databases.
///
/// An in-memory factory keeps databases for its own lifetime; a directory
/// factory keeps one journal per database and locks the directory.
///
/// ```
/// use modernidb_engine::{Factory, OpenOutcome, StoreParams};
///
/// let factory = Factory::in_memory();
/// let outcome = factory
///     .open("widgets", 1)
///     .on_upgrade_needed(|upgrade| {
///         upgrade
///             .connection
///             .create_object_store("widgets", StoreParams::new().key_path("id"))?;
///         Ok(())
///     })
///     .send()
///     .unwrap();
/// assert!(matches!(outcome, OpenOutcome::Opened(..)));
/// ```
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner.location {
            Location::Memory => "memory",
            #[cfg(feature = "std")]
            Location::Directory(_) => "directory",
        };
        f.debug_struct("Factory")
            .field("location", &kind)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Name and version of a stored database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Persisted version.
    pub version: u64,
}

/// Arguments of the upgrade listener.
#[derive(Debug)]
pub struct UpgradeNeeded {
    /// The `upgradeneeded` event.
    pub event: VersionChangeEvent,
    /// The connection being opened; its schema methods work until the
    /// listener returns.
    pub connection: Connection,
    /// The version-change transaction.
    pub transaction: Transaction,
}

/// How an open request ended.
#[derive(Debug)]
pub enum OpenOutcome {
    /// The database is open.
    Opened(Connection, SuccessEvent),
    /// Other connections stayed open after the `versionchange` event.
    Blocked(VersionChangeEvent),
}

/// How a delete request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The database is gone (or never existed, with version 0).
    Deleted {
        /// Version before deletion.
        old_version: u64,
    },
    /// Other connections stayed open after the `versionchange` event.
    Blocked(VersionChangeEvent),
}

type UpgradeListener<'a> = Box<dyn FnOnce(UpgradeNeeded) -> EngineResult<()> + 'a>;
type BlockedListener<'a> = Box<dyn FnOnce(&VersionChangeEvent) + 'a>;

/// A pending request to open a database.
#[must_use = "open requests do nothing until sent"]
pub struct OpenDbRequest<'a> {
    factory: &'a Factory,
    name: String,
    version: u64,
    on_upgrade_needed: Option<UpgradeListener<'a>>,
    on_blocked: Option<BlockedListener<'a>>,
}

impl fmt::Debug for OpenDbRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenDbRequest")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl Factory {
    /// A factory whose databases live in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_location(FactoryConfig::default(), Location::Memory, BTreeMap::new())
    }

    /// A factory over a database directory, with default configuration.
    ///
    /// # Errors
    ///
    /// See [`Factory::open_dir_with_config`].
    #[cfg(feature = "std")]
    pub fn open_dir(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::open_dir_with_config(path, FactoryConfig::default())
    }

    /// A factory over a database directory. Every journal in the directory
    /// is replayed up front.
    ///
    /// # Errors
    ///
    /// `DirectoryLocked` if another factory holds the directory, I/O errors,
    /// and `JournalCorruption` / `ChecksumMismatch` for damaged journals.
    #[cfg(feature = "std")]
    pub fn open_dir_with_config(path: impl AsRef<Path>, config: FactoryConfig) -> EngineResult<Self> {
        let dir = DatabaseDir::open(path.as_ref(), config.create_if_missing)?;
        let mut databases = BTreeMap::new();
        for name in dir.database_names()? {
            let backend = FileBackend::open(&dir.journal_path(&name))?;
            let db = DatabaseCore::load(&name, Box::new(backend), config.sync_on_commit)?;
            databases.insert(name, db);
        }
        info!(path = %path.as_ref().display(), databases = databases.len(), "factory opened");
        Ok(Self::with_location(config, Location::Directory(dir), databases))
    }

    fn with_location(
        config: FactoryConfig,
        location: Location,
        databases: BTreeMap<String, Arc<DatabaseCore>>,
    ) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                config,
                location,
                databases: Mutex::new(databases),
            }),
        }
    }

    /// Factory configuration.
    #[must_use]
    pub fn config(&self) -> &FactoryConfig {
        &self.inner.config
    }

    /// Starts a request to open `name` at `version`.
    pub fn open(&self, name: &str, version: u64) -> OpenDbRequest<'_> {
        OpenDbRequest {
            factory: self,
            name: name.to_owned(),
            version,
            on_upgrade_needed: None,
            on_blocked: None,
        }
    }

    /// Deletes a database. Open connections get a `versionchange` event
    /// first; if any stays open the delete is blocked.
    ///
    /// # Errors
    ///
    /// I/O errors removing the journal.
    pub fn delete_database(&self, name: &str) -> EngineResult<DeleteOutcome> {
        let Some(db) = self.inner.databases.lock().get(name).cloned() else {
            return Ok(DeleteOutcome::Deleted { old_version: 0 });
        };
        let old_version = db.version();

        if !notify_connections(&db, old_version, None) {
            debug!(database = name, "delete blocked by open connections");
            return Ok(DeleteOutcome::Blocked(VersionChangeEvent {
                event_type: EventType::Blocked,
                old_version,
                new_version: None,
            }));
        }

        for transaction in db.unsettled_transactions() {
            transaction.finish();
        }
        db.mark_deleted();
        self.inner.databases.lock().remove(name);
        self.remove_journal(name)?;
        info!(database = name, old_version, "database deleted");
        Ok(DeleteOutcome::Deleted { old_version })
    }

    /// Databases with a version above zero, sorted by name.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseInfo> {
        self.inner
            .databases
            .lock()
            .iter()
            .map(|(name, db)| DatabaseInfo {
                name: name.clone(),
                version: db.version(),
            })
            .filter(|info| info.version > 0)
            .collect()
    }

    /// Compares two keys in engine order.
    #[must_use]
    pub fn cmp(&self, a: &Key, b: &Key) -> Ordering {
        a.cmp(b)
    }

    fn remove_journal(&self, name: &str) -> EngineResult<()> {
        match &self.inner.location {
            Location::Memory => Ok(()),
            #[cfg(feature = "std")]
            Location::Directory(dir) => dir.remove_journal(name),
        }
    }

    fn database(&self, name: &str) -> EngineResult<Arc<DatabaseCore>> {
        let mut databases = self.inner.databases.lock();
        if let Some(db) = databases.get(name) {
            return Ok(Arc::clone(db));
        }
        let backend: Box<dyn StorageBackend> = match &self.inner.location {
            Location::Memory => Box::new(InMemoryBackend::new()),
            #[cfg(feature = "std")]
            Location::Directory(dir) => Box::new(FileBackend::open(&dir.journal_path(name))?),
        };
        let db = DatabaseCore::load(name, backend, self.inner.config.sync_on_commit)?;
        databases.insert(name.to_owned(), Arc::clone(&db));
        Ok(db)
    }
}

/// Sends `versionchange` to every open connection. Returns whether all of
/// them closed.
fn notify_connections(db: &DatabaseCore, old_version: u64, new_version: Option<u64>) -> bool {
    let open = db.open_connections();
    if open.is_empty() {
        return true;
    }
    let event = VersionChangeEvent {
        event_type: EventType::VersionChange,
        old_version,
        new_version,
    };
    for core in open {
        Connection::from_core(core).fire_versionchange(&event);
    }
    db.open_connections().is_empty()
}

/// Clears the database's upgrade flag however the upgrade ends.
struct UpgradeFlag<'a> {
    db: &'a DatabaseCore,
}

impl Drop for UpgradeFlag<'_> {
    fn drop(&mut self) {
        self.db.lock().upgrading = false;
    }
}

impl<'a> OpenDbRequest<'a> {
    /// Sets the listener that runs when the database must be upgraded.
    /// Returning an error aborts the upgrade.
    pub fn on_upgrade_needed(
        mut self,
        listener: impl FnOnce(UpgradeNeeded) -> EngineResult<()> + 'a,
    ) -> Self {
        self.on_upgrade_needed = Some(Box::new(listener));
        self
    }

    /// Sets the listener that runs when the request is blocked.
    pub fn on_blocked(mut self, listener: impl FnOnce(&VersionChangeEvent) + 'a) -> Self {
        self.on_blocked = Some(Box::new(listener));
        self
    }

    /// Runs the request.
    ///
    /// # Errors
    ///
    /// `InvalidAccessError` for version 0, `VersionError` when the stored
    /// version is higher, and the upgrade's abort error when the upgrade
    /// fails. Nothing of a failed upgrade is kept.
    pub fn send(self) -> EngineResult<OpenOutcome> {
        let Self {
            factory,
            name,
            version,
            on_upgrade_needed,
            on_blocked,
        } = self;
        if version == 0 {
            return Err(EngineError::invalid_access("version must be at least 1"));
        }
        let db = factory.database(&name)?;
        let old_version = db.version();

        if version < old_version {
            return Err(EngineError::version(format!(
                "requested version {version} is below the stored version {old_version}"
            )));
        }
        if version == old_version {
            debug!(database = %name, version, "database opened");
            return Ok(OpenOutcome::Opened(
                Connection::new(db, version),
                SuccessEvent {
                    old_version,
                    version,
                },
            ));
        }

        let blocked = VersionChangeEvent {
            event_type: EventType::Blocked,
            old_version,
            new_version: Some(version),
        };
        if db.lock().upgrading || !notify_connections(&db, old_version, Some(version)) {
            debug!(database = %name, old_version, version, "upgrade blocked");
            if let Some(listener) = on_blocked {
                listener(&blocked);
            }
            return Ok(OpenOutcome::Blocked(blocked));
        }

        db.lock().upgrading = true;
        let _flag = UpgradeFlag { db: &db };
        for transaction in db.unsettled_transactions() {
            transaction.finish();
        }

        let connection = Connection::new(Arc::clone(&db), version);
        let upgrade = Transaction::create(
            Arc::clone(&db),
            TransactionMode::VersionChange,
            db.store_names(),
            Durability::Strict,
            Some(version),
        );
        connection.begin_upgrade(upgrade.clone());
        debug!(database = %name, old_version, version, "upgrade started");

        if let Some(listener) = on_upgrade_needed {
            let result = listener(UpgradeNeeded {
                event: VersionChangeEvent {
                    event_type: EventType::UpgradeNeeded,
                    old_version,
                    new_version: Some(version),
                },
                connection: connection.clone(),
                transaction: upgrade.clone(),
            });
            if let Err(error) = result {
                warn!(database = %name, error = %error, "upgrade listener failed");
                if let Err(settled) = upgrade.abort_with(error) {
                    trace!(database = %name, %settled, "upgrade had already ended");
                }
            }
        }
        if connection.is_closed() {
            if let Err(settled) =
                upgrade.abort_with(EngineError::abort("connection closed during the upgrade"))
            {
                trace!(database = %name, %settled, "upgrade had already ended");
            }
        }

        connection.end_upgrade();
        let outcome = upgrade.core().finish();
        drop(upgrade);
        match outcome {
            TransactionOutcome::Committed => {
                debug!(database = %name, version, "upgrade committed");
                Ok(OpenOutcome::Opened(
                    connection,
                    SuccessEvent {
                        old_version,
                        version,
                    },
                ))
            }
            TransactionOutcome::Aborted(error) => {
                connection.close();
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{open_with, read, seed, widget, widgets, write};
    use crate::{CursorDirection, IndexParams, StoreParams};
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn widgets_round_trip() {
        let factory = Factory::in_memory();
        let db = widgets(&factory);
        assert_eq!(db.version(), 1);
        assert_eq!(db.object_store_names(), vec!["widgets"]);

        let tx = write(&db);
        tx.object_store("widgets")
            .unwrap()
            .put(json!({"id": "a", "qty": 3}), None)
            .unwrap();
        tx.commit().unwrap();

        let tx = read(&db);
        let store = tx.object_store("widgets").unwrap();
        assert_eq!(
            store.get("a").unwrap().into_result().unwrap(),
            Some(json!({"id": "a", "qty": 3}))
        );
        let cursor = store
            .open_cursor(None, CursorDirection::Next)
            .unwrap()
            .result()
            .unwrap()
            .unwrap();
        assert_eq!(cursor.value(), Some(&json!({"id": "a", "qty": 3})));
        cursor.continue_(None).unwrap();
        assert!(cursor.request().result().unwrap().is_none());
    }

    #[test]
    fn version_rules() {
        let factory = Factory::in_memory();
        widgets(&factory);

        let zero = factory.open("inventory", 0).send().unwrap_err();
        assert_eq!(zero.name(), "InvalidAccessError");

        let same = factory.open("inventory", 1).send().unwrap();
        assert!(matches!(
            same,
            OpenOutcome::Opened(_, SuccessEvent { old_version: 1, version: 1 })
        ));
        drop(same);

        open_with(&factory, "inventory", 3, |_, _| {});
        let err = factory.open("inventory", 2).send().unwrap_err();
        assert_eq!(err.name(), "VersionError");
    }

    #[test]
    fn failed_upgrade_keeps_nothing() {
        let factory = Factory::in_memory();
        let db = widgets(&factory);
        seed(&db, &[widget("a", 1, &[])]);
        db.close();

        let err = factory
            .open("inventory", 2)
            .on_upgrade_needed(|upgrade| {
                upgrade
                    .connection
                    .create_object_store("gadgets", StoreParams::new())?;
                upgrade.connection.delete_object_store("widgets")?;
                Err(EngineError::constraint("refusing to migrate"))
            })
            .send()
            .unwrap_err();
        assert_eq!(err.name(), "ConstraintError");

        let db = open_with(&factory, "inventory", 1, |_, _| panic!("no upgrade expected"));
        assert_eq!(db.version(), 1);
        assert_eq!(db.object_store_names(), vec!["widgets"]);
        let tx = read(&db);
        let count = tx.object_store("widgets").unwrap().count(None).unwrap();
        assert_eq!(count.into_result().unwrap(), 1);
    }

    #[test]
    fn unique_index_over_conflicting_data_aborts_upgrade() {
        let factory = Factory::in_memory();
        let db = widgets(&factory);
        seed(&db, &[widget("a", 1, &[]), widget("b", 1, &[])]);
        db.close();

        let err = factory
            .open("inventory", 2)
            .on_upgrade_needed(|upgrade| {
                let store = upgrade.transaction.object_store("widgets")?;
                store.create_index("qty_unique", "qty", IndexParams::new().unique(true))?;
                Ok(())
            })
            .send()
            .unwrap_err();
        assert_eq!(err.name(), "ConstraintError");
        assert_eq!(factory.databases()[0].version, 1);
    }

    #[test]
    fn open_connection_blocks_upgrade_until_closed() {
        let factory = Factory::in_memory();
        let first = widgets(&factory);

        let blocked = Cell::new(false);
        let outcome = factory
            .open("inventory", 2)
            .on_blocked(|event| {
                assert_eq!(event.event_type, EventType::Blocked);
                blocked.set(true);
            })
            .send()
            .unwrap();
        assert!(matches!(outcome, OpenOutcome::Blocked(_)));
        assert!(blocked.get());
        assert!(!first.is_closed());

        first.add_versionchange_listener(|connection, event| {
            assert_eq!(event.new_version, Some(2));
            connection.close();
        });
        let second = open_with(&factory, "inventory", 2, |_, _| {});
        assert!(first.is_closed());
        assert_eq!(second.version(), 2);
        assert_eq!(
            first
                .transaction(["widgets"], TransactionMode::ReadOnly, Durability::Default)
                .unwrap_err()
                .name(),
            "InvalidStateError"
        );
    }

    #[test]
    fn closing_inside_the_upgrade_aborts_it() {
        let factory = Factory::in_memory();
        let err = factory
            .open("scratch", 1)
            .on_upgrade_needed(|upgrade| {
                upgrade
                    .connection
                    .create_object_store("s", StoreParams::new())?;
                upgrade.connection.close();
                Ok(())
            })
            .send()
            .unwrap_err();
        assert_eq!(err.name(), "AbortError");
        assert!(factory.databases().is_empty());
    }

    #[test]
    fn schema_changes_need_an_upgrade() {
        let factory = Factory::in_memory();
        let db = widgets(&factory);
        assert_eq!(
            db.create_object_store("x", StoreParams::new())
                .unwrap_err()
                .name(),
            "InvalidStateError"
        );
        let tx = write(&db);
        let store = tx.object_store("widgets").unwrap();
        assert_eq!(
            store
                .create_index("i", "qty", IndexParams::new())
                .unwrap_err()
                .name(),
            "InvalidStateError"
        );
    }

    #[test]
    fn delete_database() {
        let factory = Factory::in_memory();
        assert_eq!(
            factory.delete_database("missing").unwrap(),
            DeleteOutcome::Deleted { old_version: 0 }
        );

        let db = widgets(&factory);
        assert!(matches!(
            factory.delete_database("inventory").unwrap(),
            DeleteOutcome::Blocked(_)
        ));
        db.close();
        assert_eq!(
            factory.delete_database("inventory").unwrap(),
            DeleteOutcome::Deleted { old_version: 1 }
        );
        assert!(factory.databases().is_empty());

        let reopened = open_with(&factory, "inventory", 1, |_, _| {});
        assert!(reopened.object_store_names().is_empty());
    }

    #[test]
    fn directory_factory_persists_commits() {
        let dir = tempfile::tempdir().unwrap();
        {
            let factory = Factory::open_dir(dir.path()).unwrap();
            assert!(matches!(
                Factory::open_dir(dir.path()),
                Err(EngineError::DirectoryLocked)
            ));
            let db = widgets(&factory);
            seed(&db, &[widget("a", 3, &["red"]), widget("b", 5, &["blue"])]);

            let tx = write(&db);
            tx.object_store("widgets").unwrap().delete("b").unwrap();
            tx.commit().unwrap();

            let aborted = write(&db);
            aborted
                .object_store("widgets")
                .unwrap()
                .put(widget("c", 9, &[]), None)
                .unwrap();
            aborted.abort().unwrap();
        }

        let factory = Factory::open_dir(dir.path()).unwrap();
        assert_eq!(
            factory.databases(),
            vec![DatabaseInfo {
                name: "inventory".into(),
                version: 1
            }]
        );
        let db = open_with(&factory, "inventory", 1, |_, _| {});
        let tx = read(&db);
        let store = tx.object_store("widgets").unwrap();
        assert_eq!(
            store.get_all_keys(None, None).unwrap().into_result().unwrap(),
            vec![Key::from("a")]
        );
        let by_tag = store.index("by_tag").unwrap();
        assert_eq!(
            by_tag.get_key("red").unwrap().into_result().unwrap(),
            Some(Key::from("a"))
        );
    }

    #[test]
    fn directory_delete_removes_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        {
            let factory = Factory::open_dir(dir.path()).unwrap();
            widgets(&factory).close();
            factory.delete_database("inventory").unwrap();
        }
        let factory = Factory::open_dir(dir.path()).unwrap();
        assert!(factory.databases().is_empty());
    }
}
