//! Connections to a database.

use crate::database::DatabaseCore;
use crate::error::{EngineError, EngineResult};
use crate::object_store::ObjectStoreHandle;
use crate::schema::{StoreParams, StoreSchema};
use crate::transaction::Transaction;
use crate::types::{Durability, ListenerId, TransactionMode, VersionChangeEvent};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type VersionChangeListener = Arc<dyn Fn(&Connection, &VersionChangeEvent) + Send + Sync>;

pub(crate) struct ConnectionCore {
    db: Arc<DatabaseCore>,
    version: AtomicU64,
    closed: AtomicBool,
    upgrade: Mutex<Option<Transaction>>,
    listeners: Mutex<Vec<(ListenerId, VersionChangeListener)>>,
}

impl fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCore")
            .field("db", &self.db.name())
            .field("version", &self.version.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ConnectionCore {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// An open handle to one named, versioned database.
///
/// Clones share the connection; closing any of them closes all.
#[derive(Debug, Clone)]
pub struct Connection {
    core: Arc<ConnectionCore>,
}

impl Connection {
    pub(crate) fn new(db: Arc<DatabaseCore>, version: u64) -> Self {
        let core = Arc::new(ConnectionCore {
            db: Arc::clone(&db),
            version: AtomicU64::new(version),
            closed: AtomicBool::new(false),
            upgrade: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        });
        db.register_connection(&core);
        Self { core }
    }

    pub(crate) fn from_core(core: Arc<ConnectionCore>) -> Self {
        Self { core }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.core.db.name()
    }

    /// Version the connection was opened at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.core.version.load(Ordering::Acquire)
    }

    /// Names of the database's stores, sorted. During an upgrade this
    /// reflects the upgrade's changes so far.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        match self.upgrade_transaction() {
            Some(upgrade) => upgrade.object_store_names(),
            None => self.core.db.store_names(),
        }
    }

    /// Whether [`Connection::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Closes the connection. Transactions already created run to the end;
    /// no new ones can be started.
    pub fn close(&self) {
        if !self.core.closed.swap(true, Ordering::AcqRel) {
            debug!(database = self.name(), version = self.version(), "connection closed");
        }
    }

    /// Starts a transaction over `scope`.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` when closed or upgrading, `InvalidAccessError` for
    /// an empty scope or the version-change mode, `NotFoundError` for an
    /// unknown store.
    pub fn transaction<I, S>(
        &self,
        scope: I,
        mode: TransactionMode,
        durability: Durability,
    ) -> EngineResult<Transaction>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_closed() {
            return Err(EngineError::invalid_state(format!(
                "connection to {:?} is closed",
                self.name()
            )));
        }
        if self.upgrade_transaction().is_some() {
            return Err(EngineError::invalid_state(
                "cannot start a transaction while the upgrade is running",
            ));
        }
        if mode == TransactionMode::VersionChange {
            return Err(EngineError::invalid_access(
                "version-change transactions only come from upgrades",
            ));
        }

        let mut scope: Vec<String> = scope.into_iter().map(Into::into).collect();
        scope.sort();
        scope.dedup();
        if scope.is_empty() {
            return Err(EngineError::invalid_access("transaction scope is empty"));
        }
        let known = self.core.db.store_names();
        if let Some(missing) = scope.iter().find(|name| !known.contains(name)) {
            return Err(EngineError::not_found(format!("no store named {missing:?}")));
        }

        Ok(Transaction::create(
            Arc::clone(&self.core.db),
            mode,
            scope,
            durability,
            None,
        ))
    }

    /// Creates a store. Upgrades only.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` outside this connection's upgrade,
    /// `ConstraintError` if the name is taken, `SyntaxError` /
    /// `InvalidAccessError` for bad key options.
    pub fn create_object_store(
        &self,
        name: &str,
        params: StoreParams,
    ) -> EngineResult<ObjectStoreHandle> {
        let upgrade = self.require_upgrade()?;
        let schema = StoreSchema::new(name, params)?;
        let created = schema.clone();
        upgrade.with_working(|working| working.create_store(created))?;
        debug!(database = self.name(), store = name, "store created");
        Ok(ObjectStoreHandle::new(upgrade, schema))
    }

    /// Deletes a store and its records. Upgrades only.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` outside this connection's upgrade, `NotFoundError`
    /// for an unknown store.
    pub fn delete_object_store(&self, name: &str) -> EngineResult<()> {
        let upgrade = self.require_upgrade()?;
        upgrade.with_working(|working| working.delete_store(name))?;
        debug!(database = self.name(), store = name, "store deleted");
        Ok(())
    }

    /// Registers a listener for other requests wanting to upgrade or delete
    /// the database. The listener is expected to close the connection.
    pub fn add_versionchange_listener(
        &self,
        listener: impl Fn(&Connection, &VersionChangeEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.core.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns whether it was registered.
    pub fn remove_versionchange_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.core.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub(crate) fn fire_versionchange(&self, event: &VersionChangeEvent) {
        let listeners: Vec<VersionChangeListener> = self
            .core
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(self, event);
        }
    }

    pub(crate) fn begin_upgrade(&self, transaction: Transaction) {
        *self.core.upgrade.lock() = Some(transaction);
    }

    pub(crate) fn end_upgrade(&self) -> Option<Transaction> {
        self.core.upgrade.lock().take()
    }

    fn upgrade_transaction(&self) -> Option<Transaction> {
        self.core
            .upgrade
            .lock()
            .clone()
            .filter(|upgrade| !upgrade.is_settled())
    }

    fn require_upgrade(&self) -> EngineResult<Transaction> {
        self.upgrade_transaction().ok_or_else(|| {
            EngineError::invalid_state("stores can only be created or deleted during an upgrade")
        })
    }
}
