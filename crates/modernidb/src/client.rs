//! The database client: lifecycle, migrations, transactions and helpers.

use crate::adapters::Completion;
use crate::error::{HandlerError, ModernIdbError, Result};
use crate::events::{ListenerId, Subscription, TransactionEvent, TransactionEventBus};
use crate::manager::VersionChangeManager;
use crate::object_store::{decode, ObjectStore};
use crate::schema::SchemaDescriptor;
use crate::single_flight::SingleFlight;
use crate::transaction::{Transaction, TransactionOptions, VersionChangeTransaction};
use modernidb_engine::{
    Connection, DeleteOutcome, EngineError, EngineResult, Factory, Key, KeyRange,
    OpenOutcome, SuccessEvent, TransactionMode, UpgradeNeeded, VersionChangeEvent,
};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

const OPEN_FLIGHT: &str = "open";

/// Lifecycle state of a [`ModernIdb`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection; `open` may be called.
    #[default]
    Closed,
    /// An open request is running.
    Opening,
    /// Connected.
    Open,
}

impl ConnectionState {
    /// Lower-case state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening => "opening",
            Self::Open => "open",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handed to `on_init` and `on_upgrade`.
#[derive(Debug)]
pub struct UpgradeContext<'a> {
    /// The `upgradeneeded` event.
    pub event: VersionChangeEvent,
    /// Schema operations for this upgrade.
    pub manager: &'a VersionChangeManager,
    /// The client being opened. Its state is `Opening`.
    pub db: &'a ModernIdb,
}

/// Handed to `on_blocking`.
#[derive(Debug)]
pub struct BlockingContext<'a> {
    /// The `versionchange` event; `new_version` is `None` for a delete.
    pub event: VersionChangeEvent,
    /// The client whose connection is in the way.
    pub db: &'a ModernIdb,
}

/// Migration handler. Returning an error aborts the upgrade.
pub type VersionChangeHandler =
    Arc<dyn Fn(UpgradeContext<'_>) -> std::result::Result<(), HandlerError> + Send + Sync>;

/// Handler for another request wanting to upgrade or delete the database.
pub type BlockingHandler = Arc<dyn Fn(BlockingContext<'_>) + Send + Sync>;

/// Handlers for an open request. Set fields replace the stored ones; unset
/// fields keep them.
#[derive(Clone, Default)]
pub struct OpenRequestHandlers {
    on_init: Option<VersionChangeHandler>,
    on_upgrade: Option<VersionChangeHandler>,
    on_blocking: Option<BlockingHandler>,
}

impl fmt::Debug for OpenRequestHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRequestHandlers")
            .field("on_init", &self.on_init.is_some())
            .field("on_upgrade", &self.on_upgrade.is_some())
            .field("on_blocking", &self.on_blocking.is_some())
            .finish()
    }
}

impl OpenRequestHandlers {
    /// No handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs when the database is created (stored version 0).
    #[must_use]
    pub fn on_init(
        mut self,
        handler: impl Fn(UpgradeContext<'_>) -> std::result::Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_init = Some(Arc::new(handler));
        self
    }

    /// Runs when an existing database is upgraded.
    #[must_use]
    pub fn on_upgrade(
        mut self,
        handler: impl Fn(UpgradeContext<'_>) -> std::result::Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.on_upgrade = Some(Arc::new(handler));
        self
    }

    /// Runs when this connection blocks another request. Usually closes the
    /// client.
    #[must_use]
    pub fn on_blocking(mut self, handler: impl Fn(BlockingContext<'_>) + Send + Sync + 'static) -> Self {
        self.on_blocking = Some(Arc::new(handler));
        self
    }

    fn apply(&mut self, other: Self) {
        if other.on_init.is_some() {
            self.on_init = other.on_init;
        }
        if other.on_upgrade.is_some() {
            self.on_upgrade = other.on_upgrade;
        }
        if other.on_blocking.is_some() {
            self.on_blocking = other.on_blocking;
        }
    }
}

/// Builder for [`ModernIdb`].
#[derive(Debug)]
#[must_use = "builders do nothing until built"]
pub struct ModernIdbBuilder {
    factory: Factory,
    name: String,
    version: u64,
    schema: Option<Arc<SchemaDescriptor>>,
    handlers: OpenRequestHandlers,
}

impl ModernIdbBuilder {
    /// Sets the version to open; defaults to 1.
    pub const fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Declares the stores and indexes typed handles are checked against.
    pub fn schema(mut self, schema: SchemaDescriptor) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// See [`OpenRequestHandlers::on_init`].
    pub fn on_init(
        mut self,
        handler: impl Fn(UpgradeContext<'_>) -> std::result::Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.handlers = self.handlers.on_init(handler);
        self
    }

    /// See [`OpenRequestHandlers::on_upgrade`].
    pub fn on_upgrade(
        mut self,
        handler: impl Fn(UpgradeContext<'_>) -> std::result::Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.handlers = self.handlers.on_upgrade(handler);
        self
    }

    /// See [`OpenRequestHandlers::on_blocking`].
    pub fn on_blocking(mut self, handler: impl Fn(BlockingContext<'_>) + Send + Sync + 'static) -> Self {
        self.handlers = self.handlers.on_blocking(handler);
        self
    }

    /// Creates the client, in the `Closed` state.
    ///
    /// # Errors
    ///
    /// [`ModernIdbError::InvalidConfig`] for version 0.
    pub fn build(self) -> Result<ModernIdb> {
        if self.version == 0 {
            return Err(ModernIdbError::invalid_config(format!(
                "version of {:?} must be at least 1",
                self.name
            )));
        }
        Ok(ModernIdb {
            inner: Arc::new(Inner {
                factory: self.factory,
                name: self.name,
                version: self.version,
                schema: self.schema,
                handlers: Mutex::new(self.handlers),
                lifecycle: Mutex::new(Lifecycle::default()),
                events: TransactionEventBus::new(),
                opens: SingleFlight::new(),
            }),
        })
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: ConnectionState,
    connection: Option<Connection>,
}

struct Inner {
    factory: Factory,
    name: String,
    version: u64,
    schema: Option<Arc<SchemaDescriptor>>,
    handlers: Mutex<OpenRequestHandlers>,
    lifecycle: Mutex<Lifecycle>,
    events: TransactionEventBus,
    opens: SingleFlight<&'static str, ()>,
}

/// A client for one database at one version.
///
/// Cheap to clone; clones share the connection, handlers and event bus.
///
/// # Example
///
/// ```
/// use modernidb::{ModernIdb, Factory, StoreParams, TransactionMode, TransactionOptions};
/// use serde_json::{json, Value};
///
/// let factory = Factory::in_memory();
/// let db = ModernIdb::builder(&factory, "notes")
///     .on_init(|ctx| {
///         ctx.manager
///             .create_object_store::<Value>("notes", StoreParams::new().auto_increment(true))?;
///         Ok(())
///     })
///     .build()
///     .unwrap();
/// db.open().unwrap();
///
/// let key = db.put_to_store("notes", &json!({"text": "hi"}), None).unwrap();
/// let note: Option<Value> = db.get_from_store("notes", key).unwrap();
/// assert_eq!(note, Some(json!({"text": "hi"})));
/// ```
#[derive(Clone)]
pub struct ModernIdb {
    inner: Arc<Inner>,
}

impl fmt::Debug for ModernIdb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModernIdb")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ModernIdb {
    /// Starts building a client for database `name` of `factory`.
    pub fn builder(factory: &Factory, name: impl Into<String>) -> ModernIdbBuilder {
        ModernIdbBuilder {
            factory: factory.clone(),
            name: name.into(),
            version: 1,
            schema: None,
            handlers: OpenRequestHandlers::default(),
        }
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Version this client opens.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version
    }

    /// The declared schema, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&SchemaDescriptor> {
        self.inner.schema.as_deref()
    }

    /// The factory the database lives in.
    #[must_use]
    pub fn factory(&self) -> &Factory {
        &self.inner.factory
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().state
    }

    /// Whether a connection is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lifecycle.lock().connection.is_some()
    }

    /// Opens the database with the handlers given to the builder.
    ///
    /// # Errors
    ///
    /// See [`open_with`](Self::open_with).
    pub fn open(&self) -> Result<SuccessEvent> {
        self.open_with(OpenRequestHandlers::default())
    }

    /// Opens the database. Handlers set in `handlers` replace the stored
    /// ones, for this and later calls.
    ///
    /// `on_init` runs when the database did not exist, `on_upgrade` when its
    /// version is lower than [`version`](Self::version). A handler error
    /// aborts the upgrade, leaves the stored database untouched and is
    /// returned here.
    ///
    /// # Errors
    ///
    /// - [`ModernIdbError::InvalidConnectionState`] unless the state is
    ///   `Closed`, or when [`close`](Self::close) is called while opening.
    /// - [`ModernIdbError::OpenRequestBlocked`] when other connections stay
    ///   open.
    /// - `VersionError` when the stored version is higher.
    /// - The handler's error, or the engine's abort error.
    pub fn open_with(&self, handlers: OpenRequestHandlers) -> Result<SuccessEvent> {
        let inner = &*self.inner;
        let Some(flight) = inner.opens.try_claim(OPEN_FLIGHT) else {
            return Err(self.not_closed(ConnectionState::Opening));
        };
        {
            let mut lifecycle = inner.lifecycle.lock();
            if lifecycle.state != ConnectionState::Closed {
                return Err(self.not_closed(lifecycle.state));
            }
            lifecycle.state = ConnectionState::Opening;
        }
        let opening = OpeningGuard { db: self, armed: true };
        let (on_init, on_upgrade, on_blocking) = {
            let mut stored = inner.handlers.lock();
            stored.apply(handlers);
            (
                stored.on_init.clone(),
                stored.on_upgrade.clone(),
                stored.on_blocking.clone(),
            )
        };
        debug!(database = %inner.name, version = inner.version, "opening database");

        let failure = RefCell::new(None);
        let sent = inner
            .factory
            .open(&inner.name, inner.version)
            .on_upgrade_needed(|needed| {
                let handler = if needed.event.old_version == 0 {
                    on_init.as_ref()
                } else {
                    on_upgrade.as_ref()
                };
                self.migrate(needed, handler, &failure)
            })
            .send();
        opening.disarm();
        let result = self.finish_open(sent, failure.take(), on_blocking);
        flight.complete(());
        result
    }

    fn migrate(
        &self,
        needed: UpgradeNeeded,
        handler: Option<&VersionChangeHandler>,
        failure: &RefCell<Option<ModernIdbError>>,
    ) -> EngineResult<()> {
        let Some(handler) = handler else {
            return Ok(());
        };
        let UpgradeNeeded {
            event,
            connection,
            transaction,
        } = needed;
        debug!(
            database = %self.inner.name,
            old_version = event.old_version,
            new_version = connection.version(),
            "running migration"
        );
        let schema = self.inner.schema.clone();
        let manager = VersionChangeManager::new(
            connection,
            event,
            VersionChangeTransaction::new(transaction, schema.clone()),
            schema,
        );
        let outcome = handler(UpgradeContext {
            event,
            manager: &manager,
            db: self,
        });
        match outcome {
            Ok(()) => Ok(()),
            Err(error) => {
                let error = ModernIdbError::from_handler(error);
                warn!(database = %self.inner.name, %error, "migration failed");
                let abort = match &error {
                    ModernIdbError::Engine(engine) => engine.clone(),
                    other => EngineError::abort(other.to_string()),
                };
                *failure.borrow_mut() = Some(error);
                Err(abort)
            }
        }
    }

    fn finish_open(
        &self,
        sent: EngineResult<OpenOutcome>,
        failure: Option<ModernIdbError>,
        on_blocking: Option<BlockingHandler>,
    ) -> Result<SuccessEvent> {
        let inner = &*self.inner;
        let outcome = match sent {
            Ok(outcome) => outcome,
            Err(error) => {
                self.reset();
                let error = failure.unwrap_or(ModernIdbError::Engine(error));
                debug!(database = %inner.name, %error, "open failed");
                return Err(error);
            }
        };
        match outcome {
            OpenOutcome::Blocked(event) => {
                self.reset();
                debug!(database = %inner.name, old_version = event.old_version, "open blocked");
                Err(ModernIdbError::OpenRequestBlocked {
                    name: inner.name.clone(),
                    old_version: event.old_version,
                    new_version: event.new_version.unwrap_or(inner.version),
                })
            }
            OpenOutcome::Opened(connection, event) => {
                let mut lifecycle = inner.lifecycle.lock();
                if lifecycle.state != ConnectionState::Opening {
                    drop(lifecycle);
                    connection.close();
                    return Err(ModernIdbError::invalid_connection_state(format!(
                        "connection to {:?} was closed while it was being opened",
                        inner.name
                    )));
                }
                if let Some(handler) = on_blocking {
                    let weak = Arc::downgrade(&self.inner);
                    connection.add_versionchange_listener(move |_, event| {
                        notify_blocking(&weak, &handler, *event);
                    });
                }
                lifecycle.state = ConnectionState::Open;
                lifecycle.connection = Some(connection);
                debug!(database = %inner.name, version = event.version, "database open");
                Ok(event)
            }
        }
    }

    fn reset(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.state = ConnectionState::Closed;
        lifecycle.connection = None;
    }

    fn not_closed(&self, state: ConnectionState) -> ModernIdbError {
        ModernIdbError::invalid_connection_state(format!(
            "cannot open connection to database {:?}: instance must be in the 'closed' state in \
             order to be opened, but current state is '{state}'",
            self.inner.name
        ))
    }

    /// Closes the connection. Transactions already running finish; the
    /// state becomes `Closed` right away, so closing while opening makes
    /// that open fail.
    pub fn close(&self) {
        let connection = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.state = ConnectionState::Closed;
            lifecycle.connection.take()
        };
        if let Some(connection) = connection {
            connection.close();
            debug!(database = %self.inner.name, "database closed");
        }
    }

    fn connection(&self, method: &str) -> Result<Connection> {
        let lifecycle = self.inner.lifecycle.lock();
        lifecycle.connection.clone().ok_or_else(|| {
            ModernIdbError::invalid_connection_state(format!(
                "the '{method}' method can only be called on an instance in the 'open' state, \
                 but current state is '{}'",
                lifecycle.state
            ))
        })
    }

    fn bus_for(&self, options: TransactionOptions) -> Option<TransactionEventBus> {
        (!options.no_emit).then(|| self.inner.events.clone())
    }

    /// Starts a transaction over one store.
    ///
    /// # Errors
    ///
    /// [`ModernIdbError::InvalidConnectionState`] unless open, schema
    /// mismatches, `NotFoundError` for unknown stores.
    pub fn transaction<T: Serialize + DeserializeOwned + 'static>(
        &self,
        store: &str,
        mode: TransactionMode,
        options: TransactionOptions,
    ) -> Result<(ObjectStore<T>, Completion)> {
        let connection = self.connection("transaction")?;
        if let Some(schema) = &self.inner.schema {
            schema.check_store::<T>(store)?;
        }
        let tx = connection.transaction([store], mode, options.durability)?;
        let handle = ObjectStore::new(tx.object_store(store)?, self.inner.schema.clone())?;
        let completion = Completion::new(tx, vec![store.to_owned()], self.bus_for(options));
        Ok((handle, completion))
    }

    /// Starts a transaction over several stores.
    ///
    /// # Errors
    ///
    /// [`ModernIdbError::InvalidConnectionState`] unless open,
    /// `InvalidAccessError` for an empty scope, `NotFoundError` for unknown
    /// stores.
    pub fn transaction_many<I, S>(
        &self,
        stores: I,
        mode: TransactionMode,
        options: TransactionOptions,
    ) -> Result<(Transaction, Completion)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let connection = self.connection("transaction")?;
        let names: Vec<String> = stores.into_iter().map(Into::into).collect();
        let tx = connection.transaction(names.iter().cloned(), mode, options.durability)?;
        let handle = Transaction::new(tx.clone(), names.clone(), self.inner.schema.clone());
        let completion = Completion::new(tx, names, self.bus_for(options));
        Ok((handle, completion))
    }

    /// Reads one record in its own read-only transaction.
    ///
    /// # Errors
    ///
    /// As for [`transaction`](Self::transaction) and
    /// [`ObjectStore::get`].
    pub fn get_from_store<T: DeserializeOwned + 'static>(
        &self,
        store: &str,
        query: impl Into<KeyRange>,
    ) -> Result<Option<T>> {
        if let Some(schema) = &self.inner.schema {
            schema.check_store::<T>(store)?;
        }
        let (handle, done) = self.transaction::<Value>(
            store,
            TransactionMode::ReadOnly,
            TransactionOptions::default(),
        )?;
        let value = handle.get(query)?;
        done.wait()?;
        value.map(decode).transpose()
    }

    /// Writes one record in its own read-write transaction and waits for the
    /// commit. Returns the record's key.
    ///
    /// # Errors
    ///
    /// As for [`transaction`](Self::transaction) and [`ObjectStore::put`].
    pub fn put_to_store<T: Serialize + DeserializeOwned + 'static>(
        &self,
        store: &str,
        value: &T,
        key: Option<Key>,
    ) -> Result<Key> {
        let (handle, done) =
            self.transaction::<T>(store, TransactionMode::ReadWrite, TransactionOptions::default())?;
        let key = handle.put(value, key)?;
        done.wait()?;
        Ok(key)
    }

    /// Deletes the records in `query` in their own read-write transaction
    /// and waits for the commit.
    ///
    /// # Errors
    ///
    /// As for [`transaction`](Self::transaction) and
    /// [`ObjectStore::delete`].
    pub fn delete_from_store(&self, store: &str, query: impl Into<KeyRange>) -> Result<()> {
        let (handle, done) = self.transaction::<Value>(
            store,
            TransactionMode::ReadWrite,
            TransactionOptions::default(),
        )?;
        handle.delete(query)?;
        done.wait()?;
        Ok(())
    }

    /// The bus transaction events are emitted on.
    #[must_use]
    pub fn events(&self) -> &TransactionEventBus {
        &self.inner.events
    }

    /// See [`TransactionEventBus::subscribe`].
    pub fn subscribe(
        &self,
        mode: TransactionMode,
        listener: impl Fn(&TransactionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(mode, listener)
    }

    /// See [`TransactionEventBus::add_event_listener`].
    pub fn add_event_listener(
        &self,
        mode: TransactionMode,
        listener: impl Fn(&TransactionEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.add_event_listener(mode, listener)
    }

    /// See [`TransactionEventBus::remove_event_listener`].
    pub fn remove_event_listener(&self, mode: TransactionMode, id: ListenerId) -> bool {
        self.inner.events.remove_event_listener(mode, id)
    }

    /// See [`TransactionEventBus::subscribe_channel`].
    #[must_use]
    pub fn subscribe_channel(&self, mode: TransactionMode) -> Receiver<TransactionEvent> {
        self.inner.events.subscribe_channel(mode)
    }
}

/// Puts the client back to `Closed` if an open unwinds before it finishes.
struct OpeningGuard<'a> {
    db: &'a ModernIdb,
    armed: bool,
}

impl OpeningGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(database = %self.db.inner.name, "open unwound, resetting to closed");
            self.db.reset();
        }
    }
}

fn notify_blocking(weak: &Weak<Inner>, handler: &BlockingHandler, event: VersionChangeEvent) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let db = ModernIdb { inner };
    debug!(database = %db.inner.name, new_version = ?event.new_version, "connection is blocking");
    handler(BlockingContext { event, db: &db });
}

/// Deletes database `name` of `factory`. Deleting a missing database
/// succeeds.
///
/// # Errors
///
/// [`ModernIdbError::DeleteBlocked`] when other connections stay open.
pub fn delete_database(factory: &Factory, name: &str) -> Result<()> {
    match factory.delete_database(name)? {
        DeleteOutcome::Deleted { old_version } => {
            debug!(database = name, old_version, "database deleted");
            Ok(())
        }
        DeleteOutcome::Blocked(_) => Err(ModernIdbError::DeleteBlocked {
            name: name.to_owned(),
        }),
    }
}

/// The engine connection behind `db`, for tests reaching below the client.
#[cfg(test)]
pub(crate) fn engine_connection(db: &ModernIdb) -> Option<Connection> {
    db.inner.lifecycle.lock().connection.clone()
}
