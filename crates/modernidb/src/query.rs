//! Known-error classification and a small cached query layer.
//!
//! [`QueryClient`] keeps the open state of one [`ModernIdb`] as an
//! [`AsyncOp`] and runs queries against it, reporting failures as data
//! instead of errors. Cached results are dropped whenever a read-write
//! transaction commits.

use crate::async_op::AsyncOp;
use crate::client::{ModernIdb, OpenRequestHandlers};
use crate::error::{ModernIdbError, Result};
use crate::events::Subscription;
use modernidb_engine::TransactionMode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Why a database cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InaccessibleDatabaseError {
    /// Another connection blocked the upgrade.
    #[error("database upgrade is blocked by another connection")]
    UpgradeBlocked,
    /// The connection was closed to let another client upgrade.
    #[error("connection was closed so another client could upgrade the database")]
    ClosedForUpgrade,
    /// The stored version is higher than the requested one.
    #[serde(rename = "DB_VERSION_HIGHER_THAN_REQUESTED")]
    #[error("{message}")]
    VersionHigherThanRequested {
        /// Engine message.
        message: String,
    },
    /// Anything else.
    #[serde(rename = "UNKNOWN_ERROR")]
    #[error("{message}")]
    Unknown {
        /// Error message.
        message: String,
    },
}

/// Classifies an open failure.
#[must_use]
pub fn to_known_error(error: &ModernIdbError) -> InaccessibleDatabaseError {
    match error {
        ModernIdbError::OpenRequestBlocked { .. } => InaccessibleDatabaseError::UpgradeBlocked,
        ModernIdbError::Engine(engine) if engine.name() == "VersionError" => {
            InaccessibleDatabaseError::VersionHigherThanRequested {
                message: engine.to_string(),
            }
        }
        other => InaccessibleDatabaseError::Unknown {
            message: other.to_string(),
        },
    }
}

/// A query that failed against an open database.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename = "QUERY_ERROR")]
#[error("query failed: {error}")]
pub struct QueryError {
    /// Error message.
    pub error: String,
}

/// Failure of a [`QueryOp`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabaseQueryOpFailure {
    /// The query itself failed.
    #[error(transparent)]
    Query(QueryError),
    /// The database could not be used.
    #[error(transparent)]
    Inaccessible(InaccessibleDatabaseError),
}

/// Result of [`QueryClient::query`].
pub type QueryOp<T> = AsyncOp<T, DatabaseQueryOpFailure>;

/// Open state of a [`QueryClient`]'s database.
pub type DatabaseOpenRequestOp = AsyncOp<ModernIdb, InaccessibleDatabaseError>;

type Cache = Mutex<HashMap<String, Box<dyn Any + Send>>>;

/// Runs cached queries against one database.
#[derive(Clone)]
pub struct QueryClient {
    db: ModernIdb,
    open: Arc<Mutex<AsyncOp<(), InaccessibleDatabaseError>>>,
    cache: Arc<Cache>,
    _invalidation: Arc<Subscription>,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("db", &self.db)
            .field("open", &*self.open.lock())
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl QueryClient {
    /// Opens `db` and starts tracking it. The connection closes itself when
    /// another client wants to upgrade, turning the open state into
    /// [`InaccessibleDatabaseError::ClosedForUpgrade`].
    ///
    /// Open failures are recorded in [`open_request`](Self::open_request),
    /// not returned.
    pub fn connect(db: ModernIdb) -> Self {
        let open = Arc::new(Mutex::new(AsyncOp::Pending));
        let cache: Arc<Cache> = Arc::default();

        let dropped = Arc::clone(&cache);
        let invalidation = db.subscribe(TransactionMode::ReadWrite, move |event| {
            let mut cache = dropped.lock();
            if !cache.is_empty() {
                trace!(stores = ?event.store_names, entries = cache.len(), "query cache invalidated");
                cache.clear();
            }
        });

        let state = Arc::clone(&open);
        let opened = db.open_with(OpenRequestHandlers::new().on_blocking(move |ctx| {
            *state.lock() = AsyncOp::Failure(InaccessibleDatabaseError::ClosedForUpgrade);
            ctx.db.close();
        }));
        let result = match opened {
            Ok(_) => AsyncOp::Success(()),
            Err(error) => {
                let known = to_known_error(&error);
                debug!(database = db.name(), %error, "query client could not open database");
                AsyncOp::Failure(known)
            }
        };
        *open.lock() = result;

        Self {
            db,
            open,
            cache,
            _invalidation: Arc::new(invalidation),
        }
    }

    /// The database.
    #[must_use]
    pub fn db(&self) -> &ModernIdb {
        &self.db
    }

    /// Current open state.
    #[must_use]
    pub fn open_request(&self) -> DatabaseOpenRequestOp {
        self.open.lock().clone().map(|()| self.db.clone())
    }

    /// Runs `f` against the open database.
    ///
    /// With a `cache_key`, a successful result is cached under it and
    /// returned by later calls until a read-write transaction commits.
    /// Failures are never cached.
    pub fn query<T, F>(&self, cache_key: Option<&str>, f: F) -> QueryOp<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&ModernIdb) -> Result<T>,
    {
        let state = self.open.lock().clone();
        match state {
            AsyncOp::Pending => return AsyncOp::Pending,
            AsyncOp::Failure(error) => {
                return AsyncOp::Failure(DatabaseQueryOpFailure::Inaccessible(error))
            }
            AsyncOp::Success(()) => {}
        }
        if let Some(hit) = cache_key.and_then(|key| self.cached::<T>(key)) {
            return hit;
        }
        let op = match f(&self.db) {
            Ok(value) => AsyncOp::Success(value),
            Err(error) => {
                return AsyncOp::Failure(DatabaseQueryOpFailure::Query(QueryError {
                    error: error.to_string(),
                }))
            }
        };
        if let Some(key) = cache_key {
            self.cache.lock().insert(key.to_owned(), Box::new(op.clone()));
        }
        op
    }

    /// The op cached under `key`, if it holds a `T`.
    #[must_use]
    pub fn cached<T: Clone + 'static>(&self, key: &str) -> Option<QueryOp<T>> {
        self.cache
            .lock()
            .get(key)?
            .downcast_ref::<QueryOp<T>>()
            .cloned()
    }

    /// Drops every cached result.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    /// Closes the database and drops the cache. The open state goes back to
    /// pending.
    pub fn disconnect(&self) {
        self.db.close();
        self.invalidate();
        *self.open.lock() = AsyncOp::Pending;
    }
}
