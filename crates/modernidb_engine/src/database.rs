//! Shared state of one named database.

use crate::connection::ConnectionCore;
use crate::error::{EngineError, EngineResult};
use crate::journal::{Journal, JournalOp, JournalRecord};
use crate::schema::StoreSchema;
use crate::store::StoreState;
use crate::transaction::{TransactionCore, Working};
use crate::types::TransactionMode;
use modernidb_storage::StorageBackend;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Committed schema and records of a database, plus the connections and
/// transactions working on it.
#[derive(Debug)]
pub(crate) struct DatabaseCore {
    name: String,
    sync_on_commit: bool,
    next_txid: AtomicU64,
    state: Mutex<DbState>,
}

#[derive(Debug)]
pub(crate) struct DbState {
    pub(crate) version: u64,
    pub(crate) stores: BTreeMap<String, Arc<StoreState>>,
    journal: Option<Journal>,
    connections: Vec<Weak<ConnectionCore>>,
    transactions: Vec<Arc<TransactionCore>>,
    pub(crate) upgrading: bool,
}

impl DatabaseCore {
    /// Loads a database from its journal.
    pub(crate) fn load(
        name: &str,
        backend: Box<dyn StorageBackend>,
        sync_on_commit: bool,
    ) -> EngineResult<Arc<Self>> {
        let (journal, records) = Journal::open(backend)?;
        let mut version = 0;
        let mut stores = BTreeMap::new();
        let mut last_txid = 0;
        for record in records {
            last_txid = last_txid.max(record.txid);
            for op in record.ops {
                replay(op, &mut version, &mut stores)?;
            }
        }
        debug!(database = name, version, stores = stores.len(), "database loaded");

        Ok(Arc::new(Self {
            name: name.to_owned(),
            sync_on_commit,
            next_txid: AtomicU64::new(last_txid + 1),
            state: Mutex::new(DbState {
                version,
                stores: stores.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
                journal: Some(journal),
                connections: Vec::new(),
                transactions: Vec::new(),
                upgrading: false,
            }),
        }))
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn sync_on_commit(&self) -> bool {
        self.sync_on_commit
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DbState> {
        self.state.lock()
    }

    pub(crate) fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub(crate) fn store_names(&self) -> Vec<String> {
        self.state.lock().stores.keys().cloned().collect()
    }

    pub(crate) fn store_schema(&self, name: &str) -> Option<StoreSchema> {
        self.state.lock().stores.get(name).map(|s| s.schema().clone())
    }

    pub(crate) fn store_index_names(&self, name: &str) -> Option<Vec<String>> {
        self.state.lock().stores.get(name).map(|s| s.index_names())
    }

    pub(crate) fn allocate_txid(&self) -> u64 {
        self.next_txid.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register_connection(&self, connection: &Arc<ConnectionCore>) {
        let mut state = self.state.lock();
        state.connections.retain(|c| c.strong_count() > 0);
        state.connections.push(Arc::downgrade(connection));
    }

    /// Connections that are still open.
    pub(crate) fn open_connections(&self) -> Vec<Arc<ConnectionCore>> {
        self.state
            .lock()
            .connections
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| !c.is_closed())
            .collect()
    }

    pub(crate) fn register_transaction(&self, transaction: Arc<TransactionCore>) {
        self.state.lock().transactions.push(transaction);
    }

    pub(crate) fn forget_transaction(&self, txid: u64) {
        self.state.lock().transactions.retain(|t| t.id() != txid);
    }

    /// Every unsettled transaction, oldest first.
    pub(crate) fn unsettled_transactions(&self) -> Vec<Arc<TransactionCore>> {
        self.state.lock().transactions.clone()
    }

    /// Older unsettled transactions that must finish before `txid` starts.
    pub(crate) fn blockers(
        &self,
        txid: u64,
        mode: TransactionMode,
        scope: &[String],
    ) -> Vec<Arc<TransactionCore>> {
        self.state
            .lock()
            .transactions
            .iter()
            .filter(|t| t.id() < txid)
            .filter(|t| mode.is_writable() || t.mode().is_writable())
            .filter(|t| t.overlaps(scope))
            .cloned()
            .collect()
    }

    /// Committed stores named in `scope`.
    pub(crate) fn snapshot(&self, scope: &[String]) -> BTreeMap<String, Arc<StoreState>> {
        let state = self.state.lock();
        scope
            .iter()
            .filter_map(|name| state.stores.get(name).map(|s| (name.clone(), Arc::clone(s))))
            .collect()
    }

    /// Every committed store.
    pub(crate) fn snapshot_all(&self) -> BTreeMap<String, Arc<StoreState>> {
        self.state.lock().stores.clone()
    }

    /// Journals and publishes a transaction's changes.
    ///
    /// The record is appended before the committed state changes, so a
    /// failed append leaves the database as it was.
    pub(crate) fn commit(
        &self,
        txid: u64,
        working: Working,
        upgrade_to: Option<u64>,
        flush: bool,
    ) -> EngineResult<()> {
        let Working {
            mut stores,
            dirty,
            mut ops,
            ..
        } = working;
        if let Some(version) = upgrade_to {
            ops.insert(0, JournalOp::SetVersion { version });
        }

        let mut state = self.state.lock();
        if !ops.is_empty() {
            let journal = state.journal.as_mut().ok_or_else(|| {
                EngineError::invalid_state(format!("database {:?} was deleted", self.name))
            })?;
            let offset = journal.append(&JournalRecord { txid, ops }, flush)?;
            trace!(database = %self.name, txid, offset, "journal record appended");
        }

        match upgrade_to {
            Some(version) => {
                state.version = version;
                state.stores = stores;
            }
            None => {
                for name in dirty {
                    if let Some(store) = stores.remove(&name) {
                        state.stores.insert(name, store);
                    }
                }
            }
        }
        Ok(())
    }

    /// Detaches the journal so nothing more is written for this database.
    pub(crate) fn mark_deleted(&self) {
        let mut state = self.state.lock();
        state.journal = None;
        state.stores.clear();
        state.version = 0;
    }
}

fn missing_store(name: &str) -> EngineError {
    EngineError::journal_corruption(format!("journal references unknown store {name:?}"))
}

/// Applies one journaled operation during load.
fn replay(
    op: JournalOp,
    version: &mut u64,
    stores: &mut BTreeMap<String, StoreState>,
) -> EngineResult<()> {
    match op {
        JournalOp::SetVersion { version: v } => *version = v,
        JournalOp::CreateStore { schema } => {
            stores.insert(schema.name.clone(), StoreState::new(schema));
        }
        JournalOp::DeleteStore { name } => {
            stores.remove(&name);
        }
        JournalOp::CreateIndex { store, schema } => {
            stores
                .get_mut(&store)
                .ok_or_else(|| missing_store(&store))?
                .create_index(schema)?;
        }
        JournalOp::DeleteIndex { store, name } => {
            stores
                .get_mut(&store)
                .ok_or_else(|| missing_store(&store))?
                .delete_index(&name)?;
        }
        JournalOp::Put { store, key, value } => {
            stores
                .get_mut(&store)
                .ok_or_else(|| missing_store(&store))?
                .insert_record(key, value, false)?;
        }
        JournalOp::Delete { store, range } => {
            stores
                .get_mut(&store)
                .ok_or_else(|| missing_store(&store))?
                .delete_range(&range);
        }
        JournalOp::Clear { store } => {
            stores
                .get_mut(&store)
                .ok_or_else(|| missing_store(&store))?
                .clear();
        }
    }
    Ok(())
}
