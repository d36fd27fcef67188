//! Transactions: request queues, snapshots and commit.
//!
//! A transaction is driven, never scheduled. Requests wait in a queue until
//! someone settles one of them or finishes the transaction; both run queued
//! requests in issuance order on the calling thread.

mod request;
mod working;

pub use request::Request;
pub(crate) use request::Slot;
pub(crate) use working::Working;

use crate::database::DatabaseCore;
use crate::error::{EngineError, EngineResult};
use crate::object_store::ObjectStoreHandle;
use crate::types::{Durability, TransactionMode, TransactionOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

type Listener = Box<dyn FnOnce(&TransactionOutcome) + Send>;

/// A request waiting in a transaction's queue.
pub(crate) struct QueuedRequest {
    run: Box<dyn FnOnce(&mut Working) -> EngineResult<()> + Send>,
    cancel: Box<dyn FnOnce(EngineError) + Send>,
}

impl QueuedRequest {
    pub(crate) fn new(
        run: impl FnOnce(&mut Working) -> EngineResult<()> + Send + 'static,
        cancel: impl FnOnce(EngineError) + Send + 'static,
    ) -> Self {
        Self {
            run: Box::new(run),
            cancel: Box::new(cancel),
        }
    }
}

enum Phase {
    Created,
    Active,
    Settled(TransactionOutcome),
}

struct TxState {
    phase: Phase,
    queue: VecDeque<QueuedRequest>,
    working: Option<Working>,
    listeners: Vec<Listener>,
}

/// Engine side of a transaction, shared by its handles and the database's
/// list of unsettled transactions.
pub(crate) struct TransactionCore {
    id: u64,
    db: Arc<DatabaseCore>,
    mode: TransactionMode,
    scope: Vec<String>,
    durability: Durability,
    upgrade_to: Option<u64>,
    state: Mutex<TxState>,
}

impl fmt::Debug for TransactionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCore")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TransactionCore {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Whether this transaction's scope shares a store with `scope`.
    /// Upgrades span the whole database.
    pub(crate) fn overlaps(&self, scope: &[String]) -> bool {
        self.upgrade_to.is_some() || scope.iter().any(|name| self.scope.contains(name))
    }

    fn is_settled(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Settled(_))
    }

    /// Takes the snapshot the transaction works on, first finishing the
    /// older transactions it has to wait for.
    fn ensure_started(&self) {
        if !matches!(self.state.lock().phase, Phase::Created) {
            return;
        }
        for blocker in self.db.blockers(self.id, self.mode, &self.scope) {
            trace!(txid = self.id, blocker = blocker.id, "finishing blocking transaction");
            blocker.finish();
        }

        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Created) {
            let stores = if self.upgrade_to.is_some() {
                self.db.snapshot_all()
            } else {
                self.db.snapshot(&self.scope)
            };
            state.working = Some(Working::new(self.mode, stores));
            state.phase = Phase::Active;
            trace!(txid = self.id, mode = %self.mode, "transaction started");
        }
    }

    fn push(&self, request: QueuedRequest) -> EngineResult<()> {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Settled(_)) {
            return Err(EngineError::transaction_inactive(format!(
                "transaction {} has already settled",
                self.id
            )));
        }
        state.queue.push_back(request);
        Ok(())
    }

    /// Runs the next queued request. Returns `false` when nothing was left to
    /// run.
    fn step(&self) -> bool {
        self.ensure_started();
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Settled(_)) {
            return false;
        }
        let Some(request) = state.queue.pop_front() else {
            return false;
        };
        let result = match state.working.as_mut() {
            Some(working) => (request.run)(working),
            None => Err(EngineError::invalid_state("transaction has no working state")),
        };
        if let Err(error) = result {
            let listeners = self.settle_locked(&mut state, TransactionOutcome::Aborted(error));
            drop(state);
            self.notify(listeners);
        }
        true
    }

    /// Runs every queued request.
    fn drain(&self) {
        while self.step() {}
    }

    /// Marks the transaction settled and cancels what is still queued.
    fn settle_locked(
        &self,
        state: &mut TxState,
        outcome: TransactionOutcome,
    ) -> Vec<(Listener, TransactionOutcome)> {
        if let TransactionOutcome::Aborted(error) = &outcome {
            debug!(txid = self.id, error = %error, "transaction aborted");
            let cancelled = EngineError::abort(format!("transaction {} was aborted", self.id));
            for request in state.queue.drain(..) {
                (request.cancel)(cancelled.clone());
            }
        }
        state.working = None;
        state.phase = Phase::Settled(outcome.clone());
        state
            .listeners
            .drain(..)
            .map(|listener| (listener, outcome.clone()))
            .collect()
    }

    fn notify(&self, listeners: Vec<(Listener, TransactionOutcome)>) {
        self.db.forget_transaction(self.id);
        for (listener, outcome) in listeners {
            listener(&outcome);
        }
    }

    /// Runs what is queued, then commits.
    pub(crate) fn finish(&self) -> TransactionOutcome {
        self.drain();

        let mut state = self.state.lock();
        if let Phase::Settled(outcome) = &state.phase {
            return outcome.clone();
        }
        let outcome = match state.working.take() {
            Some(working) => {
                let flush = match self.durability {
                    Durability::Strict => true,
                    Durability::Relaxed => false,
                    Durability::Default => self.db.sync_on_commit(),
                };
                match self.db.commit(self.id, working, self.upgrade_to, flush) {
                    Ok(()) => {
                        debug!(txid = self.id, mode = %self.mode, "transaction committed");
                        TransactionOutcome::Committed
                    }
                    Err(error) => TransactionOutcome::Aborted(error),
                }
            }
            // never started; nothing to write
            None => TransactionOutcome::Committed,
        };
        let listeners = self.settle_locked(&mut state, outcome.clone());
        drop(state);
        self.notify(listeners);
        outcome
    }

    pub(crate) fn abort(&self, error: EngineError) -> EngineResult<()> {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Settled(_)) {
            return Err(EngineError::invalid_state(format!(
                "transaction {} has already settled",
                self.id
            )));
        }
        let listeners = self.settle_locked(&mut state, TransactionOutcome::Aborted(error));
        drop(state);
        self.notify(listeners);
        Ok(())
    }

    fn on_settled(&self, listener: Listener) {
        let mut state = self.state.lock();
        let settled = match &state.phase {
            Phase::Settled(outcome) => Some(outcome.clone()),
            _ => None,
        };
        match settled {
            Some(outcome) => {
                drop(state);
                listener(&outcome);
            }
            None => state.listeners.push(listener),
        }
    }

    fn outcome(&self) -> Option<TransactionOutcome> {
        match &self.state.lock().phase {
            Phase::Settled(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Runs `f` against the working state once earlier requests have run.
    pub(crate) fn with_working<R>(
        &self,
        f: impl FnOnce(&mut Working) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.drain();
        let mut state = self.state.lock();
        match state.working.as_mut() {
            Some(working) => f(working),
            None => Err(EngineError::transaction_inactive(format!(
                "transaction {} has already settled",
                self.id
            ))),
        }
    }
}

/// Keeps a transaction alive; the last one to go finishes it, or aborts it
/// when dropped during a panic.
struct TransactionHandle {
    core: Arc<TransactionCore>,
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if self.core.is_settled() {
            return;
        }
        if std::thread::panicking() {
            trace!(txid = self.core.id, "last handle dropped while panicking, aborting");
            let error = EngineError::abort("panicked during the transaction");
            if let Err(settled) = self.core.abort(error) {
                trace!(txid = self.core.id, %settled, "transaction settled concurrently");
            }
        } else {
            trace!(txid = self.core.id, "last handle dropped, finishing");
            self.core.finish();
        }
    }
}

/// A unit of work over a fixed set of object stores.
///
/// Cloning shares the transaction. When the last clone, store handle,
/// request and cursor of an unsettled transaction are dropped, it commits
/// whatever it has queued, unless the thread is panicking.
#[derive(Clone)]
pub struct Transaction {
    handle: Arc<TransactionHandle>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.handle.core.id)
            .field("mode", &self.handle.core.mode)
            .field("scope", &self.handle.core.scope)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn create(
        db: Arc<DatabaseCore>,
        mode: TransactionMode,
        scope: Vec<String>,
        durability: Durability,
        upgrade_to: Option<u64>,
    ) -> Self {
        let core = Arc::new(TransactionCore {
            id: db.allocate_txid(),
            db: Arc::clone(&db),
            mode,
            scope,
            durability,
            upgrade_to,
            state: Mutex::new(TxState {
                phase: Phase::Created,
                queue: VecDeque::new(),
                working: None,
                listeners: Vec::new(),
            }),
        });
        db.register_transaction(Arc::clone(&core));
        trace!(txid = core.id, mode = %mode, "transaction created");
        Self {
            handle: Arc::new(TransactionHandle { core }),
        }
    }

    pub(crate) fn core(&self) -> &TransactionCore {
        &self.handle.core
    }

    /// Unique id within the database.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.handle.core.id
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.handle.core.mode
    }

    /// Requested durability.
    #[must_use]
    pub fn durability(&self) -> Durability {
        self.handle.core.durability
    }

    /// Name of the database the transaction belongs to.
    #[must_use]
    pub fn database_name(&self) -> &str {
        self.handle.core.db.name()
    }

    /// Stores the transaction may touch. For an upgrade this is every store
    /// currently in the database, including ones created by the upgrade.
    #[must_use]
    pub fn object_store_names(&self) -> Vec<String> {
        let core = &self.handle.core;
        if core.upgrade_to.is_some() {
            if let Ok(names) = core.with_working(|w| Ok(w.store_names())) {
                return names;
            }
        }
        core.scope.clone()
    }

    /// Handle to a store in the scope.
    ///
    /// # Errors
    ///
    /// `NotFoundError` when the store is not in scope,
    /// `TransactionInactiveError` once settled.
    pub fn object_store(&self, name: &str) -> EngineResult<ObjectStoreHandle> {
        let core = &self.handle.core;
        if core.upgrade_to.is_none() && !core.scope.iter().any(|s| s == name) {
            return Err(EngineError::not_found(format!(
                "store {name:?} is not in the transaction's scope"
            )));
        }
        let schema = core.with_working(|w| w.store(name).map(|s| s.schema().clone()))?;
        Ok(ObjectStoreHandle::new(self.clone(), schema))
    }

    /// Whether the transaction has committed or aborted.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.handle.core.is_settled()
    }

    /// How the transaction ended, if it has.
    #[must_use]
    pub fn outcome(&self) -> Option<TransactionOutcome> {
        self.handle.core.outcome()
    }

    /// Registers a listener for the transaction's end. It runs at most once,
    /// immediately if the transaction has already settled.
    pub fn on_settled(&self, listener: impl FnOnce(&TransactionOutcome) + Send + 'static) {
        self.handle.core.on_settled(Box::new(listener));
    }

    /// Runs every queued request and commits.
    ///
    /// # Errors
    ///
    /// The abort error if a request failed, the transaction was aborted or
    /// the journal write failed.
    pub fn commit(&self) -> EngineResult<()> {
        self.handle.core.finish().into_result()
    }

    /// Rolls back the transaction. Queued requests fail with `AbortError`.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` if the transaction has already settled.
    pub fn abort(&self) -> EngineResult<()> {
        self.handle
            .core
            .abort(EngineError::abort("transaction aborted by caller"))
    }

    /// Aborts with `error`. Fails with `InvalidStateError`, keeping the
    /// first outcome, when the transaction has already settled.
    pub(crate) fn abort_with(&self, error: EngineError) -> EngineResult<()> {
        self.handle.core.abort(error)
    }

    /// Queues a request whose result is computed from the working state.
    pub(crate) fn enqueue<T: Send + 'static>(
        &self,
        op: impl FnOnce(&mut Working) -> EngineResult<T> + Send + 'static,
    ) -> EngineResult<Request<T>> {
        let slot: Slot<T> = Slot::new();
        let done = slot.clone();
        let cancelled = slot.clone();
        self.handle.core.push(QueuedRequest::new(
            move |working| {
                let result = op(working);
                let failure = result.as_ref().err().cloned();
                done.fill(result);
                failure.map_or(Ok(()), Err)
            },
            move |error| cancelled.fill(Err(error)),
        ))?;
        Ok(Request::new(self.clone(), slot))
    }

    pub(crate) fn enqueue_raw(&self, request: QueuedRequest) -> EngineResult<()> {
        self.handle.core.push(request)
    }

    /// Runs queued requests until `done` holds or the queue is empty.
    pub(crate) fn drive_until(&self, done: impl Fn() -> bool) {
        while !done() && self.handle.core.step() {}
    }

    /// Fails with `TransactionInactiveError` once settled.
    pub(crate) fn ensure_active(&self) -> EngineResult<()> {
        if self.is_settled() {
            return Err(EngineError::transaction_inactive(format!(
                "transaction {} has already settled",
                self.id()
            )));
        }
        Ok(())
    }

    /// Fails with `ReadOnlyError` for read-only transactions.
    pub(crate) fn ensure_writable(&self) -> EngineResult<()> {
        if !self.mode().is_writable() {
            return Err(EngineError::read_only(format!(
                "transaction {} is read-only",
                self.id()
            )));
        }
        Ok(())
    }

    /// Fails with `InvalidStateError` outside an upgrade.
    pub(crate) fn ensure_upgrade(&self) -> EngineResult<()> {
        if self.mode() != TransactionMode::VersionChange {
            return Err(EngineError::invalid_state(
                "schema changes are only allowed during an upgrade",
            ));
        }
        self.ensure_active()
    }

    pub(crate) fn with_working<R>(
        &self,
        f: impl FnOnce(&mut Working) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.handle.core.with_working(f)
    }
}
