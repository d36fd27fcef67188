//! Single-result requests.

use crate::error::{EngineError, EngineResult};
use crate::transaction::Transaction;
use crate::types::ReadyState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

enum SlotState<T> {
    Pending,
    Ready(EngineResult<T>),
    Taken,
}

/// Where a queued request leaves its result.
pub(crate) struct Slot<T> {
    inner: Arc<Mutex<SlotState<T>>>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotState::Pending)),
        }
    }

    pub(crate) fn fill(&self, result: EngineResult<T>) {
        let mut state = self.inner.lock();
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Ready(result);
        }
    }

    fn is_pending(&self) -> bool {
        matches!(*self.inner.lock(), SlotState::Pending)
    }

    fn take(&self) -> EngineResult<T> {
        match std::mem::replace(&mut *self.inner.lock(), SlotState::Taken) {
            SlotState::Ready(result) => result,
            SlotState::Pending => Err(EngineError::invalid_state("request has not completed")),
            SlotState::Taken => Err(EngineError::invalid_state("request result already taken")),
        }
    }
}

/// A queued operation and, once it has run, its result.
///
/// Holding a request keeps its transaction alive.
pub struct Request<T> {
    transaction: Transaction,
    slot: Slot<T>,
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("transaction", &self.transaction.id())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl<T> Request<T> {
    pub(crate) fn new(transaction: Transaction, slot: Slot<T>) -> Self {
        Self { transaction, slot }
    }

    /// `Done` once the request has run or was cancelled.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        if self.slot.is_pending() {
            ReadyState::Pending
        } else {
            ReadyState::Done
        }
    }

    /// The transaction the request was issued against.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Runs the transaction's queue up to and including this request.
    pub fn settle(&self) -> &Self {
        self.transaction.drive_until(|| !self.slot.is_pending());
        self
    }

    /// Settles the request and returns its result.
    ///
    /// # Errors
    ///
    /// The error the operation failed with, or `AbortError` when the
    /// transaction aborted before it ran.
    pub fn into_result(self) -> EngineResult<T> {
        self.settle();
        self.slot.take()
    }
}

impl<T: Clone> Request<T> {
    /// The result, if the request is done, without driving the transaction.
    #[must_use]
    pub fn outcome(&self) -> Option<EngineResult<T>> {
        match &*self.slot.inner.lock() {
            SlotState::Ready(result) => Some(result.clone()),
            _ => None,
        }
    }
}
