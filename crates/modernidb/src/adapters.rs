//! Adapters from engine requests to results, completions and cursor streams.

use crate::error::Result;
use crate::events::{TransactionEvent, TransactionEventBus};
use modernidb_engine::{
    self as engine, CursorDirection, Request, TransactionMode, TransactionOutcome,
};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Settles a request and returns its result.
///
/// # Errors
///
/// The engine error the request failed with, or `AbortError` when its
/// transaction aborted first.
pub fn request_to_result<T>(request: Request<T>) -> Result<T> {
    Ok(request.into_result()?)
}

/// Resolves when a transaction commits and fails when it aborts.
#[derive(Debug)]
#[must_use = "a completion does nothing unless waited on or aborted"]
pub struct Completion {
    transaction: engine::Transaction,
    mode: TransactionMode,
    store_names: Vec<String>,
}

/// Payload of a successful [`Completion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionCompleteEvent {
    /// Mode of the committed transaction.
    pub mode: TransactionMode,
    /// Stores the transaction was opened over.
    pub store_names: Vec<String>,
}

impl Completion {
    /// Wraps `transaction`. Unless `bus` is `None`, a [`TransactionEvent`]
    /// is emitted on it when the transaction commits, whoever commits it.
    pub(crate) fn new(
        transaction: engine::Transaction,
        store_names: Vec<String>,
        bus: Option<TransactionEventBus>,
    ) -> Self {
        let mode = transaction.mode();
        if let Some(bus) = bus {
            let event = TransactionEvent {
                mode,
                store_names: store_names.clone(),
            };
            transaction.on_settled(move |outcome| {
                if matches!(outcome, TransactionOutcome::Committed) {
                    bus.emit(&event);
                }
            });
        }
        Self {
            transaction,
            mode,
            store_names,
        }
    }

    /// Whether the transaction has committed or aborted.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.transaction.is_settled()
    }

    /// Runs what is left of the transaction and commits it.
    ///
    /// # Errors
    ///
    /// The error the transaction aborted with.
    pub fn wait(self) -> Result<TransactionCompleteEvent> {
        self.transaction.commit()?;
        trace!(txid = self.transaction.id(), "transaction complete");
        Ok(TransactionCompleteEvent {
            mode: self.mode,
            store_names: self.store_names,
        })
    }

    /// Aborts the transaction.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` if the transaction has already settled.
    pub fn abort(self) -> Result<()> {
        Ok(self.transaction.abort()?)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Cursor handles a [`CursorStream`] can yield.
pub trait CursorItem: sealed::Sealed + Sized {
    #[doc(hidden)]
    fn from_engine(cursor: engine::Cursor, moved: MoveFlag) -> Result<Self>;
}

/// Set when the consumer moved the cursor itself, so the stream must not
/// continue it again.
#[derive(Debug, Clone, Default)]
#[doc(hidden)]
pub struct MoveFlag(Arc<AtomicBool>);

impl MoveFlag {
    pub(crate) fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// A lazy, single-pass sequence of cursor positions.
///
/// Each call to [`next`](Iterator::next) continues the cursor (unless the
/// previously yielded handle was already advanced or continued), settles the
/// move and yields the new position. Because `next` takes `&mut self`, a
/// second move cannot be issued while one is outstanding. Dropping the
/// stream early is fine; there is nothing to close.
#[derive(Debug)]
#[must_use = "cursor streams do nothing unless iterated"]
pub struct CursorStream<C> {
    request: engine::CursorRequest,
    current: Option<engine::Cursor>,
    moved: MoveFlag,
    done: bool,
    item: PhantomData<fn() -> C>,
}

impl<C: CursorItem> CursorStream<C> {
    pub(crate) fn new(request: engine::CursorRequest) -> Self {
        Self {
            request,
            current: None,
            moved: MoveFlag::default(),
            done: false,
            item: PhantomData,
        }
    }

    /// Direction the cursor was opened with.
    #[must_use]
    pub fn direction(&self) -> CursorDirection {
        self.request.direction()
    }
}

impl<C: CursorItem> Iterator for CursorStream<C> {
    type Item = Result<C>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(cursor) = self.current.take() {
            if !self.moved.take() {
                if let Err(error) = cursor.continue_(None) {
                    self.done = true;
                    return Some(Err(error.into()));
                }
            }
        }
        match self.request.settle().result() {
            Ok(Some(cursor)) => {
                self.current = Some(cursor.clone());
                Some(C::from_engine(cursor, self.moved.clone()))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error.into()))
            }
        }
    }
}

pub(crate) use sealed::Sealed;
