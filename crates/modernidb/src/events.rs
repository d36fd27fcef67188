//! Transaction notifications.
//!
//! Every committed transaction opened through [`ModernIdb`](crate::ModernIdb)
//! (unless opened with `no_emit`) publishes a [`TransactionEvent`] to the
//! subscribers of its mode. Caching layers use this to refresh or invalidate.

use modernidb_engine::TransactionMode;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Published when a transaction commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    /// Mode of the committed transaction; also the event type.
    pub mode: TransactionMode,
    /// Stores the transaction was opened over.
    pub store_names: Vec<String>,
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type Listener = Arc<dyn Fn(&TransactionEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    listeners: Mutex<Vec<(TransactionMode, ListenerId, Listener)>>,
    channels: Mutex<Vec<(TransactionMode, Sender<TransactionEvent>)>>,
}

/// Publish/subscribe hub keyed by transaction mode.
///
/// Clones share the same subscribers.
#[derive(Clone, Default)]
pub struct TransactionEventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for TransactionEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionEventBus")
            .field("listeners", &self.inner.listeners.lock().len())
            .field("channels", &self.inner.channels.lock().len())
            .finish()
    }
}

impl TransactionEventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to `mode`. Dropping the returned handle
    /// unsubscribes.
    pub fn subscribe(
        &self,
        mode: TransactionMode,
        listener: impl Fn(&TransactionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.add_event_listener(mode, listener);
        Subscription {
            bus: Arc::downgrade(&self.inner),
            mode,
            id,
        }
    }

    /// Subscribes `listener` to `mode` until
    /// [`remove_event_listener`](Self::remove_event_listener) is called.
    pub fn add_event_listener(
        &self,
        mode: TransactionMode,
        listener: impl Fn(&TransactionEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId::next();
        self.inner
            .listeners
            .lock()
            .push((mode, id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns whether it was registered for `mode`.
    pub fn remove_event_listener(&self, mode: TransactionMode, id: ListenerId) -> bool {
        remove(&self.inner, mode, id)
    }

    /// Returns a receiver of `mode` events. Dropped receivers are pruned on
    /// the next emit.
    #[must_use]
    pub fn subscribe_channel(&self, mode: TransactionMode) -> Receiver<TransactionEvent> {
        let (sender, receiver) = mpsc::channel();
        self.inner.channels.lock().push((mode, sender));
        receiver
    }

    /// Number of listeners and channels subscribed to `mode`.
    #[must_use]
    pub fn subscriber_count(&self, mode: TransactionMode) -> usize {
        let listeners = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|(m, ..)| *m == mode)
            .count();
        let channels = self
            .inner
            .channels
            .lock()
            .iter()
            .filter(|(m, _)| *m == mode)
            .count();
        listeners + channels
    }

    /// Delivers `event` to the subscribers of its mode, in subscription
    /// order. Listeners run without any bus lock held.
    pub(crate) fn emit(&self, event: &TransactionEvent) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .filter(|(mode, ..)| *mode == event.mode)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect();
        trace!(mode = %event.mode, stores = ?event.store_names, listeners = listeners.len(), "emitting transaction event");
        for listener in listeners {
            listener(event);
        }
        self.inner
            .channels
            .lock()
            .retain(|(mode, sender)| *mode != event.mode || sender.send(event.clone()).is_ok());
    }
}

fn remove(inner: &BusInner, mode: TransactionMode, id: ListenerId) -> bool {
    let mut listeners = inner.listeners.lock();
    let before = listeners.len();
    listeners.retain(|(m, registered, _)| !(*m == mode && *registered == id));
    listeners.len() != before
}

/// Keeps a listener subscribed; dropping it unsubscribes.
#[derive(Debug)]
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    bus: Weak<BusInner>,
    mode: TransactionMode,
    id: ListenerId,
}

impl Subscription {
    /// The underlying listener id.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            remove(&inner, self.mode, self.id);
        }
    }
}
