//! De-duplication of identical in-flight work.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

enum FlightState<V> {
    Running,
    Done(V),
    Abandoned,
}

struct Flight<V> {
    state: Mutex<FlightState<V>>,
    settled: Condvar,
}

impl<V> Flight<V> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FlightState::Running),
            settled: Condvar::new(),
        })
    }

    fn settle(&self, state: FlightState<V>) {
        *self.state.lock() = state;
        self.settled.notify_all();
    }
}

/// Runs work once per key among concurrent callers.
///
/// Entries are removed as soon as their flight settles, so a failed attempt
/// can be retried by the next caller.
///
/// ```
/// use modernidb::SingleFlight;
///
/// let flights: SingleFlight<&str, u32> = SingleFlight::new();
/// assert_eq!(flights.run("answer", || 42), 42);
///
/// let guard = flights.try_claim("open").unwrap();
/// assert!(flights.try_claim("open").is_none());
/// drop(guard);
/// assert!(flights.try_claim("open").is_some());
/// ```
pub struct SingleFlight<K, V> {
    flights: Mutex<HashMap<K, Arc<Flight<V>>>>,
}

impl<K, V> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.lock().len())
            .finish()
    }
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> SingleFlight<K, V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a flight for `key` is running.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Claims `key`, or returns `None` if a flight for it is running.
    pub fn try_claim(&self, key: K) -> Option<FlightGuard<'_, K, V>> {
        let mut flights = self.flights.lock();
        if flights.contains_key(&key) {
            return None;
        }
        let flight = Flight::new();
        flights.insert(key.clone(), Arc::clone(&flight));
        Some(FlightGuard {
            registry: self,
            key,
            flight,
            completed: false,
        })
    }

    /// Runs `f` for `key` unless another caller already is, in which case
    /// this call waits for that caller's result.
    ///
    /// If the running caller panics, one of the waiters runs `f` instead.
    pub fn run(&self, key: K, f: impl FnOnce() -> V) -> V {
        loop {
            let running = self.flights.lock().get(&key).cloned();
            match running {
                Some(flight) => {
                    let mut state = flight.state.lock();
                    loop {
                        match &*state {
                            FlightState::Running => flight.settled.wait(&mut state),
                            FlightState::Done(value) => return value.clone(),
                            FlightState::Abandoned => break,
                        }
                    }
                }
                None => {
                    if let Some(guard) = self.try_claim(key.clone()) {
                        let value = f();
                        guard.complete(value.clone());
                        return value;
                    }
                }
            }
        }
    }

    fn release(&self, key: &K, flight: &Arc<Flight<V>>) {
        let mut flights = self.flights.lock();
        if flights.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            flights.remove(key);
        }
    }
}

/// A claimed flight. Dropping it without [`complete`](Self::complete)
/// releases the key and lets waiters retry.
#[must_use = "dropping the guard releases the flight"]
pub struct FlightGuard<'a, K: Hash + Eq + Clone, V: Clone> {
    registry: &'a SingleFlight<K, V>,
    key: K,
    flight: Arc<Flight<V>>,
    completed: bool,
}

impl<K: Hash + Eq + Clone, V: Clone> fmt::Debug for FlightGuard<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightGuard")
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> FlightGuard<'_, K, V> {
    /// Hands `value` to every waiter and releases the key.
    pub fn complete(mut self, value: V) {
        self.completed = true;
        self.registry.release(&self.key, &self.flight);
        self.flight.settle(FlightState::Done(value));
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Drop for FlightGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.completed {
            self.registry.release(&self.key, &self.flight);
            self.flight.settle(FlightState::Abandoned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn sequential_runs_do_not_share_results() {
        let flights: SingleFlight<&str, usize> = SingleFlight::new();
        let calls = AtomicUsize::new(0);
        let run = || calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(flights.run("k", run), 0);
        assert_eq!(flights.run("k", run), 1);
        assert!(!flights.is_in_flight(&"k"));
    }

    #[test]
    fn concurrent_callers_share_one_run() {
        let flights = Arc::new(SingleFlight::<String, usize>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let claimed = flights.try_claim("key".to_string()).unwrap();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    flights.run("key".to_string(), || calls.fetch_add(1, Ordering::SeqCst) + 100)
                })
            })
            .collect();
        // the registry and the guard hold two references, each waiter one more
        while Arc::strong_count(&claimed.flight) < 6 {
            thread::yield_now();
        }
        claimed.complete(7);

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn abandoned_flights_can_be_retried() {
        let flights: SingleFlight<u8, Result<u8, String>> = SingleFlight::new();
        drop(flights.try_claim(1).unwrap());
        assert!(!flights.is_in_flight(&1));
        assert_eq!(flights.run(1, || Err("first".into())), Err("first".to_string()));
        assert_eq!(flights.run(1, || Ok(2)), Ok(2));
    }
}
