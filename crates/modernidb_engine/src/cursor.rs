//! Cursors over stores and indexes.
//!
//! A cursor has one request that is re-armed by every advance. While it is
//! pending the cursor refuses to move again; once it is done it holds either
//! a position or nothing (exhausted).

use crate::error::{EngineError, EngineResult};
use crate::object_store::{enqueue_delete, enqueue_put};
use crate::schema::StoreSchema;
use crate::store::StoreState;
use crate::transaction::{QueuedRequest, Request, Transaction, Working};
use crate::types::ReadyState;
use modernidb_codec::{CursorDirection, Key, KeyRange};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, Weak};

/// What a cursor iterates over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorSource {
    /// Records of a store, by primary key.
    Store {
        /// Store name.
        name: String,
    },
    /// Entries of an index, by index key then primary key.
    Index {
        /// Name of the indexed store.
        store: String,
        /// Index name.
        name: String,
    },
}

impl CursorSource {
    /// Name of the store the records live in.
    #[must_use]
    pub fn store_name(&self) -> &str {
        match self {
            Self::Store { name } | Self::Index { store: name, .. } => name,
        }
    }
}

/// Where the next position is looked for, relative to the iteration
/// direction.
#[derive(Debug, Clone)]
enum Seek {
    Start,
    After { key: Key, primary_key: Key },
    ToKey(Key),
    ToPair { key: Key, primary_key: Key },
    Advance(u32),
}

/// A position (key, primary key) and the record there.
type Located = ((Key, Key), Option<Value>);

#[derive(Debug)]
struct CursorState {
    pending: bool,
    error: Option<EngineError>,
    position: Option<(Key, Key)>,
    value: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct CursorCore {
    transaction: Transaction,
    source: CursorSource,
    store: StoreSchema,
    range: Option<KeyRange>,
    direction: CursorDirection,
    key_only: bool,
    state: Mutex<CursorState>,
}

/// The cursor's request: settles with a [`Cursor`] at the next position or
/// with `None` once the range is exhausted.
#[derive(Debug, Clone)]
pub struct CursorRequest {
    core: Arc<CursorCore>,
}

/// A cursor positioned on one entry.
///
/// The position is a snapshot; after the cursor moves, `update` and `delete`
/// on an older snapshot fail.
#[derive(Debug, Clone)]
pub struct Cursor {
    core: Arc<CursorCore>,
    key: Key,
    primary_key: Key,
    value: Option<Value>,
}

impl CursorRequest {
    pub(crate) fn open(
        transaction: Transaction,
        source: CursorSource,
        store: StoreSchema,
        range: Option<KeyRange>,
        direction: CursorDirection,
        key_only: bool,
    ) -> EngineResult<Self> {
        transaction.ensure_active()?;
        let core = Arc::new(CursorCore {
            transaction,
            source,
            store,
            range,
            direction,
            key_only,
            state: Mutex::new(CursorState {
                pending: true,
                error: None,
                position: None,
                value: None,
            }),
        });
        core.schedule(Seek::Start)?;
        Ok(Self { core })
    }

    /// `Pending` while the cursor is moving.
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        if self.core.state.lock().pending {
            ReadyState::Pending
        } else {
            ReadyState::Done
        }
    }

    /// Drives the transaction until the cursor has moved.
    pub fn settle(&self) -> &Self {
        self.core
            .transaction
            .drive_until(|| !self.core.state.lock().pending);
        self
    }

    /// Settles and returns the cursor, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// The error that aborted the transaction before the cursor moved.
    pub fn result(&self) -> EngineResult<Option<Cursor>> {
        self.settle();
        let state = self.core.state.lock();
        if let Some(error) = &state.error {
            return Err(error.clone());
        }
        if state.pending {
            return Err(EngineError::invalid_state("cursor request has not completed"));
        }
        Ok(state.position.clone().map(|(key, primary_key)| Cursor {
            core: Arc::clone(&self.core),
            key,
            primary_key,
            value: state.value.clone(),
        }))
    }

    /// Direction fixed when the cursor was opened.
    #[must_use]
    pub fn direction(&self) -> CursorDirection {
        self.core.direction
    }

    /// What the cursor iterates over.
    #[must_use]
    pub fn source(&self) -> &CursorSource {
        &self.core.source
    }

    /// The owning transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.core.transaction
    }
}

impl Cursor {
    /// Key at the current position: primary key for store cursors, index
    /// key for index cursors.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Primary key of the current record.
    #[must_use]
    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    /// Current record; `None` for key cursors.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Iteration direction.
    #[must_use]
    pub fn direction(&self) -> CursorDirection {
        self.core.direction
    }

    /// What the cursor iterates over.
    #[must_use]
    pub fn source(&self) -> &CursorSource {
        &self.core.source
    }

    /// The request this cursor re-arms when it moves.
    #[must_use]
    pub fn request(&self) -> CursorRequest {
        CursorRequest {
            core: Arc::clone(&self.core),
        }
    }

    /// Moves `count` entries on.
    ///
    /// # Errors
    ///
    /// `InvalidAccessError` for zero, `InvalidStateError` while the cursor is
    /// moving or exhausted, `TransactionInactiveError` once settled.
    pub fn advance(&self, count: u32) -> EngineResult<CursorRequest> {
        if count == 0 {
            return Err(EngineError::invalid_access("advance count must be positive"));
        }
        self.core.move_to(|_| Ok(Seek::Advance(count)))?;
        Ok(self.request())
    }

    /// Moves to the next entry, or to the first entry at or past `key`.
    ///
    /// # Errors
    ///
    /// `DataError` if `key` is not beyond the current position,
    /// `InvalidStateError` while moving or exhausted.
    pub fn continue_(&self, key: Option<Key>) -> EngineResult<CursorRequest> {
        let forward = self.core.direction.is_forward();
        self.core.move_to(|(current, primary_key)| match key {
            None => Ok(Seek::After {
                key: current.clone(),
                primary_key: primary_key.clone(),
            }),
            Some(target) => {
                if !target.is_valid() {
                    return Err(EngineError::data(format!("{target} is not a valid key")));
                }
                if !beyond(forward, target.cmp(current)) {
                    return Err(EngineError::data(format!(
                        "{target} is not beyond the cursor's position {current}"
                    )));
                }
                Ok(Seek::ToKey(target))
            }
        })?;
        Ok(self.request())
    }

    /// Moves to the first index entry at or past (`key`, `primary_key`).
    /// Index cursors with non-unique directions only.
    ///
    /// # Errors
    ///
    /// `InvalidAccessError` on store cursors and unique directions,
    /// `DataError` if the pair is not beyond the current position.
    pub fn continue_primary_key(&self, key: Key, primary_key: Key) -> EngineResult<CursorRequest> {
        if matches!(self.core.source, CursorSource::Store { .. }) || self.core.direction.is_unique()
        {
            return Err(EngineError::invalid_access(
                "continue_primary_key needs an index cursor with a non-unique direction",
            ));
        }
        if !key.is_valid() || !primary_key.is_valid() {
            return Err(EngineError::data("continue_primary_key needs valid keys"));
        }
        let forward = self.core.direction.is_forward();
        self.core.move_to(|(current, current_pk)| {
            let order = key.cmp(current).then_with(|| primary_key.cmp(current_pk));
            if !beyond(forward, order) {
                return Err(EngineError::data(format!(
                    "({key}, {primary_key}) is not beyond the cursor's position"
                )));
            }
            Ok(Seek::ToPair {
                key: key.clone(),
                primary_key: primary_key.clone(),
            })
        })?;
        Ok(self.request())
    }

    /// Replaces the current record. In-line keys must not change.
    ///
    /// # Errors
    ///
    /// `InvalidStateError` for key cursors, stale positions or a moving
    /// cursor; `ReadOnlyError` in read-only transactions; `DataError` when
    /// the in-line key changes.
    pub fn update(&self, value: Value) -> EngineResult<Request<Key>> {
        self.check_writable_position()?;
        let key = match &self.core.store.key_path {
            Some(path) => {
                let found = path.extract_key(&value);
                if found.as_ref() != Some(&self.primary_key) {
                    return Err(EngineError::data(
                        "the update changes the record's in-line key",
                    ));
                }
                None
            }
            None => Some(self.primary_key.clone()),
        };
        enqueue_put(&self.core.transaction, &self.core.store, value, key, false)
    }

    /// Deletes the current record.
    ///
    /// # Errors
    ///
    /// As for [`Cursor::update`].
    pub fn delete(&self) -> EngineResult<Request<()>> {
        self.check_writable_position()?;
        enqueue_delete(
            &self.core.transaction,
            &self.core.store.name,
            KeyRange::only(self.primary_key.clone()),
        )
    }

    fn check_writable_position(&self) -> EngineResult<()> {
        self.core.transaction.ensure_active()?;
        self.core.transaction.ensure_writable()?;
        if self.core.key_only {
            return Err(EngineError::invalid_state("key cursors cannot change records"));
        }
        let state = self.core.state.lock();
        if state.pending {
            return Err(EngineError::invalid_state("the cursor is moving"));
        }
        if state.position.as_ref() != Some(&(self.key.clone(), self.primary_key.clone())) {
            return Err(EngineError::invalid_state("the cursor has moved on"));
        }
        Ok(())
    }
}

/// Whether a target that compares to the current position as `order` lies
/// strictly ahead in the iteration direction.
fn beyond(forward: bool, order: Ordering) -> bool {
    if forward {
        order == Ordering::Greater
    } else {
        order == Ordering::Less
    }
}

impl CursorCore {
    /// Validates a move against the current position and queues it.
    fn move_to(
        self: &Arc<Self>,
        seek: impl FnOnce(&(Key, Key)) -> EngineResult<Seek>,
    ) -> EngineResult<()> {
        self.transaction.ensure_active()?;
        let seek = {
            let mut state = self.state.lock();
            if state.pending {
                return Err(EngineError::invalid_state("the cursor is already moving"));
            }
            let position = state
                .position
                .as_ref()
                .ok_or_else(|| EngineError::invalid_state("the cursor is exhausted"))?;
            let seek = seek(position)?;
            state.pending = true;
            seek
        };
        if let Err(error) = self.schedule(seek) {
            self.state.lock().pending = false;
            return Err(error);
        }
        Ok(())
    }

    fn schedule(self: &Arc<Self>, seek: Seek) -> EngineResult<()> {
        let run = Arc::downgrade(self);
        let cancel = Weak::clone(&run);
        self.transaction.enqueue_raw(QueuedRequest::new(
            move |working| match run.upgrade() {
                Some(core) => core.step(working, seek),
                None => Ok(()),
            },
            move |error| {
                if let Some(core) = cancel.upgrade() {
                    let mut state = core.state.lock();
                    state.pending = false;
                    state.error = Some(error);
                }
            },
        ))
    }

    /// Computes the next position from the working state.
    fn step(&self, working: &mut Working, seek: Seek) -> EngineResult<()> {
        let outcome = self.locate(working, seek);
        let mut state = self.state.lock();
        state.pending = false;
        match outcome {
            Ok(Some((position, value))) => {
                state.position = Some(position);
                state.value = value;
                Ok(())
            }
            Ok(None) => {
                state.position = None;
                state.value = None;
                Ok(())
            }
            Err(error) => {
                state.error = Some(error.clone());
                Err(error)
            }
        }
    }

    fn locate(&self, working: &Working, seek: Seek) -> EngineResult<Option<Located>> {
        let store = working.store(self.source.store_name())?;
        let entries = match &self.source {
            CursorSource::Store { .. } => Entries::Store(store.records()),
            CursorSource::Index { name, .. } => Entries::Index(store.index(name)?.entries()),
        };

        let found = match seek {
            Seek::Advance(count) => {
                let mut position = self.state.lock().position.clone();
                for _ in 0..count {
                    position = match position {
                        Some((key, primary_key)) => self.find(
                            &entries,
                            &Seek::After { key, primary_key },
                        ),
                        None => break,
                    };
                }
                position
            }
            other => self.find(&entries, &other),
        };

        Ok(found.map(|(key, primary_key)| {
            let value = if self.key_only {
                None
            } else {
                load_value(store, &primary_key)
            };
            ((key, primary_key), value)
        }))
    }

    /// First entry matching `seek` inside the cursor's range.
    fn find(&self, entries: &Entries<'_>, seek: &Seek) -> Option<(Key, Key)> {
        let forward = self.direction.is_forward();
        let unique = self.direction.is_unique() || matches!(entries, Entries::Store(_));
        let (range_lower, range_upper) = self
            .range
            .as_ref()
            .map_or((Bound::Unbounded, Bound::Unbounded), KeyRange::bounds);

        // bound on the key from the seek, plus a primary key filter that
        // only applies to entries sharing the seek's key
        let (seek_bound, pk_filter): (Bound<&Key>, Option<(&Key, &Key, bool)>) = match seek {
            Seek::Start | Seek::Advance(_) => (Bound::Unbounded, None),
            Seek::After { key, .. } if unique => (Bound::Excluded(key), None),
            Seek::After { key, primary_key } => {
                (Bound::Included(key), Some((key, primary_key, false)))
            }
            Seek::ToKey(key) => (Bound::Included(key), None),
            Seek::ToPair { key, primary_key } => {
                (Bound::Included(key), Some((key, primary_key, true)))
            }
        };

        let (lower, upper) = if forward {
            (tighter(range_lower, seek_bound, Ordering::Greater), range_upper)
        } else {
            (range_lower, tighter(range_upper, seek_bound, Ordering::Less))
        };
        if is_empty(lower, upper) {
            return None;
        }

        let accept = |key: &Key, primary_key: &Key| match pk_filter {
            Some((at, pivot, inclusive)) if key == at => {
                let order = primary_key.cmp(pivot);
                (inclusive && order == Ordering::Equal) || beyond(forward, order)
            }
            _ => true,
        };
        entries.find((lower, upper), forward, unique, accept)
    }
}

fn load_value(store: &StoreState, primary_key: &Key) -> Option<Value> {
    store.records().get(primary_key).cloned()
}

fn bound_parts(bound: Bound<&Key>) -> Option<(&Key, bool)> {
    match bound {
        Bound::Included(key) => Some((key, false)),
        Bound::Excluded(key) => Some((key, true)),
        Bound::Unbounded => None,
    }
}

/// The stricter of two bounds on the same side. `wins` is the ordering under
/// which `b`'s key is the stricter one (`Greater` for lower bounds).
fn tighter<'a>(a: Bound<&'a Key>, b: Bound<&'a Key>, wins: Ordering) -> Bound<&'a Key> {
    match (bound_parts(a), bound_parts(b)) {
        (None, _) => b,
        (_, None) => a,
        (Some((key_a, a_open)), Some((key_b, _))) => match key_b.cmp(key_a) {
            Ordering::Equal if a_open => a,
            Ordering::Equal => b,
            order if order == wins => b,
            _ => a,
        },
    }
}

/// Whether no key can lie between the bounds. `BTreeMap::range` panics on
/// inverted bounds, so they are rejected up front.
fn is_empty(lower: Bound<&Key>, upper: Bound<&Key>) -> bool {
    match (bound_parts(lower), bound_parts(upper)) {
        (Some((low, low_open)), Some((high, high_open))) => match low.cmp(high) {
            Ordering::Greater => true,
            Ordering::Equal => low_open || high_open,
            Ordering::Less => false,
        },
        _ => false,
    }
}

enum Entries<'a> {
    Store(&'a BTreeMap<Key, Value>),
    Index(&'a BTreeMap<Key, BTreeSet<Key>>),
}

impl Entries<'_> {
    fn find(
        &self,
        bounds: (Bound<&Key>, Bound<&Key>),
        forward: bool,
        unique: bool,
        accept: impl Fn(&Key, &Key) -> bool,
    ) -> Option<(Key, Key)> {
        match self {
            Self::Store(records) => {
                let range = records.range::<Key, _>(bounds);
                let mut keys: Box<dyn Iterator<Item = &Key>> = if forward {
                    Box::new(range.map(|(key, _)| key))
                } else {
                    Box::new(range.rev().map(|(key, _)| key))
                };
                keys.find(|key| accept(key, key))
                    .map(|key| (key.clone(), key.clone()))
            }
            Self::Index(entries) => {
                let range = entries.range::<Key, _>(bounds);
                let groups: Box<dyn Iterator<Item = (&Key, &BTreeSet<Key>)>> = if forward {
                    Box::new(range)
                } else {
                    Box::new(range.rev())
                };
                for (key, owners) in groups {
                    // unique directions always land on the lowest primary key
                    let found = if unique {
                        owners.iter().next().filter(|pk| accept(key, pk))
                    } else if forward {
                        owners.iter().find(|pk| accept(key, pk))
                    } else {
                        owners.iter().rev().find(|pk| accept(key, pk))
                    };
                    if let Some(primary_key) = found {
                        return Some((key.clone(), primary_key.clone()));
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{open_with, read, seed, widget, widgets, write};
    use crate::{Durability, Factory, StoreParams, TransactionMode};
    use proptest::prelude::*;
    use serde_json::json;

    fn collect(request: &CursorRequest) -> Vec<(Key, Key)> {
        let mut seen = Vec::new();
        while let Some(cursor) = request.result().unwrap() {
            seen.push((cursor.key().clone(), cursor.primary_key().clone()));
            cursor.continue_(None).unwrap();
        }
        seen
    }

    fn pairs(expected: &[(i32, &str)]) -> Vec<(Key, Key)> {
        expected
            .iter()
            .map(|(k, pk)| (Key::from(*k), Key::from(*pk)))
            .collect()
    }

    fn stocked() -> (Factory, crate::Connection) {
        let factory = Factory::in_memory();
        let db = widgets(&factory);
        seed(
            &db,
            &[
                widget("a", 3, &["red", "blue"]),
                widget("b", 1, &["red"]),
                widget("c", 3, &[]),
                widget("d", 2, &["blue", "blue"]),
            ],
        );
        (factory, db)
    }

    #[test]
    fn store_cursor_walks_both_ways() {
        let (_factory, db) = stocked();
        let tx = read(&db);
        let store = tx.object_store("widgets").unwrap();
        let forward = collect(&store.open_cursor(None, CursorDirection::Next).unwrap());
        let keys: Vec<Key> = forward.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b", "c", "d"].map(Key::from));

        let backward = collect(
            &store
                .open_key_cursor(Some(KeyRange::upper_bound("c", true)), CursorDirection::Prev)
                .unwrap(),
        );
        assert_eq!(
            backward,
            vec![
                (Key::from("b"), Key::from("b")),
                (Key::from("a"), Key::from("a"))
            ]
        );
    }

    #[test]
    fn empty_store_yields_nothing() {
        let factory = Factory::in_memory();
        let db = widgets(&factory);
        let tx = read(&db);
        let request = tx
            .object_store("widgets")
            .unwrap()
            .open_cursor(None, CursorDirection::Next)
            .unwrap();
        assert!(request.result().unwrap().is_none());
    }

    #[test]
    fn index_cursor_directions() {
        let (_factory, db) = stocked();
        let tx = read(&db);
        let index = tx.object_store("widgets").unwrap().index("by_qty").unwrap();
        let walk = |direction| collect(&index.open_key_cursor(None, direction).unwrap());

        assert_eq!(
            walk(CursorDirection::Next),
            pairs(&[(1, "b"), (2, "d"), (3, "a"), (3, "c")])
        );
        assert_eq!(
            walk(CursorDirection::Prev),
            pairs(&[(3, "c"), (3, "a"), (2, "d"), (1, "b")])
        );
        assert_eq!(
            walk(CursorDirection::NextUnique),
            pairs(&[(1, "b"), (2, "d"), (3, "a")])
        );
        assert_eq!(
            walk(CursorDirection::PrevUnique),
            pairs(&[(3, "a"), (2, "d"), (1, "b")])
        );
    }

    #[test]
    fn multi_entry_index_counts_each_element_once() {
        let (_factory, db) = stocked();
        let tx = read(&db);
        let index = tx.object_store("widgets").unwrap().index("by_tag").unwrap();
        assert_eq!(index.count(None).unwrap().into_result().unwrap(), 4);
        assert_eq!(
            index
                .get_all_keys(Some(KeyRange::only("blue")), None)
                .unwrap()
                .into_result()
                .unwrap(),
            vec![Key::from("a"), Key::from("d")]
        );
        assert_eq!(
            index.get("red").unwrap().into_result().unwrap(),
            Some(widget("a", 3, &["red", "blue"]))
        );
    }

    #[test]
    fn continue_jumps_forward_only() {
        let (_factory, db) = stocked();
        let tx = read(&db);
        let index = tx.object_store("widgets").unwrap().index("by_qty").unwrap();

        let request = index.open_cursor(None, CursorDirection::Next).unwrap();
        let cursor = request.result().unwrap().unwrap();
        assert_eq!(cursor.continue_(Some(Key::from(0))).unwrap_err().name(), "DataError");
        cursor.continue_primary_key(Key::from(3), Key::from("b")).unwrap();
        let cursor = request.result().unwrap().unwrap();
        assert_eq!(cursor.primary_key(), &Key::from("c"));
        assert_eq!(cursor.value(), Some(&widget("c", 3, &[])));

        let prev = index.open_cursor(None, CursorDirection::Prev).unwrap();
        let cursor = prev.result().unwrap().unwrap();
        assert_eq!(cursor.continue_(Some(Key::from(5))).unwrap_err().name(), "DataError");
        cursor.continue_(Some(Key::from(2))).unwrap();
        assert_eq!(prev.result().unwrap().unwrap().primary_key(), &Key::from("d"));
    }

    #[test]
    fn misuse_is_rejected() {
        let (_factory, db) = stocked();
        let tx = read(&db);
        let store = tx.object_store("widgets").unwrap();

        let request = store.open_cursor(None, CursorDirection::NextUnique).unwrap();
        let cursor = request.result().unwrap().unwrap();
        assert_eq!(cursor.advance(0).unwrap_err().name(), "InvalidAccessError");
        assert_eq!(
            cursor
                .continue_primary_key(Key::from("b"), Key::from("b"))
                .unwrap_err()
                .name(),
            "InvalidAccessError"
        );
        cursor.advance(2).unwrap();
        assert_eq!(request.ready_state(), ReadyState::Pending);
        assert_eq!(cursor.continue_(None).unwrap_err().name(), "InvalidStateError");
        assert_eq!(request.result().unwrap().unwrap().key(), &Key::from("c"));

        let keys = store.open_key_cursor(None, CursorDirection::Next).unwrap();
        let cursor = keys.result().unwrap().unwrap();
        assert!(cursor.value().is_none());
        cursor.advance(10).unwrap();
        assert!(keys.result().unwrap().is_none());
        assert_eq!(cursor.continue_(None).unwrap_err().name(), "InvalidStateError");
    }

    #[test]
    fn cursor_updates_and_deletes() {
        let (_factory, db) = stocked();
        let tx = write(&db);
        let store = tx.object_store("widgets").unwrap();

        let request = store.open_cursor(None, CursorDirection::Next).unwrap();
        let first = request.result().unwrap().unwrap();
        assert_eq!(
            first.update(widget("z", 3, &[])).unwrap_err().name(),
            "DataError"
        );
        first.update(widget("a", 10, &[])).unwrap();
        first.continue_(None).unwrap();
        let second = request.result().unwrap().unwrap();
        assert_eq!(first.delete().unwrap_err().name(), "InvalidStateError");
        second.delete().unwrap();
        tx.commit().unwrap();

        let tx = read(&db);
        let store = tx.object_store("widgets").unwrap();
        assert_eq!(
            store.get_all_keys(None, None).unwrap().into_result().unwrap(),
            ["a", "c", "d"].map(Key::from)
        );
        let by_qty = store.index("by_qty").unwrap();
        assert_eq!(
            by_qty.get_key(10).unwrap().into_result().unwrap(),
            Some(Key::from("a"))
        );

        let keys = store.open_key_cursor(None, CursorDirection::Next).unwrap();
        let cursor = keys.result().unwrap().unwrap();
        assert_eq!(cursor.delete().unwrap_err().name(), "ReadOnlyError");
    }

    #[test]
    fn key_cursors_cannot_write() {
        let (_factory, db) = stocked();
        let tx = write(&db);
        let keys = tx
            .object_store("widgets")
            .unwrap()
            .open_key_cursor(None, CursorDirection::Next)
            .unwrap();
        let cursor = keys.result().unwrap().unwrap();
        assert_eq!(
            cursor.update(json!({"id": "a"})).unwrap_err().name(),
            "InvalidStateError"
        );
    }

    proptest! {
        #[test]
        fn cursor_yields_every_key_in_order(keys in prop::collection::btree_set(-500i32..500, 0..40)) {
            let factory = Factory::in_memory();
            let db = open_with(&factory, "numbers", 1, |connection, _| {
                connection.create_object_store("n", StoreParams::new()).unwrap();
            });
            let tx = db
                .transaction(["n"], TransactionMode::ReadWrite, Durability::Relaxed)
                .unwrap();
            let store = tx.object_store("n").unwrap();
            for key in &keys {
                store.put(json!(key), Some(Key::from(*key))).unwrap();
            }

            let expected: Vec<Key> = keys.iter().copied().map(Key::from).collect();
            let forward: Vec<Key> = collect(&store.open_cursor(None, CursorDirection::Next).unwrap())
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            prop_assert_eq!(&forward, &expected);

            let mut backward: Vec<Key> = collect(&store.open_key_cursor(None, CursorDirection::Prev).unwrap())
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            backward.reverse();
            prop_assert_eq!(&backward, &expected);
        }
    }

    #[test]
    fn tighter_picks_the_stricter_bound() {
        let (one, two) = (Key::from(1), Key::from(2));
        assert_eq!(
            tighter(Bound::Included(&one), Bound::Included(&two), Ordering::Greater),
            Bound::Included(&two)
        );
        assert_eq!(
            tighter(Bound::Included(&one), Bound::Included(&two), Ordering::Less),
            Bound::Included(&one)
        );
        assert_eq!(
            tighter(Bound::Included(&one), Bound::Excluded(&one), Ordering::Greater),
            Bound::Excluded(&one)
        );
        assert_eq!(
            tighter(Bound::Unbounded, Bound::Excluded(&one), Ordering::Less),
            Bound::Excluded(&one)
        );
    }

    #[test]
    fn empty_bounds() {
        let (one, two) = (Key::from(1), Key::from(2));
        assert!(is_empty(Bound::Included(&two), Bound::Included(&one)));
        assert!(is_empty(Bound::Excluded(&one), Bound::Included(&one)));
        assert!(!is_empty(Bound::Included(&one), Bound::Included(&one)));
        assert!(!is_empty(Bound::Unbounded, Bound::Excluded(&one)));
    }

    #[test]
    fn index_entries_respect_direction_and_uniqueness() {
        let entries = BTreeMap::from([
            (Key::from("a"), BTreeSet::from([Key::from(1), Key::from(2)])),
            (Key::from("b"), BTreeSet::from([Key::from(3)])),
        ]);
        let index = Entries::Index(&entries);
        let all = (Bound::Unbounded, Bound::Unbounded);

        assert_eq!(
            index.find(all, false, false, |_, _| true),
            Some((Key::from("b"), Key::from(3)))
        );
        assert_eq!(
            index.find((Bound::Unbounded, Bound::Included(&Key::from("a"))), false, true, |_, _| true),
            Some((Key::from("a"), Key::from(1)))
        );
        assert_eq!(
            index.find((Bound::Unbounded, Bound::Included(&Key::from("a"))), false, false, |_, _| true),
            Some((Key::from("a"), Key::from(2)))
        );
    }
}
