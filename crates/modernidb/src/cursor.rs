//! Cursor handles yielded by [`CursorStream`](crate::CursorStream).
//!
//! Store cursors come as [`Cursor`] (keys only) and [`CursorWithValue`];
//! index cursors as [`IndexCursor`] and [`IndexCursorWithValue`], which add
//! [`continue_primary_key`](IndexCursor::continue_primary_key).

use crate::adapters::{CursorItem, MoveFlag, Sealed};
use crate::error::{ModernIdbError, Result};
use modernidb_engine::{self as engine, CursorDirection, CursorSource, Key};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::Deref;

/// A cursor positioned on one entry, without the record.
#[derive(Debug, Clone)]
pub struct Cursor {
    inner: engine::Cursor,
    moved: MoveFlag,
}

impl Cursor {
    /// Key at the position: the primary key for store cursors, the index key
    /// for index cursors.
    #[must_use]
    pub fn key(&self) -> &Key {
        self.inner.key()
    }

    /// Primary key of the record at the position.
    #[must_use]
    pub fn primary_key(&self) -> &Key {
        self.inner.primary_key()
    }

    /// Iteration direction.
    #[must_use]
    pub fn direction(&self) -> CursorDirection {
        self.inner.direction()
    }

    /// The store or index iterated.
    #[must_use]
    pub fn source(&self) -> &CursorSource {
        self.inner.source()
    }

    /// Skips `count` entries; the stream's next item is the entry after
    /// them.
    ///
    /// # Errors
    ///
    /// `InvalidAccessError` for `count == 0`, `InvalidStateError` when the
    /// cursor is already moving.
    pub fn advance(&self, count: u32) -> Result<()> {
        self.inner.advance(count)?;
        self.moved.mark();
        Ok(())
    }

    /// Moves to the next entry, or to the first entry at or beyond `key`.
    ///
    /// # Errors
    ///
    /// `DataError` when `key` is not beyond the position in the iteration
    /// direction, `InvalidStateError` when the cursor is already moving.
    pub fn continue_(&self, key: Option<Key>) -> Result<()> {
        self.inner.continue_(key)?;
        self.moved.mark();
        Ok(())
    }

    fn continue_primary_key(&self, key: Key, primary_key: Key) -> Result<()> {
        self.inner.continue_primary_key(key, primary_key)?;
        self.moved.mark();
        Ok(())
    }
}

impl Sealed for Cursor {}

impl CursorItem for Cursor {
    fn from_engine(inner: engine::Cursor, moved: MoveFlag) -> Result<Self> {
        Ok(Self { inner, moved })
    }
}

/// A cursor positioned on one record, decoded as `T`.
#[derive(Debug, Clone)]
pub struct CursorWithValue<T> {
    cursor: Cursor,
    value: T,
}

impl<T> CursorWithValue<T> {
    /// The record at the position.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Takes the record.
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Serialize> CursorWithValue<T> {
    /// Replaces the record at the position. Returns its key.
    ///
    /// # Errors
    ///
    /// `DataError` if the new value changes an in-line key,
    /// `ReadOnlyError` in read-only transactions, `InvalidStateError` once
    /// the cursor has moved on.
    pub fn update(&self, value: &T) -> Result<Key> {
        let value = serde_json::to_value(value)?;
        Ok(self.cursor.inner.update(value)?.into_result()?)
    }

    /// Deletes the record at the position.
    ///
    /// # Errors
    ///
    /// `ReadOnlyError` in read-only transactions, `InvalidStateError` once
    /// the cursor has moved on.
    pub fn delete(&self) -> Result<()> {
        Ok(self.cursor.inner.delete()?.into_result()?)
    }
}

impl<T> Deref for CursorWithValue<T> {
    type Target = Cursor;

    fn deref(&self) -> &Cursor {
        &self.cursor
    }
}

impl<T> Sealed for CursorWithValue<T> {}

impl<T: DeserializeOwned> CursorItem for CursorWithValue<T> {
    fn from_engine(inner: engine::Cursor, moved: MoveFlag) -> Result<Self> {
        let value = match inner.value() {
            Some(value) => T::deserialize(value)?,
            None => {
                return Err(ModernIdbError::Serialization {
                    message: "key cursor has no record to decode".into(),
                })
            }
        };
        Ok(Self {
            cursor: Cursor { inner, moved },
            value,
        })
    }
}

/// An index cursor without the record.
#[derive(Debug, Clone)]
pub struct IndexCursor {
    cursor: Cursor,
}

impl IndexCursor {
    /// Moves to the first entry at or beyond (`key`, `primary_key`).
    ///
    /// # Errors
    ///
    /// `DataError` when the pair is not beyond the position,
    /// `InvalidAccessError` for unique directions.
    pub fn continue_primary_key(&self, key: Key, primary_key: Key) -> Result<()> {
        self.cursor.continue_primary_key(key, primary_key)
    }
}

impl Deref for IndexCursor {
    type Target = Cursor;

    fn deref(&self) -> &Cursor {
        &self.cursor
    }
}

impl Sealed for IndexCursor {}

impl CursorItem for IndexCursor {
    fn from_engine(inner: engine::Cursor, moved: MoveFlag) -> Result<Self> {
        Ok(Self {
            cursor: Cursor { inner, moved },
        })
    }
}

/// An index cursor positioned on one record, decoded as `T`.
#[derive(Debug, Clone)]
pub struct IndexCursorWithValue<T> {
    cursor: CursorWithValue<T>,
}

impl<T> IndexCursorWithValue<T> {
    /// Moves to the first entry at or beyond (`key`, `primary_key`).
    ///
    /// # Errors
    ///
    /// `DataError` when the pair is not beyond the position,
    /// `InvalidAccessError` for unique directions.
    pub fn continue_primary_key(&self, key: Key, primary_key: Key) -> Result<()> {
        self.cursor.cursor.continue_primary_key(key, primary_key)
    }

    /// Takes the record.
    pub fn into_value(self) -> T {
        self.cursor.value
    }
}

impl<T> Deref for IndexCursorWithValue<T> {
    type Target = CursorWithValue<T>;

    fn deref(&self) -> &CursorWithValue<T> {
        &self.cursor
    }
}

impl<T> Sealed for IndexCursorWithValue<T> {}

impl<T: DeserializeOwned> CursorItem for IndexCursorWithValue<T> {
    fn from_engine(inner: engine::Cursor, moved: MoveFlag) -> Result<Self> {
        Ok(Self {
            cursor: CursorWithValue::from_engine(inner, moved)?,
        })
    }
}
