//! Key ranges.

use crate::error::{CodecError, CodecResult};
use crate::key::Key;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Bound;

/// An interval over [`Key`]s.
///
/// Either side may be unbounded. A range built through the constructors is
/// never empty, so it can be handed to `BTreeMap::range` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// The range holding exactly `key`.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// Every key above `lower` (or equal to it unless `open`).
    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// Every key below `upper` (or equal to it unless `open`).
    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(upper.into()),
            lower_open: false,
            upper_open: open,
        }
    }

    /// Keys between `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Fails if `lower > upper`, or if they are equal and either side is open.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CodecResult<Self> {
        let lower = lower.into();
        let upper = upper.into();
        match lower.cmp(&upper) {
            Ordering::Greater => {
                return Err(CodecError::invalid_range(format!(
                    "lower bound {lower} is above upper bound {upper}"
                )))
            }
            Ordering::Equal if lower_open || upper_open => {
                return Err(CodecError::invalid_range(format!(
                    "range around {lower} is empty"
                )))
            }
            _ => {}
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// The lower bound, if any.
    #[must_use]
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// The upper bound, if any.
    #[must_use]
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound is excluded.
    #[must_use]
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound is excluded.
    #[must_use]
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// The single key of an `only` range.
    #[must_use]
    pub fn as_single_key(&self) -> Option<&Key> {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) if lower == upper => Some(lower),
            _ => None,
        }
    }

    /// Whether `key` falls inside the range.
    #[must_use]
    pub fn includes(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            None => true,
            Some(lower) if self.lower_open => key > lower,
            Some(lower) => key >= lower,
        };
        let below_upper = match &self.upper {
            None => true,
            Some(upper) if self.upper_open => key < upper,
            Some(upper) => key <= upper,
        };
        above_lower && below_upper
    }

    /// The range as `std::ops::Bound`s.
    #[must_use]
    pub fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (
            to_bound(self.lower.as_ref(), self.lower_open),
            to_bound(self.upper.as_ref(), self.upper_open),
        )
    }
}

fn to_bound(key: Option<&Key>, open: bool) -> Bound<&Key> {
    match key {
        None => Bound::Unbounded,
        Some(key) if open => Bound::Excluded(key),
        Some(key) => Bound::Included(key),
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        Self::only(key)
    }
}

impl From<&Key> for KeyRange {
    fn from(key: &Key) -> Self {
        Self::only(key.clone())
    }
}

impl From<&str> for KeyRange {
    fn from(key: &str) -> Self {
        Self::only(key)
    }
}

impl From<i32> for KeyRange {
    fn from(key: i32) -> Self {
        Self::only(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_includes_exactly_one_key() {
        let range = KeyRange::only("b");
        assert!(range.includes(&Key::from("b")));
        assert!(!range.includes(&Key::from("a")));
        assert!(!range.includes(&Key::from("c")));
        assert_eq!(range.as_single_key(), Some(&Key::from("b")));
    }

    #[test]
    fn open_bounds_exclude_endpoints() {
        let range = KeyRange::bound(1, 5, true, false).unwrap();
        assert!(!range.includes(&Key::from(1)));
        assert!(range.includes(&Key::from(2)));
        assert!(range.includes(&Key::from(5)));
        assert!(range.as_single_key().is_none());

        let lower = KeyRange::lower_bound(3, true);
        assert!(!lower.includes(&Key::from(3)));
        assert!(lower.includes(&Key::from("text")));

        let upper = KeyRange::upper_bound(3, false);
        assert!(upper.includes(&Key::from(3)));
        assert!(!upper.includes(&Key::from("text")));
    }

    #[test]
    fn inverted_or_empty_bounds_are_rejected() {
        assert!(matches!(
            KeyRange::bound(5, 1, false, false),
            Err(CodecError::InvalidRange { .. })
        ));
        assert!(KeyRange::bound(2, 2, true, false).is_err());
        assert!(KeyRange::bound(2, 2, false, false).is_ok());
    }

    #[test]
    fn bounds_feed_btree_ranges() {
        let map: std::collections::BTreeMap<Key, ()> =
            (1..=5).map(|n| (Key::from(n), ())).collect();
        let range = KeyRange::bound(2, 4, false, true).unwrap();
        let keys: Vec<_> = map.range(range.bounds()).map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::from(2), Key::from(3)]);
    }
}
