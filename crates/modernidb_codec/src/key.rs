//! The engine key type.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A record or index key.
///
/// Floating point variants never hold NaN when built through [`Key::number`],
/// [`Key::date`] or [`Key::from_value`]. Equality follows [`Ord`], so `-0.0`
/// and `0.0` are the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    /// A number key.
    Number(f64),
    /// A date key in milliseconds since the Unix epoch.
    Date(f64),
    /// A string key.
    String(String),
    /// A binary key.
    Binary(Vec<u8>),
    /// An array of keys.
    Array(Vec<Key>),
}

impl Key {
    /// Builds a number key.
    ///
    /// # Errors
    ///
    /// Fails on NaN.
    pub fn number(n: f64) -> CodecResult<Self> {
        if n.is_nan() {
            return Err(CodecError::invalid_key("NaN is not a valid key"));
        }
        Ok(Self::Number(n))
    }

    /// Builds a date key from milliseconds since the epoch.
    ///
    /// # Errors
    ///
    /// Fails on NaN or infinite timestamps.
    pub fn date(ms: f64) -> CodecResult<Self> {
        if !ms.is_finite() {
            return Err(CodecError::invalid_key("date keys must be finite"));
        }
        Ok(Self::Date(ms))
    }

    /// Converts a JSON value into a key.
    ///
    /// Numbers, strings and arrays of valid keys are keys. Objects, booleans,
    /// null and arrays holding any of those are not, and yield `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Self::Array),
            _ => None,
        }
    }

    /// Converts the key back into JSON.
    ///
    /// Integral numbers become JSON integers so a generated key `1` reads
    /// back as `1` rather than `1.0`. Binary keys become arrays of bytes.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) | Self::Date(n) => number_to_value(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Binary(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
        }
    }

    /// Returns the numeric value of a number key.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string of a string key.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the key holds no NaN anywhere.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Number(n) => !n.is_nan(),
            Self::Date(ms) => ms.is_finite(),
            Self::String(_) | Self::Binary(_) => true,
            Self::Array(items) => items.iter().all(Self::is_valid),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Date(_) => 1,
            Self::String(_) => 2,
            Self::Binary(_) => 3,
            Self::Array(_) => 4,
        }
    }
}

fn number_to_value(n: f64) -> Value {
    // 2^53 bounds the integers an f64 holds exactly
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) | (Self::Date(a), Self::Date(b)) => cmp_f64(*a, *b),
            (Self::String(a), Self::String(b)) => a.encode_utf16().cmp(b.encode_utf16()),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(ms) => write!(f, "Date({ms})"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Self::Array(items)
    }
}
