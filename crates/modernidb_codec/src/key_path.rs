//! Key paths: where a record's key lives inside its JSON value.

use crate::error::{CodecError, CodecResult};
use crate::key::Key;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A key path.
///
/// A single path is a dot-separated chain of identifiers (`"owner.id"`); the
/// empty string denotes the record itself. An array path yields an array key
/// built from each of its member paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPath {
    /// One dot-separated path.
    Single(String),
    /// A compound path producing an array key.
    Array(Vec<String>),
}

impl KeyPath {
    /// Whether every identifier in the path is well formed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Single(path) => is_valid_single(path),
            Self::Array(paths) => !paths.is_empty() && paths.iter().all(|p| is_valid_single(p)),
        }
    }

    /// Validates the path.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeyPath`] for malformed paths.
    pub fn validate(&self) -> CodecResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CodecError::InvalidKeyPath {
                path: self.to_string(),
            })
        }
    }

    /// Whether this is the empty single path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Single(path) if path.is_empty())
    }

    /// Evaluates the path against `value`, returning the raw JSON found.
    #[must_use]
    pub fn evaluate(&self, value: &Value) -> Option<Value> {
        match self {
            Self::Single(path) => evaluate_single(path, value),
            Self::Array(paths) => paths
                .iter()
                .map(|p| evaluate_single(p, value))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Evaluates the path and converts the result into a key.
    #[must_use]
    pub fn extract_key(&self, value: &Value) -> Option<Key> {
        self.evaluate(value).as_ref().and_then(Key::from_value)
    }

    /// Keys for a multi-entry index.
    ///
    /// When the path resolves to an array, each valid element contributes a
    /// key and duplicates collapse. Otherwise this behaves like
    /// [`KeyPath::extract_key`].
    #[must_use]
    pub fn extract_multi_entry_keys(&self, value: &Value) -> Vec<Key> {
        match self.evaluate(value) {
            Some(Value::Array(items)) => {
                let mut keys: Vec<Key> = items.iter().filter_map(Key::from_value).collect();
                keys.sort();
                keys.dedup();
                keys
            }
            Some(other) => Key::from_value(&other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Whether [`KeyPath::inject`] would succeed on `value`.
    #[must_use]
    pub fn can_inject(&self, value: &Value) -> bool {
        let Self::Single(path) = self else {
            return false;
        };
        if path.is_empty() {
            return false;
        }
        let mut current = value;
        for segment in path.split('.') {
            let Value::Object(map) = current else {
                return false;
            };
            match map.get(segment) {
                Some(next) => current = next,
                None => return true,
            }
        }
        // the final segment already holds a value
        true
    }

    /// Writes a generated `key` into `value` at this path.
    ///
    /// Missing intermediate objects are created.
    ///
    /// # Errors
    ///
    /// Fails for array or empty paths, or when an intermediate value exists
    /// and is not an object.
    pub fn inject(&self, value: &mut Value, key: &Key) -> CodecResult<()> {
        let path = match self {
            Self::Single(path) if !path.is_empty() => path,
            _ => {
                return Err(CodecError::KeyInjection {
                    path: self.to_string(),
                    message: "only non-empty single paths accept generated keys".into(),
                })
            }
        };

        let mut segments = path.split('.').peekable();
        let mut current = value;
        while let Some(segment) = segments.next() {
            let object = current.as_object_mut().ok_or_else(|| CodecError::KeyInjection {
                path: path.clone(),
                message: format!("value at {segment:?} is not an object"),
            })?;
            if segments.peek().is_none() {
                object.insert(segment.to_owned(), key.to_value());
                return Ok(());
            }
            current = object
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        Ok(())
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn is_valid_single(path: &str) -> bool {
    path.is_empty() || path.split('.').all(is_identifier)
}

fn evaluate_single(path: &str, value: &Value) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let mut current = value;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let length = match current {
            Value::Object(map) => {
                current = map.get(segment)?;
                continue;
            }
            Value::String(s) if segment == "length" => s.encode_utf16().count(),
            Value::Array(items) if segment == "length" => items.len(),
            _ => return None,
        };
        // a length is a number, so nothing can follow it
        return segments.peek().is_none().then(|| Value::from(length));
    }
    Some(current.clone())
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(path) => f.write_str(path),
            Self::Array(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        Self::Single(path.to_owned())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        Self::Single(path)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(paths: Vec<&str>) -> Self {
        Self::Array(paths.into_iter().map(str::to_owned).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_identifier_chains() {
        assert!(KeyPath::from("id").is_valid());
        assert!(KeyPath::from("owner.id").is_valid());
        assert!(KeyPath::from("").is_valid());
        assert!(KeyPath::from("$meta._v2").is_valid());
        assert!(!KeyPath::from("owner..id").is_valid());
        assert!(!KeyPath::from("1st").is_valid());
        assert!(!KeyPath::from("a b").is_valid());
        assert!(!KeyPath::Array(vec![]).is_valid());
        assert!(KeyPath::from(vec!["a", "b.c"]).is_valid());
        assert!(KeyPath::from("a-b").validate().is_err());
    }

    #[test]
    fn extracts_nested_and_compound_keys() {
        let record = json!({"id": "a", "owner": {"id": 7}, "tags": ["x", "y"]});
        assert_eq!(KeyPath::from("id").extract_key(&record), Some(Key::from("a")));
        assert_eq!(KeyPath::from("owner.id").extract_key(&record), Some(Key::from(7)));
        assert_eq!(KeyPath::from("missing").extract_key(&record), None);
        assert_eq!(KeyPath::from("owner").extract_key(&record), None);
        assert_eq!(
            KeyPath::from(vec!["owner.id", "id"]).extract_key(&record),
            Some(Key::from(vec![Key::from(7), Key::from("a")]))
        );
        assert_eq!(KeyPath::from("tags.length").extract_key(&record), Some(Key::from(2)));
        assert_eq!(KeyPath::from("id.length").extract_key(&record), Some(Key::from(1)));
    }

    #[test]
    fn empty_path_is_the_value_itself() {
        assert_eq!(KeyPath::from("").extract_key(&json!(42)), Some(Key::from(42)));
    }

    #[test]
    fn multi_entry_keys_are_distinct_and_valid() {
        let record = json!({"tags": ["b", "a", "b", null, {"x": 1}, 3]});
        assert_eq!(
            KeyPath::from("tags").extract_multi_entry_keys(&record),
            vec![Key::from(3), Key::from("a"), Key::from("b")]
        );
        assert_eq!(
            KeyPath::from("tags").extract_multi_entry_keys(&json!({"tags": "solo"})),
            vec![Key::from("solo")]
        );
        assert!(KeyPath::from("tags").extract_multi_entry_keys(&json!({})).is_empty());
    }

    #[test]
    fn inject_creates_missing_objects() {
        let mut record = json!({"name": "w"});
        KeyPath::from("meta.id").inject(&mut record, &Key::from(5)).unwrap();
        assert_eq!(record, json!({"name": "w", "meta": {"id": 5}}));
    }

    #[test]
    fn can_inject_mirrors_inject() {
        assert!(KeyPath::from("meta.id").can_inject(&json!({"name": "w"})));
        assert!(KeyPath::from("meta.id").can_inject(&json!({"meta": {}})));
        assert!(!KeyPath::from("meta.id").can_inject(&json!({"meta": 1})));
        assert!(!KeyPath::from("id").can_inject(&json!("x")));
        assert!(!KeyPath::from("").can_inject(&json!({})));
    }

    #[test]
    fn inject_refuses_non_objects() {
        let mut record = json!({"meta": 1});
        assert!(matches!(
            KeyPath::from("meta.id").inject(&mut record, &Key::from(1)),
            Err(CodecError::KeyInjection { .. })
        ));
        let mut scalar = json!("x");
        assert!(KeyPath::from("id").inject(&mut scalar, &Key::from(1)).is_err());
        assert!(KeyPath::from(vec!["a"]).inject(&mut json!({}), &Key::from(1)).is_err());
    }
}
