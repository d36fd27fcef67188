//! Store and index metadata.

use crate::error::{EngineError, EngineResult};
use modernidb_codec::KeyPath;
use serde::{Deserialize, Serialize};

/// Options for creating an object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreParams {
    /// Where records carry their key; `None` for out-of-line keys.
    pub key_path: Option<KeyPath>,
    /// Whether the store generates keys.
    pub auto_increment: bool,
}

impl StoreParams {
    /// Out-of-line keys without a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key path.
    #[must_use]
    pub fn key_path(mut self, key_path: impl Into<KeyPath>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// Sets whether the store generates keys.
    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }
}

/// Options for creating an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexParams {
    /// Whether two records may share an index key.
    pub unique: bool,
    /// Whether array index keys contribute one entry per element.
    pub multi_entry: bool,
}

impl IndexParams {
    /// A non-unique, single-entry index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets uniqueness.
    #[must_use]
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Sets multi-entry.
    #[must_use]
    pub const fn multi_entry(mut self, value: bool) -> Self {
        self.multi_entry = value;
        self
    }
}

/// Persisted description of an object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    /// Store name.
    pub name: String,
    /// Key path for in-line keys.
    pub key_path: Option<KeyPath>,
    /// Whether keys are generated.
    pub auto_increment: bool,
}

impl StoreSchema {
    pub(crate) fn new(name: impl Into<String>, params: StoreParams) -> EngineResult<Self> {
        if let Some(path) = &params.key_path {
            if !path.is_valid() {
                return Err(EngineError::syntax(format!("invalid key path {path}")));
            }
            if params.auto_increment && (path.is_empty() || matches!(path, KeyPath::Array(_))) {
                return Err(EngineError::invalid_access(
                    "auto-increment stores need a non-empty single key path",
                ));
            }
        }
        Ok(Self {
            name: name.into(),
            key_path: params.key_path,
            auto_increment: params.auto_increment,
        })
    }
}

/// Persisted description of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Path of the index key inside each record.
    pub key_path: KeyPath,
    /// Whether index keys are unique.
    pub unique: bool,
    /// Whether array keys fan out per element.
    pub multi_entry: bool,
}

impl IndexSchema {
    pub(crate) fn new(
        name: impl Into<String>,
        key_path: KeyPath,
        params: IndexParams,
    ) -> EngineResult<Self> {
        if !key_path.is_valid() {
            return Err(EngineError::syntax(format!("invalid key path {key_path}")));
        }
        if params.multi_entry && matches!(key_path, KeyPath::Array(_)) {
            return Err(EngineError::invalid_access(
                "multi-entry indexes cannot use array key paths",
            ));
        }
        Ok(Self {
            name: name.into(),
            key_path,
            unique: params.unique,
            multi_entry: params.multi_entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_increment_needs_single_path() {
        let ok = StoreSchema::new("s", StoreParams::new().key_path("id").auto_increment(true));
        assert!(ok.is_ok());
        let empty = StoreSchema::new("s", StoreParams::new().key_path("").auto_increment(true));
        assert!(matches!(empty, Err(EngineError::InvalidAccess { .. })));
        let array = StoreSchema::new(
            "s",
            StoreParams::new()
                .key_path(vec!["a", "b"])
                .auto_increment(true),
        );
        assert!(matches!(array, Err(EngineError::InvalidAccess { .. })));
        assert!(StoreSchema::new("s", StoreParams::new().auto_increment(true)).is_ok());
    }

    #[test]
    fn malformed_paths_are_syntax_errors() {
        let store = StoreSchema::new("s", StoreParams::new().key_path("a..b"));
        assert!(matches!(store, Err(EngineError::Syntax { .. })));
        let index = IndexSchema::new("i", KeyPath::from("9x"), IndexParams::new());
        assert!(matches!(index, Err(EngineError::Syntax { .. })));
    }

    #[test]
    fn multi_entry_rejects_array_paths() {
        let index = IndexSchema::new(
            "i",
            KeyPath::from(vec!["a", "b"]),
            IndexParams::new().multi_entry(true),
        );
        assert!(matches!(index, Err(EngineError::InvalidAccess { .. })));
    }
}
