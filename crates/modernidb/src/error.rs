//! Error types for the client.

use modernidb_engine::EngineError;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ModernIdbError>;

/// Error returned by migration handlers.
///
/// Returning a [`ModernIdbError`] or an [`EngineError`] through `?` keeps its
/// identity: `open` fails with that error instead of
/// [`ModernIdbError::Migration`].
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Errors raised by the client.
///
/// Cloneable so a single-flight result can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ModernIdbError {
    /// The call needs the connection in another lifecycle state.
    #[error("InvalidConnectionStateError: {hint}")]
    InvalidConnectionState {
        /// What was expected and what was found.
        hint: String,
    },

    /// Another connection kept the database open during an upgrade.
    #[error(
        "OpenRequestBlockedError: connection to {name:?} could not be opened because an open \
         connection is preventing a 'versionchange' transaction from being created"
    )]
    OpenRequestBlocked {
        /// Database name.
        name: String,
        /// Persisted version.
        old_version: u64,
        /// Requested version.
        new_version: u64,
    },

    /// Another connection kept the database open during a delete.
    #[error("delete of {name:?} blocked: an existing connection is preventing this action")]
    DeleteBlocked {
        /// Database name.
        name: String,
    },

    /// Error reported by the engine, unchanged.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A migration handler failed with an error of its own.
    #[error("migration handler failed: {0}")]
    Migration(#[source] Arc<dyn StdError + Send + Sync>),

    /// A record could not be converted to or from JSON.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description.
        message: String,
    },

    /// The store is not declared in the schema.
    #[error("store {store:?} is not declared in the schema")]
    UnknownStore {
        /// Store name.
        store: String,
    },

    /// The index is not declared for the store.
    #[error("index {index:?} is not declared for store {store:?}")]
    UndeclaredIndex {
        /// Store name.
        store: String,
        /// Index name.
        index: String,
    },

    /// The handle's record type differs from the declared one.
    #[error("store {store:?} holds {expected}, not {actual}")]
    RecordTypeMismatch {
        /// Store name.
        store: String,
        /// Declared record type.
        expected: &'static str,
        /// Requested record type.
        actual: &'static str,
    },

    /// The client was configured with unusable settings.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description.
        message: String,
    },
}

impl ModernIdbError {
    /// The error's name, forwarding the engine's name for engine errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidConnectionState { .. } => "InvalidConnectionStateError",
            Self::OpenRequestBlocked { .. } => "OpenRequestBlockedError",
            Self::DeleteBlocked { .. } => "DeleteRequestBlockedError",
            Self::Engine(error) => error.name(),
            Self::Migration(_) => "MigrationError",
            Self::Serialization { .. } => "SerializationError",
            Self::UnknownStore { .. } => "UnknownStoreError",
            Self::UndeclaredIndex { .. } => "UndeclaredIndexError",
            Self::RecordTypeMismatch { .. } => "RecordTypeMismatchError",
            Self::InvalidConfig { .. } => "InvalidConfigError",
        }
    }

    /// Creates an invalid-connection-state error.
    pub fn invalid_connection_state(hint: impl Into<String>) -> Self {
        Self::InvalidConnectionState { hint: hint.into() }
    }

    /// Creates an invalid-config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Unwraps a handler error, keeping client and engine errors intact.
    pub(crate) fn from_handler(error: HandlerError) -> Self {
        match error.downcast::<Self>() {
            Ok(error) => *error,
            Err(error) => match error.downcast::<EngineError>() {
                Ok(error) => Self::Engine(*error),
                Err(other) => Self::Migration(Arc::from(other)),
            },
        }
    }
}

impl From<serde_json::Error> for ModernIdbError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: error.to_string(),
        }
    }
}

/// An [`AsyncOp`](crate::AsyncOp) value was read in the wrong state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("AsyncOp {accessed} value was accessed but the op is in {state} state")]
pub struct AsyncOpStateError {
    /// `"success"` or `"failure"`.
    pub accessed: &'static str,
    /// `"Pending"`, `"Success"` or `"Failure"`.
    pub state: &'static str,
}
