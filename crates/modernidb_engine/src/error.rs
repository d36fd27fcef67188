//! Error types for the engine.

use modernidb_codec::CodecError;
use modernidb_storage::StorageError;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the engine.
///
/// Most variants correspond to a named engine error (see [`EngineError::name`])
/// so callers can branch on the engine's own error identity. The type is
/// cloneable because one failure settles every request queued behind it.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A lower version was requested than the one persisted.
    #[error("VersionError: {message}")]
    Version {
        /// Description.
        message: String,
    },

    /// A uniqueness or key-generator constraint was violated.
    #[error("ConstraintError: {message}")]
    Constraint {
        /// Description.
        message: String,
    },

    /// A key or value was unusable for the operation.
    #[error("DataError: {message}")]
    Data {
        /// Description.
        message: String,
    },

    /// A named store or index does not exist.
    #[error("NotFoundError: {message}")]
    NotFound {
        /// Description.
        message: String,
    },

    /// A write was attempted in a read-only transaction.
    #[error("ReadOnlyError: {message}")]
    ReadOnly {
        /// Description.
        message: String,
    },

    /// A request was made against a settled transaction.
    #[error("TransactionInactiveError: {message}")]
    TransactionInactive {
        /// Description.
        message: String,
    },

    /// The object is in the wrong state for the call.
    #[error("InvalidStateError: {message}")]
    InvalidState {
        /// Description.
        message: String,
    },

    /// The call's arguments are not acceptable for this object.
    #[error("InvalidAccessError: {message}")]
    InvalidAccess {
        /// Description.
        message: String,
    },

    /// A key path is malformed.
    #[error("SyntaxError: {message}")]
    Syntax {
        /// Description.
        message: String,
    },

    /// The transaction was aborted.
    #[error("AbortError: {message}")]
    Abort {
        /// Description.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(Arc<StorageError>),

    /// Key, range or payload codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A journal record could not be parsed.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description.
        message: String,
    },

    /// A journal record failed its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Recomputed checksum.
        actual: u32,
    },

    /// Another factory holds the database directory.
    #[error("database directory locked: another factory has exclusive access")]
    DirectoryLocked,
}

impl EngineError {
    /// The engine's name for this error, e.g. `"ConstraintError"`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Version { .. } => "VersionError",
            Self::Constraint { .. } => "ConstraintError",
            Self::Data { .. } => "DataError",
            Self::NotFound { .. } => "NotFoundError",
            Self::ReadOnly { .. } => "ReadOnlyError",
            Self::TransactionInactive { .. } => "TransactionInactiveError",
            Self::InvalidState { .. } => "InvalidStateError",
            Self::InvalidAccess { .. } => "InvalidAccessError",
            Self::Syntax { .. } => "SyntaxError",
            Self::Abort { .. } => "AbortError",
            Self::Codec(CodecError::InvalidKeyPath { .. }) => "SyntaxError",
            Self::Codec(
                CodecError::InvalidKey { .. }
                | CodecError::InvalidRange { .. }
                | CodecError::KeyInjection { .. },
            ) => "DataError",
            Self::Storage(_)
            | Self::Codec(_)
            | Self::JournalCorruption { .. }
            | Self::ChecksumMismatch { .. }
            | Self::DirectoryLocked => "UnknownError",
        }
    }

    /// Creates a version error.
    pub fn version(message: impl Into<String>) -> Self {
        Self::Version {
            message: message.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a read-only error.
    pub fn read_only(message: impl Into<String>) -> Self {
        Self::ReadOnly {
            message: message.into(),
        }
    }

    /// Creates a transaction-inactive error.
    pub fn transaction_inactive(message: impl Into<String>) -> Self {
        Self::TransactionInactive {
            message: message.into(),
        }
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid-access error.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::InvalidAccess {
            message: message.into(),
        }
    }

    /// Creates a syntax error.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }

    /// Creates an abort error.
    pub fn abort(message: impl Into<String>) -> Self {
        Self::Abort {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(error: StorageError) -> Self {
        Self::Storage(Arc::new(error))
    }
}

impl From<io::Error> for EngineError {
    fn from(error: io::Error) -> Self {
        Self::Storage(Arc::new(StorageError::Io(error)))
    }
}
