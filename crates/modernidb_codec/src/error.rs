//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while building keys, ranges and key paths or while
/// encoding journal payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value cannot be used as a key.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Why the value was rejected.
        message: String,
    },

    /// The key range bounds are out of order or empty.
    #[error("invalid key range: {message}")]
    InvalidRange {
        /// Description of the problem.
        message: String,
    },

    /// The key path is not a valid identifier chain.
    #[error("invalid key path: {path:?}")]
    InvalidKeyPath {
        /// The offending path.
        path: String,
    },

    /// The string does not name a cursor direction.
    #[error("invalid cursor direction: {direction:?}")]
    InvalidDirection {
        /// The rejected name.
        direction: String,
    },

    /// A generated key could not be written into the record.
    #[error("cannot inject key at {path:?}: {message}")]
    KeyInjection {
        /// The key path.
        path: String,
        /// Why injection failed.
        message: String,
    },

    /// CBOR encoding failed.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// CBOR decoding failed.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl CodecError {
    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates an invalid range error.
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
