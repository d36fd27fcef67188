//! Small value types shared across the engine.

use crate::error::EngineError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
    /// Schema upgrade; only created by an open request.
    VersionChange,
}

impl TransactionMode {
    /// The mode's engine name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
            Self::VersionChange => "versionchange",
        }
    }

    /// Whether the mode permits writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit durability hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Follow the factory's `sync_on_commit` setting.
    #[default]
    Default,
    /// Flush the journal before reporting the commit.
    Strict,
    /// Append to the journal without flushing.
    Relaxed,
}

/// Whether a request has produced its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Still queued in its transaction.
    Pending,
    /// Settled with a result or an error.
    Done,
}

/// How a transaction ended.
#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    /// Every request succeeded and the changes are committed.
    Committed,
    /// The transaction was rolled back.
    Aborted(EngineError),
}

impl TransactionOutcome {
    /// Converts the outcome into a result.
    ///
    /// # Errors
    ///
    /// Returns the abort error for aborted transactions.
    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            Self::Committed => Ok(()),
            Self::Aborted(error) => Err(error),
        }
    }
}

/// Kind of a connection-level event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// An open request completed.
    Success,
    /// An upgrade or delete is waiting on open connections.
    Blocked,
    /// An open request needs a schema upgrade.
    UpgradeNeeded,
    /// Another request wants to change or delete the database.
    VersionChange,
}

impl EventType {
    /// The event's engine name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Blocked => "blocked",
            Self::UpgradeNeeded => "upgradeneeded",
            Self::VersionChange => "versionchange",
        }
    }
}

/// An upgrade, blocked or versionchange event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChangeEvent {
    /// Event kind.
    pub event_type: EventType,
    /// Version persisted before the request.
    pub old_version: u64,
    /// Requested version; `None` when the database is being deleted.
    pub new_version: Option<u64>,
}

/// Event delivered when an open request succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessEvent {
    /// Version before the request; lower than `version` after an upgrade.
    pub old_version: u64,
    /// Version of the opened connection.
    pub version: u64,
}

impl SuccessEvent {
    /// Always [`EventType::Success`].
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        EventType::Success
    }
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
