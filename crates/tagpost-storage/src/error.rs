use std::path::PathBuf;
use tagpost_core::QueueState;
use thiserror::Error;
use uuid::Uuid;

/// Storage-specific error types for the event queue.
///
/// Every variant is fatal to the operation that produced it: durability is
/// the only guarantee the queue makes, so callers must not swallow these.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Event is not present in the requested state
    #[error("Event not found: {id} in state {state}")]
    NotFound { state: QueueState, id: Uuid },

    /// Event id is already present in the queue
    #[error("Event already stored: {id} in state {state}")]
    AlreadyExists { state: QueueState, id: Uuid },

    /// Transition is not allowed by the queue state machine
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: QueueState, to: QueueState },

    /// Stored record could not be decoded
    #[error("Corrupt record {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Event could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// The record exists but cannot be decoded; retrying will not help.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
