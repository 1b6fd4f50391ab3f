//! Error types for the sync engine.

use pagesync_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote store has no such page or space.
    #[error("not found remotely: {0}")]
    RemoteNotFound(String),

    /// Local state could not be read and must be rebuilt from remote.
    #[error("corrupt local state: {0}")]
    CorruptLocalState(String),

    /// The remote version moved past the one an edit was based on.
    #[error("version conflict on page {page_id}: expected {expected}, remote has {actual}")]
    VersionConflict {
        /// Page id.
        page_id: String,
        /// Version the caller assumed.
        expected: u64,
        /// Version found remotely.
        actual: u64,
    },

    /// The page tree is not a forest or a parent is missing.
    #[error("structural inconsistency at page {page_id}: {message}")]
    StructuralInconsistency {
        /// Page id.
        page_id: String,
        /// Description of the problem.
        message: String,
    },

    /// Local storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The page is not in any synced space.
    #[error("unknown page: {0}")]
    UnknownPage(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a structural error.
    pub fn structural(page_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StructuralInconsistency {
            page_id: page_id.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transport { retryable: true, .. })
    }

    /// Classifies the error for reports.
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Transport { .. } => FailureKind::Transport,
            SyncError::RemoteNotFound(_) => FailureKind::RemoteNotFound,
            SyncError::CorruptLocalState(_) => FailureKind::CorruptLocalState,
            SyncError::VersionConflict { .. } => FailureKind::VersionConflict,
            SyncError::StructuralInconsistency { .. } => FailureKind::StructuralInconsistency,
            SyncError::Storage(StorageError::Structural { .. }) => {
                FailureKind::StructuralInconsistency
            }
            SyncError::Storage(e) if e.is_corrupt_local_state() => FailureKind::CorruptLocalState,
            SyncError::Storage(_) => FailureKind::Storage,
            SyncError::UnknownPage(_) => FailureKind::UnknownPage,
            SyncError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Category of a per-page failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network or remote service problem.
    Transport,
    /// Page vanished remotely.
    RemoteNotFound,
    /// Local file or index unreadable.
    CorruptLocalState,
    /// Concurrent remote edit.
    VersionConflict,
    /// Tree shape problem.
    StructuralInconsistency,
    /// Local I/O problem.
    Storage,
    /// Page unknown locally.
    UnknownPage,
    /// Pass was cancelled.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transport => "transport",
            FailureKind::RemoteNotFound => "remote-not-found",
            FailureKind::CorruptLocalState => "corrupt-local-state",
            FailureKind::VersionConflict => "version-conflict",
            FailureKind::StructuralInconsistency => "structural-inconsistency",
            FailureKind::Storage => "storage",
            FailureKind::UnknownPage => "unknown-page",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
