//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing the local mirror.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The metadata index could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A page file has a missing or unparseable header block.
    #[error("corrupt header in {path:?}: {reason}")]
    CorruptHeader {
        /// The page file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The persisted metadata index is unreadable.
    #[error("corrupt metadata index {path:?}: {reason}")]
    CorruptIndex {
        /// The metadata file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Another process holds the exclusive lock on a space.
    #[error("space {space} is locked by another process")]
    SpaceLocked {
        /// The space key.
        space: String,
    },

    /// The page tree is not a forest or references a missing parent.
    #[error("structural inconsistency at page {page_id}: {message}")]
    Structural {
        /// The page whose ancestry could not be resolved.
        page_id: String,
        /// Description of the problem.
        message: String,
    },

    /// A temporary file could not be renamed into place.
    #[error("failed to persist {path:?}: {source}")]
    Persist {
        /// The destination path.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
}

impl StorageError {
    /// Creates a structural error for a page.
    pub fn structural(page_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structural {
            page_id: page_id.into(),
            message: message.into(),
        }
    }

    /// Creates a corrupt-header error.
    pub fn corrupt_header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptHeader {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the local copy should be discarded and re-fetched.
    pub fn is_corrupt_local_state(&self) -> bool {
        matches!(
            self,
            StorageError::CorruptHeader { .. } | StorageError::CorruptIndex { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_states_are_classified() {
        assert!(StorageError::corrupt_header("a.html", "missing").is_corrupt_local_state());
        assert!(StorageError::CorruptIndex {
            path: "_metadata.json".into(),
            reason: "eof".into(),
        }
        .is_corrupt_local_state());
        assert!(!StorageError::structural("1", "cycle").is_corrupt_local_state());
    }

    #[test]
    fn error_display() {
        let err = StorageError::SpaceLocked {
            space: "DEV".into(),
        };
        assert_eq!(err.to_string(), "space DEV is locked by another process");

        let err = StorageError::structural("42", "parent 7 not materialized");
        assert!(err.to_string().contains("42"));
        assert!(err.to_string().contains("parent 7"));
    }
}
