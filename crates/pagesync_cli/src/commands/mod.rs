//! CLI command implementations.

pub mod gitignore;
pub mod inspect;
pub mod locate;
pub mod nav;
pub mod spaces;
pub mod verify;

use pagesync_storage::{MetadataStore, SpaceIndex};
use thiserror::Error;

/// Failures reported by commands, on top of storage errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No index exists for the space.
    #[error("no synced space '{0}' under the mirror root")]
    UnknownSpace(String),

    /// No synced space holds the page.
    #[error("page {0} is not in any synced space")]
    UnknownPage(String),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),
}

/// Loads the index of a space that must already exist.
pub fn load_space(
    store: &MetadataStore,
    space_key: &str,
) -> Result<SpaceIndex, Box<dyn std::error::Error>> {
    store
        .load(space_key)?
        .ok_or_else(|| CommandError::UnknownSpace(space_key.to_string()).into())
}
