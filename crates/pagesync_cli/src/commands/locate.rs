//! Locate command implementation.

use super::{load_space, CommandError};
use pagesync_storage::{MetadataStore, StorageConfig};
use std::path::PathBuf;

/// Finds the owning space and resolved file of a page.
pub fn locate(
    store: &MetadataStore,
    page_id: &str,
) -> Result<(String, PathBuf), Box<dyn std::error::Error>> {
    let (space_key, _) = store
        .locate(page_id)?
        .ok_or_else(|| CommandError::UnknownPage(page_id.to_string()))?;
    let index = load_space(store, &space_key)?;
    let path = store.codec().resolve_path(&index, page_id)?;
    Ok((space_key, path))
}

/// Runs the locate command.
pub fn run(config: &StorageConfig, page_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (space_key, path) = locate(&MetadataStore::new(config), page_id)?;
    println!("{space_key}\t{}", path.display());
    Ok(())
}
