//! Assertions over a mirror's directory tree.
//!
//! The `check_*` functions return a description of the first mismatch so
//! they can be used inside `proptest!` bodies; the `assert_*` wrappers panic.

use pagesync_engine::{MemoryGateway, RemoteGateway};
use pagesync_storage::{PageFileStore, PathCodec, SpaceIndex, StorageConfig, PAGE_EXTENSION};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Every page file under `dir`, with the page id from its header.
/// Files whose header does not parse are reported with an empty id.
pub fn collect_page_files(dir: &Path) -> Vec<(PathBuf, String)> {
    let store = PageFileStore::new(&StorageConfig::default());
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == PAGE_EXTENSION) {
                let id = store
                    .read(&path)
                    .map(|file| file.header.page_id)
                    .unwrap_or_default();
                found.push((path, id));
            }
        }
    }
    found.sort();
    found
}

/// Checks that every indexed page has exactly one file, at its resolved path.
pub fn check_one_file_per_page(codec: &PathCodec, index: &SpaceIndex) -> Result<(), String> {
    let files = collect_page_files(&codec.space_dir(&index.space_key));
    let mut by_id: HashMap<&str, Vec<&PathBuf>> = HashMap::new();
    for (path, id) in &files {
        by_id.entry(id.as_str()).or_default().push(path);
    }

    for page in index.pages() {
        let expected = codec
            .resolve_path(index, &page.id)
            .map_err(|e| format!("page {}: {e}", page.id))?;
        match by_id.get(page.id.as_str()).map(Vec::as_slice) {
            Some([only]) if **only == expected => {}
            Some(paths) => {
                return Err(format!(
                    "page {}: expected only {}, found {:?}",
                    page.id,
                    expected.display(),
                    paths
                ))
            }
            None => return Err(format!("page {}: no file on disk", page.id)),
        }
    }

    if files.len() != index.len() {
        let extra: Vec<_> = files
            .iter()
            .filter(|(_, id)| !index.contains(id))
            .map(|(path, _)| path)
            .collect();
        return Err(format!("files not in the index: {extra:?}"));
    }
    Ok(())
}

/// Checks that the index mirrors the remote tree of a space: same ids,
/// versions, parents and titles.
pub fn check_index_matches_remote(gateway: &MemoryGateway, index: &SpaceIndex) -> Result<(), String> {
    let tree = gateway
        .list_full_tree(&index.space_key)
        .map_err(|e| format!("listing failed: {e}"))?;
    if tree.len() != index.len() {
        return Err(format!(
            "remote has {} pages, index has {}",
            tree.len(),
            index.len()
        ));
    }
    for entry in &tree {
        let local = index
            .page(&entry.id)
            .ok_or_else(|| format!("page {} missing from index", entry.id))?;
        if local.version != entry.version {
            return Err(format!(
                "page {}: local version {}, remote {}",
                entry.id, local.version, entry.version
            ));
        }
        if local.parent_id != entry.parent_id {
            return Err(format!(
                "page {}: local parent {:?}, remote {:?}",
                entry.id, local.parent_id, entry.parent_id
            ));
        }
        if local.title != entry.title {
            return Err(format!(
                "page {}: local title {:?}, remote {:?}",
                entry.id, local.title, entry.title
            ));
        }
    }
    Ok(())
}

/// Panics unless every indexed page has exactly one file, at its resolved path.
pub fn assert_one_file_per_page(codec: &PathCodec, index: &SpaceIndex) {
    if let Err(message) = check_one_file_per_page(codec, index) {
        panic!("mirror layout mismatch: {message}");
    }
}

/// Panics unless the index mirrors the remote tree.
pub fn assert_index_matches_remote(gateway: &MemoryGateway, index: &SpaceIndex) {
    if let Err(message) = check_index_matches_remote(gateway, index) {
        panic!("index differs from remote: {message}");
    }
}
