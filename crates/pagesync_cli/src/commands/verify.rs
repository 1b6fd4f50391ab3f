//! Verify command implementation.

use super::{load_space, CommandError};
use pagesync_storage::{
    MetadataStore, PageFileStore, PathCodec, SpaceIndex, StorageConfig, StorageError,
};
use std::collections::HashSet;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Number of pages checked.
    pub pages_checked: usize,
    /// Number of pages whose file matched the index.
    pub valid_pages: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn new() -> Self {
        Self {
            pages_checked: 0,
            valid_pages: 0,
            errors: Vec::new(),
        }
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks every indexed page against the files on disk.
pub fn verify_space(
    codec: &PathCodec,
    files: &PageFileStore,
    index: &SpaceIndex,
) -> Result<VerifyResult, StorageError> {
    let mut result = VerifyResult::new();

    let forest = index.validate_forest();
    for id in &forest.cycles {
        result.errors.push(format!("page {id}: parent chain loops"));
    }
    for (id, parent) in &forest.dangling {
        result.errors.push(format!("page {id}: parent {parent} is not indexed"));
    }

    let mut expected_leaves = HashSet::new();
    let mut page_dirs = Vec::new();
    for page in index.pages() {
        result.pages_checked += 1;
        let path = match codec.resolve_path(index, &page.id) {
            Ok(path) => path,
            Err(e) => {
                result.errors.push(format!("page {}: {e}", page.id));
                continue;
            }
        };
        if let Some(dir) = path.parent() {
            page_dirs.push(dir.to_path_buf());
        }
        expected_leaves.insert(path.clone());

        match files.read(&path) {
            Ok(file) if file.header.page_id != page.id => result.errors.push(format!(
                "page {}: {} belongs to page {}",
                page.id,
                path.display(),
                file.header.page_id
            )),
            Ok(file) if file.header.version != page.version => result.errors.push(format!(
                "page {}: file has version {}, index has {}",
                page.id, file.header.version, page.version
            )),
            Ok(_) => result.valid_pages += 1,
            Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => result
                .errors
                .push(format!("page {}: missing {}", page.id, path.display())),
            Err(e) => result.errors.push(format!("page {}: {e}", page.id)),
        }
    }

    for dir in page_dirs {
        for leaf in files.leaf_files(&dir)? {
            if !expected_leaves.contains(&leaf) {
                result
                    .errors
                    .push(format!("stray page file {}", leaf.display()));
            }
        }
    }

    Ok(result)
}

/// Runs the verify command.
pub fn run(config: &StorageConfig, space_key: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying space {space_key} under {:?}", config.root());
    println!();

    let index = load_space(&MetadataStore::new(config), space_key)?;
    let result = verify_space(&PathCodec::new(config), &PageFileStore::new(config), &index)?;

    println!("  Pages checked: {}", result.pages_checked);
    println!("  Valid pages:   {}", result.valid_pages);
    for error in result.errors.iter().take(20) {
        println!("    - {error}");
    }
    if result.errors.len() > 20 {
        println!("    ... and {} more", result.errors.len() - 20);
    }

    println!();
    if result.is_ok() {
        println!("✓ Mirror verification passed");
        Ok(())
    } else {
        println!("✗ Mirror verification failed");
        Err(CommandError::VerificationFailed(result.errors.len()).into())
    }
}
