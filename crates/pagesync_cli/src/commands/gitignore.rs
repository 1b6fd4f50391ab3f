//! Gitignore command implementation.

use pagesync_storage::ensure_gitignore;
use std::path::{Path, PathBuf};

/// The entry to ignore for `root`, relative to `project` when possible.
pub fn ignore_entry(project: &Path, root: &Path) -> String {
    let relative: PathBuf = root
        .strip_prefix(project)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| root.to_path_buf());
    let entry = relative.to_string_lossy().replace('\\', "/");
    entry.trim_start_matches("./").to_string()
}

/// Runs the gitignore command.
pub fn run(project: &Path, root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let entry = ignore_entry(project, root);
    if ensure_gitignore(project, &entry)? {
        println!("Added {entry}/ to {}", project.join(".gitignore").display());
    } else {
        println!("{entry}/ is already ignored");
    }
    Ok(())
}
