//! Persisted per-space metadata index.
//!
//! Each space keeps one `_metadata.json` holding its [`SpaceIndex`]. The
//! file is replaced atomically so a crash leaves either the previous or the
//! new index on disk, never a torn one.

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::page_file::PageFileStore;
use crate::path::{decode_segment, PathCodec};
use crate::types::{PageRecord, SpaceIndex, INDEX_FORMAT_VERSION};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Loads and saves space indexes under the storage root.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    codec: PathCodec,
    files: PageFileStore,
}

impl MetadataStore {
    /// Creates a store for the configured root.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            codec: PathCodec::new(config),
            files: PageFileStore::new(config),
        }
    }

    /// Returns the path codec used by this store.
    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    /// Loads the index of a space.
    ///
    /// Returns `None` if the space has never been synced.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CorruptIndex`] if the file exists but cannot
    /// be decoded, belongs to another space, or has a newer format.
    pub fn load(&self, space_key: &str) -> StorageResult<Option<SpaceIndex>> {
        let path = self.codec.metadata_path(space_key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| StorageError::CorruptIndex {
            path: path.clone(),
            reason,
        };

        let mut index: SpaceIndex =
            serde_json::from_slice(&data).map_err(|e| corrupt(e.to_string()))?;

        if index.format_version > INDEX_FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {} (expected at most {})",
                index.format_version, INDEX_FORMAT_VERSION
            )));
        }
        if index.space_key != space_key {
            return Err(corrupt(format!(
                "index belongs to space {}, not {}",
                index.space_key, space_key
            )));
        }

        // Child lists are derived data; never trust them from disk.
        index.rebuild_children();
        debug!(space = space_key, pages = index.len(), "loaded space index");
        Ok(Some(index))
    }

    /// Loads the index of a space, or an empty one if it was never synced.
    pub fn load_or_new(&self, space_key: &str) -> StorageResult<SpaceIndex> {
        Ok(self
            .load(space_key)?
            .unwrap_or_else(|| SpaceIndex::new(space_key)))
    }

    /// Persists an index: temp file, fsync, rename, directory fsync.
    pub fn save(&self, index: &SpaceIndex) -> StorageResult<()> {
        let path = self.codec.metadata_path(&index.space_key);
        let data = serde_json::to_vec_pretty(index)?;
        self.files.write_atomic(&path, &data)?;
        debug!(
            space = %index.space_key,
            pages = index.len(),
            "saved space index"
        );
        Ok(())
    }

    /// Lists the keys of every space with a metadata file, sorted.
    pub fn list_spaces(&self) -> StorageResult<Vec<String>> {
        let root = self.codec.root();
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut spaces = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(decode_segment) else {
                continue;
            };
            if self.codec.metadata_path(&key).is_file() {
                spaces.push(key);
            }
        }
        spaces.sort();
        Ok(spaces)
    }

    /// Finds the space owning a page, searching every synced space.
    ///
    /// Spaces whose index cannot be read are skipped.
    pub fn locate(&self, page_id: &str) -> StorageResult<Option<(String, PageRecord)>> {
        for key in self.list_spaces()? {
            let index = match self.load(&key) {
                Ok(Some(index)) => index,
                Ok(None) => continue,
                Err(e) if e.is_corrupt_local_state() => {
                    warn!(space = %key, error = %e, "skipping unreadable space index");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(record) = index.page(page_id) {
                return Ok(Some((key, record.clone())));
            }
        }
        Ok(None)
    }
}

/// Makes sure `entry` is ignored by the `.gitignore` in `project_dir`.
///
/// Returns true if the file was changed.
pub fn ensure_gitignore(project_dir: &Path, entry: &str) -> StorageResult<bool> {
    let path = project_dir.join(".gitignore");
    let entry = entry.trim_end_matches('/');
    let existing = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let already = existing.lines().map(str::trim).any(|line| {
        let line = line.trim_start_matches('/').trim_end_matches('/');
        line == entry
    });
    if already {
        return Ok(false);
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    writeln!(file, "# Local page mirror\n{entry}/")?;
    Ok(true)
}
