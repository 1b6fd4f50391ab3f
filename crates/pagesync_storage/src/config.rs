//! Storage configuration.

use std::path::{Path, PathBuf};

/// Default directory, relative to the working directory, holding all mirrors.
pub const DEFAULT_ROOT_DIR: &str = ".pagesync";

/// Default name of the per-space metadata index.
pub const DEFAULT_METADATA_FILE: &str = "_metadata.json";

/// Configuration for the on-disk mirror.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per space.
    pub root: PathBuf,
    /// File name of the per-space metadata index. Should start with `_` so
    /// no page directory can take its name.
    pub metadata_file: String,
    /// Maximum length of a sanitized title, in bytes.
    pub max_title_len: usize,
    /// Whether to fsync files and directories after every write.
    pub sync_on_write: bool,
}

impl StorageConfig {
    /// Creates a configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_file: DEFAULT_METADATA_FILE.to_string(),
            max_title_len: 100,
            sync_on_write: true,
        }
    }

    /// Sets the maximum sanitized title length.
    #[must_use]
    pub fn with_max_title_len(mut self, len: usize) -> Self {
        self.max_title_len = len;
        self
    }

    /// Sets whether writes are fsynced.
    #[must_use]
    pub fn with_sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns the storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StorageConfig::default();
        assert_eq!(config.root(), Path::new(".pagesync"));
        assert_eq!(config.metadata_file, "_metadata.json");
        assert_eq!(config.max_title_len, 100);
        assert!(config.sync_on_write);
    }

    #[test]
    fn builder_pattern() {
        let config = StorageConfig::new("/tmp/mirror")
            .with_max_title_len(40)
            .with_sync_on_write(false);

        assert_eq!(config.root(), Path::new("/tmp/mirror"));
        assert_eq!(config.max_title_len, 40);
        assert!(!config.sync_on_write);
    }
}
