//! Test fixtures and mirror helpers.
//!
//! Provides a throwaway mirror wired to an in-memory remote store, plus
//! shortcuts for the setup most sync tests repeat.

use crate::generators::PageSpec;
use pagesync_engine::{MemoryGateway, RetryConfig, SyncConfig, SyncEngine, SyncReport};
use pagesync_storage::{PageFile, PageFileStore, SpaceIndex, StorageConfig};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A sync engine over a temporary mirror root, with automatic cleanup.
pub struct TestMirror {
    /// The engine under test.
    pub engine: SyncEngine<MemoryGateway>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestMirror {
    /// Creates a mirror with retries disabled and fsync off.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates a mirror, letting the caller adjust the configuration.
    pub fn with_config(adjust: impl FnOnce(SyncConfig) -> SyncConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = StorageConfig::new(temp_dir.path()).with_sync_on_write(false);
        let config = SyncConfig::new(storage, "https://wiki.example.com")
            .with_retry(RetryConfig::no_retry());
        Self {
            engine: SyncEngine::new(adjust(config), MemoryGateway::new()),
            _temp_dir: temp_dir,
        }
    }

    /// Returns the mirror root.
    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Returns the in-memory remote store.
    pub fn gateway(&self) -> &MemoryGateway {
        self.engine.gateway()
    }

    /// Runs a policy-chosen pass, panicking on error.
    pub fn sync(&self, space_key: &str) -> SyncReport {
        self.engine
            .sync_space(space_key, false)
            .expect("Sync pass failed")
    }

    /// Runs a forced full pass, panicking on error.
    pub fn full_sync(&self, space_key: &str) -> SyncReport {
        self.engine
            .sync_space(space_key, true)
            .expect("Full sync pass failed")
    }

    /// Loads the committed index of a space.
    pub fn index(&self, space_key: &str) -> SpaceIndex {
        self.engine
            .metadata()
            .load(space_key)
            .expect("Failed to load index")
            .expect("Space has not been synced")
    }

    /// Resolved content file of an indexed page.
    pub fn page_path(&self, space_key: &str, page_id: &str) -> PathBuf {
        self.engine
            .codec()
            .resolve_path(&self.index(space_key), page_id)
            .expect("Failed to resolve page path")
    }

    /// Reads the local copy of a page.
    pub fn read_page(&self, space_key: &str, page_id: &str) -> PageFile {
        self.files()
            .read(&self.page_path(space_key, page_id))
            .expect("Failed to read page file")
    }

    /// Replaces the local body of a page, keeping its header.
    pub fn edit_local(&self, space_key: &str, page_id: &str, body: &str) {
        let path = self.page_path(space_key, page_id);
        let file = self.files().read(&path).expect("Failed to read page file");
        self.files()
            .write(&path, body, &file.header)
            .expect("Failed to write page file");
    }

    /// Creates every page of `pages` in the remote store, in order.
    pub fn seed(&self, space_key: &str, pages: &[PageSpec]) {
        seed_remote(self.gateway(), space_key, pages);
    }

    fn files(&self) -> PageFileStore {
        PageFileStore::new(&self.engine.config().storage)
    }
}

impl Default for TestMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestMirror {
    type Target = SyncEngine<MemoryGateway>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Creates every page of `pages` in `gateway`, in order. Parents must come
/// before their children.
pub fn seed_remote(gateway: &MemoryGateway, space_key: &str, pages: &[PageSpec]) {
    for page in pages {
        gateway.create_page(
            space_key,
            &page.id,
            &page.title,
            page.parent_id.as_deref(),
            &page.body,
        );
    }
}

/// A small fixed space: Home with Guides and Reference below it, and a
/// Setup page under Guides.
pub fn sample_space() -> Vec<PageSpec> {
    vec![
        PageSpec::new("1", "Home", None),
        PageSpec::new("2", "Guides", Some("1")),
        PageSpec::new("3", "Setup: Linux", Some("2")),
        PageSpec::new("4", "Reference", Some("1")),
    ]
}

/// Runs a test with a fresh mirror.
///
/// # Example
///
/// ```rust
/// use pagesync_testkit::{sample_space, with_mirror};
///
/// with_mirror(|mirror| {
///     mirror.seed("DEV", &sample_space());
///     assert_eq!(mirror.sync("DEV").created, 4);
/// });
/// ```
pub fn with_mirror<F, R>(f: F) -> R
where
    F: FnOnce(&TestMirror) -> R,
{
    let mirror = TestMirror::new();
    f(&mirror)
}
