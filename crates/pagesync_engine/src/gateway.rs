//! Remote store abstraction.

use crate::error::{SyncError, SyncResult};
use pagesync_storage::Timestamp;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A page reported by a "changed since" query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPage {
    /// Page id.
    pub id: String,
    /// Last remote modification.
    pub modified_at: Timestamp,
}

/// One node of the complete remote page tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Page id.
    pub id: String,
    /// Parent page, `None` for space roots.
    pub parent_id: Option<String>,
    /// Current remote version.
    pub version: u64,
    /// Current title.
    pub title: String,
}

/// A page with its content, as fetched from the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    /// Page id.
    pub id: String,
    /// Owning space.
    pub space_key: String,
    /// Display name of the owning space, empty if the remote omits it.
    pub space_name: String,
    /// Title.
    pub title: String,
    /// Version.
    pub version: u64,
    /// Parent page, `None` for space roots.
    pub parent_id: Option<String>,
    /// Page body.
    pub body: String,
    /// Canonical URL.
    pub url: String,
    /// Last remote modification.
    pub modified_at: Timestamp,
}

/// Access to the remote hierarchical document store.
///
/// Implementations wrap an authenticated HTTP client. Errors that may go
/// away on retry should be reported as retryable transport errors.
pub trait RemoteGateway: Send + Sync {
    /// Lists pages of a space modified at or after `since`.
    fn list_changed_since(&self, space_key: &str, since: Timestamp) -> SyncResult<Vec<ChangedPage>>;

    /// Lists every page of a space.
    fn list_full_tree(&self, space_key: &str) -> SyncResult<Vec<TreeEntry>>;

    /// Fetches a page with its body.
    fn fetch_page(&self, page_id: &str) -> SyncResult<RemotePage>;

    /// Fetches only the current version of a page.
    fn fetch_version(&self, page_id: &str) -> SyncResult<u64> {
        Ok(self.fetch_page(page_id)?.version)
    }

    /// Replaces a page's content if its remote version is still
    /// `expected_version`. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::VersionConflict`] if the remote moved on.
    fn push_page(
        &self,
        page_id: &str,
        expected_version: u64,
        title: &str,
        content: &str,
    ) -> SyncResult<u64>;
}

#[derive(Debug, Clone)]
struct StoredPage {
    space_key: String,
    title: String,
    parent_id: Option<String>,
    version: u64,
    body: String,
    modified_at: Timestamp,
}

#[derive(Debug, Default)]
struct Inner {
    pages: BTreeMap<String, StoredPage>,
    space_names: HashMap<String, String>,
    clock: u64,
    broken: HashSet<String>,
    flaky: HashMap<String, u32>,
    listing_down: bool,
    fetches: HashMap<String, u32>,
}

impl Inner {
    fn tick(&mut self) -> Timestamp {
        self.clock = Timestamp::now().as_millis().max(self.clock + 1);
        Timestamp(self.clock)
    }

    fn page_mut(&mut self, page_id: &str) -> &mut StoredPage {
        self.pages
            .get_mut(page_id)
            .unwrap_or_else(|| panic!("no page {page_id} in memory gateway"))
    }
}

/// An in-memory remote store for testing.
///
/// Every mutation stamps the page with a strictly increasing modification
/// time no earlier than the wall clock, so watermarks taken with
/// [`Timestamp::now`] never skip later edits.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    base_url: String,
    inner: Mutex<Inner>,
}

impl MemoryGateway {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_base_url("https://wiki.example.com")
    }

    /// Creates an empty store whose page URLs start with `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Creates a page at version 1. Returns its modification time.
    pub fn create_page(
        &self,
        space_key: &str,
        page_id: &str,
        title: &str,
        parent_id: Option<&str>,
        body: &str,
    ) -> Timestamp {
        let mut inner = self.inner.lock();
        let modified_at = inner.tick();
        inner.pages.insert(
            page_id.to_string(),
            StoredPage {
                space_key: space_key.to_string(),
                title: title.to_string(),
                parent_id: parent_id.map(str::to_string),
                version: 1,
                body: body.to_string(),
                modified_at,
            },
        );
        modified_at
    }

    /// Replaces a page's body, bumping its version.
    ///
    /// # Panics
    ///
    /// Panics if the page does not exist.
    pub fn edit_page(&self, page_id: &str, body: &str) -> Timestamp {
        let mut inner = self.inner.lock();
        let modified_at = inner.tick();
        let page = inner.page_mut(page_id);
        page.body = body.to_string();
        page.version += 1;
        page.modified_at = modified_at;
        modified_at
    }

    /// Renames a page, bumping its version.
    ///
    /// # Panics
    ///
    /// Panics if the page does not exist.
    pub fn rename_page(&self, page_id: &str, title: &str) -> Timestamp {
        let mut inner = self.inner.lock();
        let modified_at = inner.tick();
        let page = inner.page_mut(page_id);
        page.title = title.to_string();
        page.version += 1;
        page.modified_at = modified_at;
        modified_at
    }

    /// Re-parents a page without changing its version. No cycle check.
    ///
    /// # Panics
    ///
    /// Panics if the page does not exist.
    pub fn move_page(&self, page_id: &str, parent_id: Option<&str>) -> Timestamp {
        let mut inner = self.inner.lock();
        let modified_at = inner.tick();
        let page = inner.page_mut(page_id);
        page.parent_id = parent_id.map(str::to_string);
        page.modified_at = modified_at;
        modified_at
    }

    /// Sets the display name reported for pages of a space. Defaults to the key.
    pub fn set_space_name(&self, space_key: &str, name: &str) {
        self.inner
            .lock()
            .space_names
            .insert(space_key.to_string(), name.to_string());
    }

    /// Deletes a single page. Children keep their parent link.
    pub fn delete_page(&self, page_id: &str) -> bool {
        self.inner.lock().pages.remove(page_id).is_some()
    }

    /// Makes every fetch of a page fail with a fatal transport error.
    pub fn fail_fetch(&self, page_id: &str) {
        self.inner.lock().broken.insert(page_id.to_string());
    }

    /// Makes the next `times` fetches of a page fail with a retryable error.
    pub fn fail_fetch_transiently(&self, page_id: &str, times: u32) {
        self.inner.lock().flaky.insert(page_id.to_string(), times);
    }

    /// Makes listing calls fail.
    pub fn set_listing_down(&self, down: bool) {
        self.inner.lock().listing_down = down;
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.broken.clear();
        inner.flaky.clear();
        inner.listing_down = false;
    }

    /// Number of `fetch_page` calls made for a page.
    pub fn fetch_count(&self, page_id: &str) -> u32 {
        self.inner.lock().fetches.get(page_id).copied().unwrap_or(0)
    }

    /// Current version of a page.
    pub fn version_of(&self, page_id: &str) -> Option<u64> {
        self.inner.lock().pages.get(page_id).map(|p| p.version)
    }

    /// Current body of a page.
    pub fn body_of(&self, page_id: &str) -> Option<String> {
        self.inner.lock().pages.get(page_id).map(|p| p.body.clone())
    }

    fn url_for(&self, space_key: &str, page_id: &str) -> String {
        format!("{}/spaces/{}/pages/{}", self.base_url, space_key, page_id)
    }
}

impl RemoteGateway for MemoryGateway {
    fn list_changed_since(&self, space_key: &str, since: Timestamp) -> SyncResult<Vec<ChangedPage>> {
        let inner = self.inner.lock();
        if inner.listing_down {
            return Err(SyncError::transport_fatal("listing unavailable"));
        }
        Ok(inner
            .pages
            .iter()
            .filter(|(_, p)| p.space_key == space_key && p.modified_at >= since)
            .map(|(id, p)| ChangedPage {
                id: id.clone(),
                modified_at: p.modified_at,
            })
            .collect())
    }

    fn list_full_tree(&self, space_key: &str) -> SyncResult<Vec<TreeEntry>> {
        let inner = self.inner.lock();
        if inner.listing_down {
            return Err(SyncError::transport_fatal("listing unavailable"));
        }
        Ok(inner
            .pages
            .iter()
            .filter(|(_, p)| p.space_key == space_key)
            .map(|(id, p)| TreeEntry {
                id: id.clone(),
                parent_id: p.parent_id.clone(),
                version: p.version,
                title: p.title.clone(),
            })
            .collect())
    }

    fn fetch_page(&self, page_id: &str) -> SyncResult<RemotePage> {
        let mut inner = self.inner.lock();
        *inner.fetches.entry(page_id.to_string()).or_default() += 1;

        if inner.broken.contains(page_id) {
            return Err(SyncError::transport_fatal(format!("fetch of {page_id} failed")));
        }
        if let Some(remaining) = inner.flaky.get_mut(page_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SyncError::transport_retryable(format!(
                    "fetch of {page_id} timed out"
                )));
            }
        }

        let page = inner
            .pages
            .get(page_id)
            .ok_or_else(|| SyncError::RemoteNotFound(page_id.to_string()))?;
        Ok(RemotePage {
            id: page_id.to_string(),
            space_key: page.space_key.clone(),
            space_name: inner
                .space_names
                .get(&page.space_key)
                .cloned()
                .unwrap_or_else(|| page.space_key.clone()),
            title: page.title.clone(),
            version: page.version,
            parent_id: page.parent_id.clone(),
            body: page.body.clone(),
            url: self.url_for(&page.space_key, page_id),
            modified_at: page.modified_at,
        })
    }

    fn fetch_version(&self, page_id: &str) -> SyncResult<u64> {
        self.version_of(page_id)
            .ok_or_else(|| SyncError::RemoteNotFound(page_id.to_string()))
    }

    fn push_page(
        &self,
        page_id: &str,
        expected_version: u64,
        title: &str,
        content: &str,
    ) -> SyncResult<u64> {
        let mut inner = self.inner.lock();
        let modified_at = inner.tick();
        let page = inner
            .pages
            .get_mut(page_id)
            .ok_or_else(|| SyncError::RemoteNotFound(page_id.to_string()))?;
        if page.version != expected_version {
            return Err(SyncError::VersionConflict {
                page_id: page_id.to_string(),
                expected: expected_version,
                actual: page.version,
            });
        }
        page.version += 1;
        page.title = title.to_string();
        page.body = content.to_string();
        page.modified_at = modified_at;
        Ok(page.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modification_times_increase() {
        let gateway = MemoryGateway::new();
        let a = gateway.create_page("DEV", "1", "A", None, "a");
        let b = gateway.create_page("DEV", "2", "B", None, "b");
        let c = gateway.edit_page("1", "a2");
        assert!(a < b && b < c);
        assert!(a >= Timestamp(1));
    }

    #[test]
    fn changed_since_is_inclusive_and_per_space() {
        let gateway = MemoryGateway::new();
        gateway.create_page("DEV", "1", "A", None, "a");
        let t = gateway.create_page("DEV", "2", "B", None, "b");
        gateway.create_page("OPS", "3", "C", None, "c");

        let ids: Vec<_> = gateway
            .list_changed_since("DEV", t)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["2"]);
        assert_eq!(gateway.list_full_tree("OPS").unwrap().len(), 1);
    }

    #[test]
    fn fetch_reports_missing_and_injected_failures() {
        let gateway = MemoryGateway::new();
        gateway.create_page("DEV", "1", "A", None, "a");

        assert!(matches!(
            gateway.fetch_page("404"),
            Err(SyncError::RemoteNotFound(_))
        ));

        gateway.fail_fetch_transiently("1", 1);
        assert!(gateway.fetch_page("1").unwrap_err().is_retryable());
        assert_eq!(gateway.fetch_page("1").unwrap().body, "a");

        gateway.fail_fetch("1");
        assert!(!gateway.fetch_page("1").unwrap_err().is_retryable());
        assert_eq!(gateway.fetch_count("1"), 3);

        gateway.clear_failures();
        let page = gateway.fetch_page("1").unwrap();
        assert_eq!(page.url, "https://wiki.example.com/spaces/DEV/pages/1");
        assert_eq!(page.space_name, "DEV");

        gateway.set_space_name("DEV", "Development");
        assert_eq!(gateway.fetch_page("1").unwrap().space_name, "Development");
    }

    #[test]
    fn push_checks_expected_version() {
        let gateway = MemoryGateway::new();
        gateway.create_page("DEV", "1", "A", None, "a");
        gateway.edit_page("1", "b");

        let err = gateway.push_page("1", 1, "A", "mine").unwrap_err();
        assert!(matches!(
            err,
            SyncError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));

        assert_eq!(gateway.push_page("1", 2, "A", "mine").unwrap(), 3);
        assert_eq!(gateway.body_of("1").as_deref(), Some("mine"));
    }

    #[test]
    fn move_keeps_version() {
        let gateway = MemoryGateway::new();
        gateway.create_page("DEV", "1", "A", None, "a");
        gateway.create_page("DEV", "2", "B", Some("1"), "b");
        gateway.move_page("2", None);

        let tree = gateway.list_full_tree("DEV").unwrap();
        assert!(tree.iter().all(|e| e.parent_id.is_none()));
        assert_eq!(gateway.version_of("2"), Some(1));
    }
}
