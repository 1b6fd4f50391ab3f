//! Core type definitions for the local mirror.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current format version of the persisted space index.
pub const INDEX_FORMAT_VERSION: u16 = 1;

/// A point in time, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self(millis)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    #[must_use]
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Returns this timestamp advanced by `duration`.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index entry for one mirrored page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Stable remote identifier.
    pub id: String,
    /// Display title; basis of the file name.
    pub title: String,
    /// Remote version at the time of the last sync.
    pub version: u64,
    /// Parent page, `None` for space roots.
    pub parent_id: Option<String>,
    /// Child page ids, sorted. Maintained by [`SpaceIndex`].
    #[serde(default)]
    pub child_ids: Vec<String>,
    /// SHA-256 hex digest of the last-synced body.
    pub content_hash: String,
    /// Canonical remote URL.
    #[serde(default)]
    pub url: String,
    /// When the page was last written locally.
    pub last_synced_at: Timestamp,
}

impl PageRecord {
    /// Creates a record with no children.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        version: u64,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            version,
            parent_id,
            child_ids: Vec::new(),
            content_hash: String::new(),
            url: String::new(),
            last_synced_at: Timestamp::EPOCH,
        }
    }

    /// Sets the content hash.
    #[must_use]
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = hash.into();
        self
    }

    /// Sets the canonical URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the last-synced timestamp.
    #[must_use]
    pub fn with_last_synced_at(mut self, at: Timestamp) -> Self {
        self.last_synced_at = at;
        self
    }

    /// Returns true if this page is a space root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Problems found when validating the page tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForestReport {
    /// Pages whose ancestor chain revisits itself.
    pub cycles: Vec<String>,
    /// `(page, parent)` pairs where the parent is not in the index.
    pub dangling: Vec<(String, String)>,
}

impl ForestReport {
    /// Returns true if the index is a valid forest.
    pub fn is_valid(&self) -> bool {
        self.cycles.is_empty() && self.dangling.is_empty()
    }
}

/// The persisted view of one space: page index plus sync watermarks.
///
/// # Invariants
///
/// - `pages` is a forest rooted at records with `parent_id == None`
/// - `child_ids` of every record lists exactly the indexed pages naming it as parent
/// - watermarks only move forward through a committed pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceIndex {
    /// Format version of the persisted file.
    pub format_version: u16,
    /// Stable space key.
    pub space_key: String,
    /// Display name of the space.
    pub space_name: String,
    /// Lower bound for the next "changed since" query.
    pub last_incremental_sync_at: Option<Timestamp>,
    /// When the last full reconciliation completed.
    pub last_full_sync_at: Option<Timestamp>,
    pages: BTreeMap<String, PageRecord>,
}

impl SpaceIndex {
    /// Creates an empty index for a space that has never been synced.
    pub fn new(space_key: impl Into<String>) -> Self {
        let space_key = space_key.into();
        Self {
            format_version: INDEX_FORMAT_VERSION,
            space_name: space_key.clone(),
            space_key,
            last_incremental_sync_at: None,
            last_full_sync_at: None,
            pages: BTreeMap::new(),
        }
    }

    /// Returns the number of indexed pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns true if no page is indexed.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Looks up a page.
    pub fn page(&self, id: &str) -> Option<&PageRecord> {
        self.pages.get(id)
    }

    /// Returns true if the page is indexed.
    pub fn contains(&self, id: &str) -> bool {
        self.pages.contains_key(id)
    }

    /// Iterates all records in id order.
    pub fn pages(&self) -> impl Iterator<Item = &PageRecord> {
        self.pages.values()
    }

    /// Returns all page ids in id order.
    pub fn page_ids(&self) -> Vec<String> {
        self.pages.keys().cloned().collect()
    }

    /// Inserts or replaces a page, keeping child lists consistent.
    ///
    /// Returns the previous record if there was one.
    pub fn upsert_page(&mut self, mut record: PageRecord) -> Option<PageRecord> {
        let previous = self.pages.remove(&record.id);

        if let Some(prev) = &previous {
            if prev.parent_id != record.parent_id {
                if let Some(old_parent) = prev.parent_id.as_deref() {
                    self.detach_child(old_parent, &record.id);
                }
            }
        }

        record.child_ids = self
            .pages
            .values()
            .filter(|p| p.parent_id.as_deref() == Some(record.id.as_str()))
            .map(|p| p.id.clone())
            .collect();

        if let Some(parent_id) = record.parent_id.clone() {
            if let Some(parent) = self.pages.get_mut(&parent_id) {
                if let Err(pos) = parent.child_ids.binary_search(&record.id) {
                    parent.child_ids.insert(pos, record.id.clone());
                }
            }
        }

        self.pages.insert(record.id.clone(), record);
        previous
    }

    /// Removes a page. Its children keep pointing at it until they are
    /// removed or moved themselves.
    pub fn remove_page(&mut self, id: &str) -> Option<PageRecord> {
        let removed = self.pages.remove(id)?;
        if let Some(parent_id) = removed.parent_id.as_deref() {
            self.detach_child(parent_id, id);
        }
        Some(removed)
    }

    fn detach_child(&mut self, parent_id: &str, child_id: &str) {
        if let Some(parent) = self.pages.get_mut(parent_id) {
            parent.child_ids.retain(|c| c != child_id);
        }
    }

    /// Lists the children of `parent_id` (space roots for `None`), sorted by
    /// title then id.
    pub fn list_children(&self, parent_id: Option<&str>) -> Vec<&PageRecord> {
        let mut children: Vec<&PageRecord> = match parent_id {
            Some(parent_id) => match self.pages.get(parent_id) {
                Some(parent) => parent
                    .child_ids
                    .iter()
                    .filter_map(|id| self.pages.get(id))
                    .collect(),
                None => Vec::new(),
            },
            None => self.pages.values().filter(|p| p.is_root()).collect(),
        };
        children.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        children
    }

    /// Returns the ancestor ids of a page that would hang under `parent_id`,
    /// ordered from the space root down to the immediate parent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Structural`] if a parent is not indexed or the
    /// chain revisits `page_id` or itself.
    pub fn ancestry(&self, page_id: &str, parent_id: Option<&str>) -> StorageResult<Vec<String>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(page_id.to_string());

        let mut cursor = parent_id.map(str::to_string);
        while let Some(current) = cursor {
            if !seen.insert(current.clone()) {
                return Err(StorageError::structural(
                    page_id,
                    format!("ancestor chain revisits {current}"),
                ));
            }
            let record = self.pages.get(&current).ok_or_else(|| {
                StorageError::structural(page_id, format!("parent {current} is not materialized"))
            })?;
            cursor = record.parent_id.clone();
            chain.push(current);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Returns the ancestor ids of an indexed page.
    pub fn ancestors_of(&self, page_id: &str) -> StorageResult<Vec<String>> {
        let record = self
            .pages
            .get(page_id)
            .ok_or_else(|| StorageError::structural(page_id, "page is not indexed"))?;
        self.ancestry(page_id, record.parent_id.as_deref())
    }

    /// Number of ancestors of an indexed page, `None` if unresolvable.
    pub fn depth(&self, page_id: &str) -> Option<usize> {
        self.ancestors_of(page_id).ok().map(|a| a.len())
    }

    /// Rebuilds every `child_ids` list from the parent links.
    pub fn rebuild_children(&mut self) {
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in self.pages.values() {
            if let Some(parent) = &record.parent_id {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(record.id.clone());
            }
        }
        for (id, record) in self.pages.iter_mut() {
            record.child_ids = children.remove(id).unwrap_or_default();
        }
    }

    /// Checks that the index is a forest.
    pub fn validate_forest(&self) -> ForestReport {
        let mut report = ForestReport::default();
        for record in self.pages.values() {
            if let Some(parent) = &record.parent_id {
                if !self.pages.contains_key(parent) {
                    report.dangling.push((record.id.clone(), parent.clone()));
                    continue;
                }
            }
            if let Err(StorageError::Structural { message, .. }) = self.ancestors_of(&record.id) {
                if message.contains("revisits") {
                    report.cycles.push(record.id.clone());
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, parent: Option<&str>) -> PageRecord {
        PageRecord::new(id, title, 1, parent.map(str::to_string))
    }

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_millis(1_000);
        assert_eq!(t.saturating_add(Duration::from_secs(2)), Timestamp(3_000));
        assert_eq!(Timestamp(3_000).saturating_since(t), Duration::from_secs(2));
        assert_eq!(t.saturating_since(Timestamp(3_000)), Duration::ZERO);
    }

    #[test]
    fn upsert_links_children_both_ways() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("2", "Child", Some("1")));
        index.upsert_page(record("1", "Root", None));

        assert_eq!(index.page("1").unwrap().child_ids, vec!["2".to_string()]);

        index.upsert_page(record("3", "Another", Some("1")));
        assert_eq!(index.page("1").unwrap().child_ids, vec!["2", "3"]);
    }

    #[test]
    fn moving_a_page_updates_both_parents() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "A", None));
        index.upsert_page(record("2", "B", None));
        index.upsert_page(record("3", "Leaf", Some("1")));

        let mut moved = index.page("3").unwrap().clone();
        moved.parent_id = Some("2".into());
        index.upsert_page(moved);

        assert!(index.page("1").unwrap().child_ids.is_empty());
        assert_eq!(index.page("2").unwrap().child_ids, vec!["3"]);
    }

    #[test]
    fn update_keeps_existing_children() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "A", None));
        index.upsert_page(record("2", "B", Some("1")));

        let renamed = record("1", "A renamed", None);
        index.upsert_page(renamed);
        assert_eq!(index.page("1").unwrap().child_ids, vec!["2"]);
    }

    #[test]
    fn remove_detaches_from_parent() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "A", None));
        index.upsert_page(record("2", "B", Some("1")));

        let removed = index.remove_page("2").unwrap();
        assert_eq!(removed.id, "2");
        assert!(index.page("1").unwrap().child_ids.is_empty());
        assert!(index.remove_page("2").is_none());
    }

    #[test]
    fn list_children_sorted_by_title() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "Root", None));
        index.upsert_page(record("2", "Zeta", Some("1")));
        index.upsert_page(record("3", "Alpha", Some("1")));
        index.upsert_page(record("4", "Other root", None));

        let titles: Vec<_> = index
            .list_children(Some("1"))
            .iter()
            .map(|p| p.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Alpha", "Zeta"]);

        let roots: Vec<_> = index.list_children(None).iter().map(|p| p.id.as_str()).collect();
        assert_eq!(roots, vec!["4", "1"]);
        assert!(index.list_children(Some("missing")).is_empty());
    }

    #[test]
    fn ancestry_is_root_first() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "A", None));
        index.upsert_page(record("2", "B", Some("1")));
        index.upsert_page(record("3", "C", Some("2")));

        assert_eq!(index.ancestors_of("3").unwrap(), vec!["1", "2"]);
        assert!(index.ancestors_of("1").unwrap().is_empty());
        assert_eq!(index.depth("3"), Some(2));
    }

    #[test]
    fn ancestry_rejects_missing_parent() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("2", "Orphan", Some("1")));

        let err = index.ancestors_of("2").unwrap_err();
        assert!(matches!(err, StorageError::Structural { .. }));
    }

    #[test]
    fn ancestry_rejects_cycle_through_candidate() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "A", None));
        index.upsert_page(record("2", "B", Some("1")));

        // Re-parenting 1 under its own child would close a loop.
        let err = index.ancestry("1", Some("2")).unwrap_err();
        assert!(err.to_string().contains("revisits"));
    }

    #[test]
    fn validate_forest_reports_problems() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "A", Some("2")));
        index.upsert_page(record("2", "B", Some("1")));
        index.upsert_page(record("3", "C", Some("404")));
        index.upsert_page(record("4", "D", None));

        let report = index.validate_forest();
        assert!(!report.is_valid());
        assert_eq!(report.cycles, vec!["1", "2"]);
        assert_eq!(report.dangling, vec![("3".to_string(), "404".to_string())]);
    }

    #[test]
    fn rebuild_children_repairs_lists() {
        let mut index = SpaceIndex::new("DEV");
        index.upsert_page(record("1", "A", None));
        index.upsert_page(record("2", "B", Some("1")));
        index.pages.get_mut("1").unwrap().child_ids.clear();

        index.rebuild_children();
        assert_eq!(index.page("1").unwrap().child_ids, vec!["2"]);
    }

    #[test]
    fn serde_round_trip_keeps_watermarks() {
        let mut index = SpaceIndex::new("DEV");
        index.last_full_sync_at = Some(Timestamp(10));
        index.last_incremental_sync_at = Some(Timestamp(20));
        index.upsert_page(record("1", "A", None).with_content_hash("abc"));

        let json = serde_json::to_string(&index).unwrap();
        let decoded: SpaceIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, index);
        assert!(json.contains("\"last_full_sync_at\":10"));
    }
}
