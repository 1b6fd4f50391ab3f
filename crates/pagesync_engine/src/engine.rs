//! The sync engine.

use crate::config::{SyncConfig, SyncMode};
use crate::conflict::{ConflictGuard, PushCheck, PushOutcome};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{ChangedPage, RemoteGateway, RemotePage, TreeEntry};
use crate::state::{PageOutcome, PassKind, SyncReport, SyncState};
use pagesync_storage::{
    hash_content, MetadataStore, PageFileStore, PageHeader, PageRecord, PathCodec, SpaceIndex,
    SpaceLock, StorageError, Timestamp, ATTACHMENTS_DIR, PAGE_EXTENSION,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Planned work for one entry of a full listing.
enum Action {
    Fetch(String),
    Relocate(TreeEntry),
    Unchanged,
}

impl Action {
    fn fetch_id(&self) -> Option<&str> {
        match self {
            Action::Fetch(id) => Some(id),
            _ => None,
        }
    }
}

/// Keeps local mirrors of remote spaces up to date.
///
/// Passes on the same space are serialized: in-process through a per-space
/// mutex, across processes through a [`SpaceLock`]. Different spaces can be
/// synced concurrently from several threads.
pub struct SyncEngine<G: RemoteGateway> {
    config: SyncConfig,
    gateway: Arc<G>,
    codec: PathCodec,
    files: PageFileStore,
    metadata: MetadataStore,
    states: RwLock<HashMap<String, SyncState>>,
    space_mutexes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cancelled: AtomicBool,
}

impl<G: RemoteGateway> SyncEngine<G> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, gateway: G) -> Self {
        Self::with_shared_gateway(config, Arc::new(gateway))
    }

    /// Creates a sync engine over a gateway shared with other owners.
    pub fn with_shared_gateway(config: SyncConfig, gateway: Arc<G>) -> Self {
        Self {
            codec: PathCodec::new(&config.storage),
            files: PageFileStore::new(&config.storage),
            metadata: MetadataStore::new(&config.storage),
            config,
            gateway,
            states: RwLock::new(HashMap::new()),
            space_mutexes: Mutex::new(HashMap::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the path codec.
    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    /// Returns the metadata store.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Returns a conflict guard sharing this engine's gateway.
    pub fn conflict_guard(&self) -> ConflictGuard<G> {
        ConflictGuard::new(Arc::clone(&self.gateway), self.config.retry.clone())
    }

    /// Gets the state of a space.
    pub fn state(&self, space_key: &str) -> SyncState {
        if let Some(state) = self.states.read().get(space_key) {
            return *state;
        }
        if self.codec.metadata_path(space_key).is_file() {
            SyncState::Idle
        } else {
            SyncState::Uninitialized
        }
    }

    /// Requests cancellation of running passes. Passes stop before their
    /// next page. The flag stays set until [`reset_cancel`](Self::reset_cancel).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_state(&self, space_key: &str, state: SyncState) {
        self.states.write().insert(space_key.to_string(), state);
    }

    fn space_mutex(&self, space_key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.space_mutexes
                .lock()
                .entry(space_key.to_string())
                .or_default(),
        )
    }

    /// Syncs a space, choosing incremental or full mode by policy.
    pub fn sync_space(&self, space_key: &str, force_full: bool) -> SyncResult<SyncReport> {
        self.sync_space_at(space_key, force_full, Timestamp::now())
    }

    /// Syncs a space as if the current time were `now`.
    pub fn sync_space_at(
        &self,
        space_key: &str,
        force_full: bool,
        now: Timestamp,
    ) -> SyncResult<SyncReport> {
        let mutex = self.space_mutex(space_key);
        let _guard = mutex.lock();
        let _lock = SpaceLock::acquire(&self.codec.space_dir(space_key), space_key)?;

        let start = Instant::now();
        let (mut index, recovered) = match self.metadata.load(space_key) {
            Ok(Some(index)) => (index, false),
            Ok(None) => (SpaceIndex::new(space_key), false),
            Err(e) if e.is_corrupt_local_state() => {
                warn!(space = space_key, error = %e, "metadata index unreadable, rebuilding from remote");
                (SpaceIndex::new(space_key), true)
            }
            Err(e) => return Err(e.into()),
        };

        let mode = self.config.choose_mode(&index, force_full || recovered, now);
        let kind = if mode.is_full() {
            PassKind::Full
        } else {
            PassKind::Incremental
        };
        self.set_state(space_key, SyncState::Syncing(kind));
        info!(space = space_key, ?mode, pages = index.len(), "sync pass started");

        let result = if mode.is_full() {
            self.full_pass(&mut index, mode, now)
        } else {
            self.incremental_pass(&mut index, now)
        };

        // Idle or Uninitialized again, depending on whether anything was committed.
        self.states.write().remove(space_key);

        let mut report = result?;
        report.duration = start.elapsed();
        info!(
            space = space_key,
            created = report.created,
            updated = report.updated,
            moved = report.moved,
            deleted = report.deleted,
            unchanged = report.unchanged,
            swept = report.swept,
            failed = report.failed.len(),
            "sync pass finished"
        );
        Ok(report)
    }

    /// Re-fetches a single page and rewrites it locally, creating missing
    /// ancestors. Watermarks are left alone.
    pub fn resync_page(&self, space_key: &str, page_id: &str) -> SyncResult<PageOutcome> {
        let mutex = self.space_mutex(space_key);
        let _guard = mutex.lock();
        let _lock = SpaceLock::acquire(&self.codec.space_dir(space_key), space_key)?;

        let mut index = self.metadata.load_or_new(space_key)?;
        let page = self.fetch(page_id)?;
        let mut report = SyncReport::new(space_key, SyncMode::Incremental);
        let outcome = self.apply_with_parents(&mut index, page, Timestamp::now(), &mut report);
        self.metadata.save(&index)?;
        let outcome = outcome?;
        info!(space = space_key, page = page_id, ?outcome, "page resynced");
        Ok(outcome)
    }

    /// Checks whether a local edit based on `assumed_version` can be pushed.
    /// The owning space is found through the local indexes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownPage`] if no synced space holds the page.
    pub fn check_push_conflict(&self, page_id: &str, assumed_version: u64) -> SyncResult<PushCheck> {
        let (space_key, _) = self
            .metadata
            .locate(page_id)?
            .ok_or_else(|| SyncError::UnknownPage(page_id.to_string()))?;
        self.conflict_guard()
            .guard_push(&space_key, page_id, assumed_version)
    }

    /// Pushes the local copy of a page if the remote has not moved on, then
    /// records the new version locally.
    pub fn push_local_edit(&self, space_key: &str, page_id: &str) -> SyncResult<PushOutcome> {
        let mutex = self.space_mutex(space_key);
        let _guard = mutex.lock();
        let _lock = SpaceLock::acquire(&self.codec.space_dir(space_key), space_key)?;

        let mut index = self
            .metadata
            .load(space_key)?
            .ok_or_else(|| SyncError::UnknownPage(page_id.to_string()))?;
        let record = index
            .page(page_id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownPage(page_id.to_string()))?;
        let path = self.codec.resolve_path(&index, page_id)?;
        let local = self.files.read(&path).map_err(|e| match e {
            StorageError::CorruptHeader { .. } => SyncError::CorruptLocalState(e.to_string()),
            other => other.into(),
        })?;

        let guard = self.conflict_guard();
        if let PushCheck::Conflict(conflict) = guard.guard_push(space_key, page_id, record.version)? {
            return Ok(PushOutcome::Conflict(conflict));
        }

        // Title comes from the file header; editing it renames the page.
        let title = match local.header.title.trim() {
            "" => record.title.clone(),
            edited => edited.to_string(),
        };
        let pushed = self
            .gateway
            .push_page(page_id, record.version, &title, &local.content);
        let new_version = match pushed {
            Ok(version) => version,
            Err(e) => {
                let conflict = ConflictGuard::<G>::conflict_from_error(space_key, e)?;
                warn!(%conflict, "push rejected by remote");
                return Ok(PushOutcome::Conflict(conflict));
            }
        };

        let now = Timestamp::now();
        let mut updated = record;
        updated.title = title;
        updated.version = new_version;
        updated.content_hash = hash_content(&local.content);
        updated.last_synced_at = now;
        self.place_page(&mut index, updated, &local.content, now)?;
        self.metadata.save(&index)?;
        info!(space = space_key, page = page_id, new_version, "local edit pushed");
        Ok(PushOutcome::Pushed { new_version })
    }

    fn fetch(&self, page_id: &str) -> SyncResult<RemotePage> {
        self.config
            .retry
            .run("fetch_page", || self.gateway.fetch_page(page_id))
    }

    /// Fetches pages concurrently, at most `fetch_workers` at a time.
    /// Results come back in input order.
    fn prefetch(&self, ids: &[&str]) -> Vec<SyncResult<RemotePage>> {
        if self.config.fetch_workers <= 1 || ids.len() <= 1 {
            return ids.iter().map(|id| self.fetch(id)).collect();
        }
        let mut results = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.fetch_workers) {
            std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|id| scope.spawn(move || self.fetch(id)))
                    .collect();
                for handle in handles {
                    results.push(
                        handle
                            .join()
                            .unwrap_or_else(|_| Err(SyncError::transport_fatal("fetch worker panicked"))),
                    );
                }
            });
        }
        results
    }

    fn commit(&self, index: &SpaceIndex) -> SyncResult<()> {
        self.metadata.save(index)?;
        Ok(())
    }

    fn incremental_pass(&self, index: &mut SpaceIndex, now: Timestamp) -> SyncResult<SyncReport> {
        let space_key = index.space_key.clone();
        let mut report = SyncReport::new(&space_key, SyncMode::Incremental);
        let since = index.last_incremental_sync_at.unwrap_or(Timestamp::EPOCH);

        let mut changes: Vec<ChangedPage> = self.config.retry.run("list_changed_since", || {
            self.gateway.list_changed_since(&space_key, since)
        })?;
        changes.sort_by(|a, b| a.modified_at.cmp(&b.modified_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(max) = self.config.max_pages_per_pass {
            changes.truncate(max);
        }
        debug!(space = %space_key, %since, changed = changes.len(), "changed pages listed");

        let mut watermark = index.last_incremental_sync_at;
        let mut failed_before = false;
        let mut processed = 0;
        let chunk_len = self.config.fetch_workers.max(1);

        for chunk in changes.chunks(chunk_len) {
            let ids: Vec<&str> = chunk.iter().map(|c| c.id.as_str()).collect();
            let fetched = self.prefetch(&ids);

            for (change, page) in chunk.iter().zip(fetched) {
                if self.is_cancelled() {
                    index.last_incremental_sync_at = watermark;
                    self.commit(index)?;
                    info!(space = %space_key, processed, "incremental pass cancelled");
                    return Err(SyncError::Cancelled);
                }

                match page.and_then(|page| self.apply_with_parents(index, page, now, &mut report)) {
                    Ok(outcome) => {
                        report.record(outcome);
                        if !failed_before {
                            watermark = Some(change.modified_at);
                        }
                    }
                    Err(e) => {
                        warn!(space = %space_key, page = %change.id, error = %e, "page sync failed");
                        report.fail(&change.id, &e);
                        failed_before = true;
                    }
                }

                processed += 1;
                if processed % self.config.commit_batch_size.max(1) == 0 {
                    index.last_incremental_sync_at = watermark;
                    self.commit(index)?;
                }
            }
        }

        index.last_incremental_sync_at = watermark;
        self.commit(index)?;
        report.watermark = watermark;
        Ok(report)
    }

    /// Applies a fetched page, first fetching and applying any ancestors
    /// that are not materialized yet. Ancestors count as created.
    fn apply_with_parents(
        &self,
        index: &mut SpaceIndex,
        page: RemotePage,
        now: Timestamp,
        report: &mut SyncReport,
    ) -> SyncResult<PageOutcome> {
        let mut pending = vec![page];
        let mut seen = HashSet::new();

        loop {
            let missing_parent = match pending.last() {
                Some(top) => top
                    .parent_id
                    .clone()
                    .filter(|parent| !index.contains(parent)),
                None => None,
            };
            let Some(parent) = missing_parent else { break };
            if !seen.insert(parent.clone()) || pending.iter().any(|p| p.id == parent) {
                let child = pending.last().map(|p| p.id.clone()).unwrap_or_default();
                return Err(SyncError::structural(
                    child,
                    format!("ancestor chain revisits {parent}"),
                ));
            }
            debug!(page = %parent, "fetching unmaterialized parent");
            pending.push(self.fetch(&parent)?);
        }

        let mut outcome = PageOutcome::Unchanged;
        while let Some(page) = pending.pop() {
            outcome = self.apply_remote_page(index, &page, now)?;
            if !pending.is_empty() {
                report.record(outcome);
            }
        }
        Ok(outcome)
    }

    /// Writes a fetched page to its resolved location and indexes it.
    fn apply_remote_page(
        &self,
        index: &mut SpaceIndex,
        page: &RemotePage,
        now: Timestamp,
    ) -> SyncResult<PageOutcome> {
        if page.space_key != index.space_key {
            return Err(SyncError::structural(
                &page.id,
                format!("page belongs to space {}", page.space_key),
            ));
        }

        if !page.space_name.is_empty() && page.space_name != index.space_name {
            debug!(space = %index.space_key, name = %page.space_name, "space name updated");
            index.space_name = page.space_name.clone();
        }

        let hash = hash_content(&page.body);
        let candidate = PageRecord::new(
            page.id.clone(),
            page.title.clone(),
            page.version,
            page.parent_id.clone(),
        )
        .with_content_hash(hash)
        .with_url(page.url.clone())
        .with_last_synced_at(now);

        let Some(existing) = index.page(&page.id).cloned() else {
            self.place_page(index, candidate, &page.body, now)?;
            debug!(page = %page.id, "page created");
            return Ok(PageOutcome::Created);
        };

        let new_path = self.codec.resolve_candidate(index, &candidate)?;
        let same_shape = existing.version == candidate.version
            && existing.content_hash == candidate.content_hash
            && existing.parent_id == candidate.parent_id
            && existing.title == candidate.title;
        if same_shape && self.local_copy_intact(&new_path, &existing) {
            return Ok(PageOutcome::Unchanged);
        }

        let moved = self.place_page(index, candidate, &page.body, now)?;
        debug!(page = %page.id, moved, "page updated");
        Ok(PageOutcome::Updated { moved })
    }

    fn local_copy_intact(&self, path: &Path, record: &PageRecord) -> bool {
        match self.files.read(path) {
            Ok(file) => file.header.page_id == record.id && file.header.version == record.version,
            Err(_) => false,
        }
    }

    fn header_for(&self, index: &SpaceIndex, record: &PageRecord, now: Timestamp) -> PageHeader {
        PageHeader {
            page_id: record.id.clone(),
            title: record.title.clone(),
            space_key: index.space_key.clone(),
            version: record.version,
            url: record.url.clone(),
            synced_at: now,
        }
    }

    /// Writes `body` at the location `record` resolves to, carries over the
    /// rest of the old page directory, removes the old file and finally
    /// indexes the record. Returns true if the page changed parent.
    fn place_page(
        &self,
        index: &mut SpaceIndex,
        record: PageRecord,
        body: &str,
        now: Timestamp,
    ) -> SyncResult<bool> {
        let new_path = self.codec.resolve_candidate(index, &record)?;
        let previous_parent = index.page(&record.id).map(|p| p.parent_id.clone());
        let old_path = match previous_parent {
            Some(_) => self.codec.resolve_path(index, &record.id).ok(),
            None => None,
        };

        // Both names may be the same file on case-insensitive filesystems.
        let mut case_only = false;
        if let Some(old) = old_path.as_deref().filter(|old| differs_only_in_case(old, &new_path)) {
            self.files.rename(old, &new_path)?;
            case_only = true;
        }

        self.files
            .write(&new_path, body, &self.header_for(index, &record, now))?;

        if let Some(old_path) = old_path.filter(|old| *old != new_path && !case_only) {
            self.relocate_leftovers(&index.space_key, &old_path, &new_path)?;
        }

        let moved = matches!(&previous_parent, Some(parent) if *parent != record.parent_id);
        index.upsert_page(record);
        Ok(moved)
    }

    fn relocate_leftovers(&self, space_key: &str, old_path: &Path, new_path: &Path) -> SyncResult<()> {
        let (Some(old_dir), Some(new_dir)) = (old_path.parent(), new_path.parent()) else {
            return Ok(());
        };
        if old_dir != new_dir {
            let moved = self.files.move_dir_contents(old_dir, new_dir, old_path)?;
            debug!(from = %old_dir.display(), to = %new_dir.display(), moved, "page directory relocated");
        }
        self.files.remove(old_path)?;
        if old_dir != new_dir {
            self.files
                .prune_empty_dirs(old_dir, &self.codec.space_dir(space_key))?;
        }
        Ok(())
    }

    /// Moves a page whose title or parent changed without a new version,
    /// keeping the local body as it is.
    fn relocate_local(
        &self,
        index: &mut SpaceIndex,
        entry: &TreeEntry,
        now: Timestamp,
    ) -> SyncResult<PageOutcome> {
        let existing = index
            .page(&entry.id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownPage(entry.id.clone()))?;
        let old_path = self.codec.resolve_path(index, &entry.id)?;
        let local = self.files.read(&old_path)?;

        let mut record = existing;
        record.title = entry.title.clone();
        record.parent_id = entry.parent_id.clone();
        record.last_synced_at = now;

        let moved = self.place_page(index, record, &local.content, now)?;
        debug!(page = %entry.id, moved, "page relocated without fetch");
        Ok(PageOutcome::Updated { moved })
    }

    fn full_pass(
        &self,
        index: &mut SpaceIndex,
        mode: SyncMode,
        now: Timestamp,
    ) -> SyncResult<SyncReport> {
        let first = self.full_pass_once(index, mode, now)?;
        if index.validate_forest().dangling.is_empty() {
            return self.finish_full_pass(index, first, now);
        }

        warn!(space = %index.space_key, "dangling parents after full pass, running it again");
        let mut second = self.full_pass_once(index, mode, now)?;
        second.absorb_counts(&first);
        for (page, parent) in index.validate_forest().dangling {
            second.fail(
                &page,
                &SyncError::structural(&page, format!("parent {parent} is not materialized")),
            );
        }
        self.finish_full_pass(index, second, now)
    }

    fn finish_full_pass(
        &self,
        index: &mut SpaceIndex,
        mut report: SyncReport,
        now: Timestamp,
    ) -> SyncResult<SyncReport> {
        if report.is_clean() && index.validate_forest().is_valid() {
            report.swept += self.sweep_strays(index)?;
        }
        if report.is_clean() {
            index.last_full_sync_at = Some(now);
            index.last_incremental_sync_at = Some(now);
        } else {
            warn!(
                space = %index.space_key,
                failed = report.failed.len(),
                "full pass incomplete, watermarks not advanced"
            );
        }
        report.watermark = index.last_incremental_sync_at;
        self.commit(index)?;
        Ok(report)
    }

    fn full_pass_once(
        &self,
        index: &mut SpaceIndex,
        mode: SyncMode,
        now: Timestamp,
    ) -> SyncResult<SyncReport> {
        let space_key = index.space_key.clone();
        let mut report = SyncReport::new(&space_key, mode);

        let tree = self
            .config
            .retry
            .run("list_full_tree", || self.gateway.list_full_tree(&space_key))?;
        if tree.is_empty() {
            if index.is_empty() {
                return Err(SyncError::RemoteNotFound(format!(
                    "space {space_key} has no pages or does not exist"
                )));
            }
            warn!(space = %space_key, pages = index.len(), "remote listing is empty, keeping local pages");
            report.fail(
                &space_key,
                &SyncError::structural(&space_key, "remote listing is empty, local pages kept"),
            );
            return Ok(report);
        }
        let listed: HashSet<String> = tree.iter().map(|e| e.id.clone()).collect();
        let (ordered, quarantined) = order_listing(tree);
        for (id, reason) in &quarantined {
            warn!(space = %space_key, page = %id, reason = %reason, "page quarantined");
            report.fail(id, &SyncError::structural(id, reason.clone()));
        }

        let plan: Vec<Action> = ordered
            .into_iter()
            .map(|entry| self.plan_entry(index, entry))
            .collect();

        let mut processed = 0;
        for chunk in plan.chunks(self.config.fetch_workers.max(1)) {
            let ids: Vec<&str> = chunk.iter().filter_map(Action::fetch_id).collect();
            let mut fetched: HashMap<String, SyncResult<RemotePage>> = ids
                .iter()
                .map(|id| id.to_string())
                .zip(self.prefetch(&ids))
                .collect();

            for action in chunk {
                if self.is_cancelled() {
                    self.commit(index)?;
                    info!(space = %space_key, processed, "full pass cancelled");
                    return Err(SyncError::Cancelled);
                }

                let (id, result) = match action {
                    Action::Unchanged => {
                        report.record(PageOutcome::Unchanged);
                        continue;
                    }
                    Action::Fetch(id) => {
                        let page = fetched
                            .remove(id)
                            .unwrap_or_else(|| Err(SyncError::UnknownPage(id.clone())));
                        let result = page
                            .and_then(|page| self.apply_with_parents(index, page, now, &mut report));
                        (id, result)
                    }
                    Action::Relocate(entry) => {
                        let result = match self.relocate_local(index, entry, now) {
                            Ok(outcome) => Ok(outcome),
                            Err(e) => {
                                debug!(page = %entry.id, error = %e, "relocation failed, fetching instead");
                                self.fetch(&entry.id).and_then(|page| {
                                    self.apply_with_parents(index, page, now, &mut report)
                                })
                            }
                        };
                        (&entry.id, result)
                    }
                };

                match result {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => {
                        warn!(space = %space_key, page = %id, error = %e, "page sync failed");
                        report.fail(id, &e);
                    }
                }

                processed += 1;
                if processed % self.config.commit_batch_size.max(1) == 0 {
                    self.commit(index)?;
                }
            }
        }

        // Quarantined ids are part of the listing, so they are kept too.
        report.deleted += self.delete_absent(index, &listed)?;
        self.commit(index)?;
        Ok(report)
    }

    fn plan_entry(&self, index: &SpaceIndex, entry: TreeEntry) -> Action {
        let Some(local) = index.page(&entry.id) else {
            return Action::Fetch(entry.id);
        };
        if local.version != entry.version {
            return Action::Fetch(entry.id);
        }
        let intact = self
            .codec
            .resolve_path(index, &entry.id)
            .map(|path| self.local_copy_intact(&path, local))
            .unwrap_or(false);
        if !intact {
            return Action::Fetch(entry.id);
        }
        if local.parent_id != entry.parent_id || local.title != entry.title {
            return Action::Relocate(entry);
        }
        Action::Unchanged
    }

    /// Removes indexed pages missing from `keep`, deepest first.
    fn delete_absent(&self, index: &mut SpaceIndex, keep: &HashSet<String>) -> SyncResult<usize> {
        let mut doomed: Vec<(usize, String)> = index
            .pages()
            .filter(|p| !keep.contains(&p.id))
            .map(|p| (index.depth(&p.id).unwrap_or(0), p.id.clone()))
            .collect();
        doomed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let space_dir = self.codec.space_dir(&index.space_key);
        let mut deleted = 0;
        for (_, id) in doomed {
            if let Ok(path) = self.codec.resolve_path(index, &id) {
                self.files.remove(&path)?;
                if let Some(dir) = path.parent() {
                    let attachments = dir.join(ATTACHMENTS_DIR);
                    if attachments.is_dir() {
                        fs::remove_dir_all(&attachments).map_err(StorageError::from)?;
                    }
                    self.files.prune_empty_dirs(dir, &space_dir)?;
                }
            }
            index.remove_page(&id);
            info!(space = %index.space_key, page = %id, "page deleted");
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Removes leaves and page directories that do not match the index.
    fn sweep_strays(&self, index: &SpaceIndex) -> SyncResult<usize> {
        let mut expected: HashMap<PathBuf, PathBuf> = HashMap::new();
        for page in index.pages() {
            let path = self.codec.resolve_path(index, &page.id)?;
            if let Some(dir) = path.parent() {
                expected.insert(dir.to_path_buf(), path);
            }
        }
        let space_dir = self.codec.space_dir(&index.space_key);
        if !space_dir.is_dir() {
            return Ok(0);
        }
        let swept = self.sweep_dir(&space_dir, None, &expected)?;
        if swept > 0 {
            info!(space = %index.space_key, swept, "stray files swept");
        }
        Ok(swept)
    }

    fn sweep_dir(
        &self,
        dir: &Path,
        leaf: Option<&Path>,
        expected: &HashMap<PathBuf, PathBuf>,
    ) -> SyncResult<usize> {
        let mut swept = 0;
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(StorageError::from)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;
        entries.sort();

        for path in entries {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            if path.is_dir() {
                if leaf.is_some() && name == ATTACHMENTS_DIR {
                    continue;
                }
                match expected.get(&path) {
                    Some(child_leaf) => swept += self.sweep_dir(&path, Some(child_leaf), expected)?,
                    None => {
                        swept += self.sweep_unexpected_dir(&path)?;
                        if path.is_dir() {
                            warn!(dir = %path.display(), "leaving unexpected directory in place");
                        }
                    }
                }
            } else if name.starts_with(".tmp-") {
                self.files.remove(&path)?;
                swept += 1;
            } else if path.extension().is_some_and(|ext| ext == PAGE_EXTENSION)
                && leaf != Some(path.as_path())
            {
                warn!(file = %path.display(), "removing stray page file");
                self.files.remove(&path)?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// Removes page files and temporaries from a directory the index does
    /// not account for, then the directory itself if nothing else is left.
    /// Anything that is not a readable page file is kept.
    fn sweep_unexpected_dir(&self, dir: &Path) -> SyncResult<usize> {
        let mut swept = 0;
        let entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(StorageError::from)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;
        for path in entries {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if path.is_dir() {
                swept += self.sweep_unexpected_dir(&path)?;
            } else if name.starts_with(".tmp-")
                || (path.extension().is_some_and(|ext| ext == PAGE_EXTENSION)
                    && self.files.read(&path).is_ok())
            {
                warn!(file = %path.display(), "removing misplaced page file");
                self.files.remove(&path)?;
                swept += 1;
            }
        }
        if let Some(parent) = dir.parent() {
            self.files.prune_empty_dirs(dir, parent)?;
        }
        Ok(swept)
    }
}

/// True if `a` and `b` are distinct names in one directory that differ only
/// in ASCII case.
fn differs_only_in_case(a: &Path, b: &Path) -> bool {
    if a == b || a.parent() != b.parent() {
        return false;
    }
    match (a.file_name(), b.file_name()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

/// Orders a remote listing parents-first and separates out entries that
/// cannot be placed: members of parent cycles, entries whose parent is not
/// listed, and their descendants.
fn order_listing(tree: Vec<TreeEntry>) -> (Vec<TreeEntry>, Vec<(String, String)>) {
    let parents: HashMap<&str, Option<&str>> = tree
        .iter()
        .map(|e| (e.id.as_str(), e.parent_id.as_deref()))
        .collect();

    let mut depths: HashMap<String, usize> = HashMap::new();
    let mut quarantined = Vec::new();
    for entry in &tree {
        let mut seen = HashSet::new();
        seen.insert(entry.id.as_str());
        let mut depth = 0;
        let mut cursor = entry.parent_id.as_deref();
        let mut problem = None;
        while let Some(parent) = cursor {
            if !seen.insert(parent) {
                problem = Some(format!("ancestor chain revisits {parent}"));
                break;
            }
            match parents.get(parent) {
                Some(next) => {
                    depth += 1;
                    cursor = *next;
                }
                None => {
                    problem = Some(format!("parent {parent} is not in the remote listing"));
                    break;
                }
            }
        }
        match problem {
            Some(reason) => quarantined.push((entry.id.clone(), reason)),
            None => {
                depths.insert(entry.id.clone(), depth);
            }
        }
    }

    let mut ordered: Vec<TreeEntry> = tree
        .into_iter()
        .filter(|e| depths.contains_key(&e.id))
        .collect();
    ordered.sort_by(|a, b| depths[&a.id].cmp(&depths[&b.id]).then_with(|| a.id.cmp(&b.id)));
    quarantined.sort();
    (ordered, quarantined)
}
