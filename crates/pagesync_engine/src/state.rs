//! Per-space sync state and pass reports.

use crate::config::SyncMode;
use crate::error::{FailureKind, SyncError};
use pagesync_storage::Timestamp;
use std::time::Duration;

/// Which kind of pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Changed-since pass.
    Incremental,
    /// Full reconciliation.
    Full,
}

/// The sync state of one space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Never synced.
    Uninitialized,
    /// Synced at least once, no pass running.
    Idle,
    /// A pass is running.
    Syncing(PassKind),
}

impl SyncState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing(_))
    }
}

/// What happened to a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// First materialization.
    Created,
    /// Content, title or location changed.
    Updated {
        /// True if the page changed parent.
        moved: bool,
    },
    /// Nothing to do.
    Unchanged,
}

/// A page that could not be synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    /// Page id.
    pub page_id: String,
    /// Error category.
    pub kind: FailureKind,
    /// Error message.
    pub message: String,
}

/// Result of one pass over a space.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Space key.
    pub space_key: String,
    /// Kind of pass that ran.
    pub mode: SyncMode,
    /// Pages materialized for the first time.
    pub created: usize,
    /// Pages rewritten or relocated, moves included.
    pub updated: usize,
    /// Subset of `updated` that changed parent.
    pub moved: usize,
    /// Pages removed after disappearing remotely.
    pub deleted: usize,
    /// Pages examined that needed no work.
    pub unchanged: usize,
    /// Stray files and directories removed by a full pass.
    pub swept: usize,
    /// Pages that failed.
    pub failed: Vec<PageFailure>,
    /// Incremental watermark after the pass.
    pub watermark: Option<Timestamp>,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl SyncReport {
    pub(crate) fn new(space_key: &str, mode: SyncMode) -> Self {
        Self {
            space_key: space_key.to_string(),
            mode,
            created: 0,
            updated: 0,
            moved: 0,
            deleted: 0,
            unchanged: 0,
            swept: 0,
            failed: Vec::new(),
            watermark: None,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if no page failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of pages created, updated or deleted.
    pub fn changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    /// Looks up the failure recorded for a page.
    pub fn failure(&self, page_id: &str) -> Option<&PageFailure> {
        self.failed.iter().find(|f| f.page_id == page_id)
    }

    pub(crate) fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Created => self.created += 1,
            PageOutcome::Updated { moved } => {
                self.updated += 1;
                if moved {
                    self.moved += 1;
                }
            }
            PageOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub(crate) fn fail(&mut self, page_id: &str, error: &SyncError) {
        self.failed.push(PageFailure {
            page_id: page_id.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    /// Adds the counters of an earlier run of the same pass.
    pub(crate) fn absorb_counts(&mut self, earlier: &SyncReport) {
        self.created += earlier.created;
        self.updated += earlier.updated;
        self.moved += earlier.moved;
        self.deleted += earlier.deleted;
        self.swept += earlier.swept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_checks() {
        assert!(SyncState::Syncing(PassKind::Full).is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::Uninitialized.is_active());
    }

    #[test]
    fn report_counters() {
        let mut report = SyncReport::new("DEV", SyncMode::Incremental);
        report.record(PageOutcome::Created);
        report.record(PageOutcome::Updated { moved: true });
        report.record(PageOutcome::Updated { moved: false });
        report.record(PageOutcome::Unchanged);
        report.fail("9", &SyncError::RemoteNotFound("9".into()));

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 2);
        assert_eq!(report.moved, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.changes(), 3);
        assert!(!report.is_clean());
        assert_eq!(report.failure("9").unwrap().kind, FailureKind::RemoteNotFound);
    }

    #[test]
    fn absorb_keeps_own_failures() {
        let mut first = SyncReport::new("DEV", SyncMode::Full);
        first.created = 2;
        first.fail("1", &SyncError::Cancelled);

        let mut second = SyncReport::new("DEV", SyncMode::Full);
        second.deleted = 1;
        second.absorb_counts(&first);

        assert_eq!(second.created, 2);
        assert_eq!(second.deleted, 1);
        assert!(second.is_clean());
    }
}
