//! Pre-push version checks.
//!
//! A push is only safe if the remote page is still at the version the local
//! edit started from. The check and the push are separate calls, so a remote
//! edit can still slip in between; the remote's own expected-version check
//! on push catches that case.

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A local edit that would overwrite a newer remote version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConflict {
    /// Owning space.
    pub space_key: String,
    /// Page id.
    pub page_id: String,
    /// Version the local edit is based on.
    pub local_version: u64,
    /// Version found remotely.
    pub remote_version: u64,
}

impl fmt::Display for PushConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page {} in {} changed remotely: local version {}, remote version {}",
            self.page_id, self.space_key, self.local_version, self.remote_version
        )
    }
}

/// Outcome of a pre-push check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCheck {
    /// The remote is still at the assumed version.
    Ok,
    /// The remote moved on.
    Conflict(PushConflict),
}

impl PushCheck {
    /// Returns true if pushing is safe.
    pub fn is_ok(&self) -> bool {
        matches!(self, PushCheck::Ok)
    }
}

/// Outcome of pushing a local edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The edit was accepted.
    Pushed {
        /// Version assigned by the remote.
        new_version: u64,
    },
    /// The edit was not pushed.
    Conflict(PushConflict),
}

/// Compares assumed versions with the remote store.
pub struct ConflictGuard<G: RemoteGateway> {
    gateway: Arc<G>,
    retry: RetryConfig,
}

impl<G: RemoteGateway> ConflictGuard<G> {
    /// Creates a guard over `gateway`.
    pub fn new(gateway: Arc<G>, retry: RetryConfig) -> Self {
        Self { gateway, retry }
    }

    /// Checks that the remote page is still at `assumed_version`.
    pub fn guard_push(
        &self,
        space_key: &str,
        page_id: &str,
        assumed_version: u64,
    ) -> SyncResult<PushCheck> {
        let remote_version = self
            .retry
            .run("fetch_version", || self.gateway.fetch_version(page_id))?;
        if remote_version == assumed_version {
            return Ok(PushCheck::Ok);
        }
        let conflict = PushConflict {
            space_key: space_key.to_string(),
            page_id: page_id.to_string(),
            local_version: assumed_version,
            remote_version,
        };
        warn!(%conflict, "push conflict detected");
        Ok(PushCheck::Conflict(conflict))
    }

    /// Turns a [`SyncError::VersionConflict`] returned by a push into a
    /// structured conflict; other errors pass through.
    pub fn conflict_from_error(space_key: &str, error: SyncError) -> SyncResult<PushConflict> {
        match error {
            SyncError::VersionConflict {
                page_id,
                expected,
                actual,
            } => Ok(PushConflict {
                space_key: space_key.to_string(),
                page_id,
                local_version: expected,
                remote_version: actual,
            }),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn guard_with_versions(edits: usize) -> ConflictGuard<MemoryGateway> {
        let gateway = MemoryGateway::new();
        gateway.create_page("DEV", "1", "A", None, "v1");
        for i in 0..edits {
            gateway.edit_page("1", &format!("edit {i}"));
        }
        ConflictGuard::new(Arc::new(gateway), RetryConfig::no_retry())
    }

    #[test]
    fn matching_version_is_ok() {
        let guard = guard_with_versions(3);
        assert!(guard.guard_push("DEV", "1", 4).unwrap().is_ok());
    }

    #[test]
    fn newer_remote_is_a_conflict() {
        let guard = guard_with_versions(4);
        let check = guard.guard_push("DEV", "1", 4).unwrap();
        assert_eq!(
            check,
            PushCheck::Conflict(PushConflict {
                space_key: "DEV".into(),
                page_id: "1".into(),
                local_version: 4,
                remote_version: 5,
            })
        );
    }

    #[test]
    fn missing_remote_page_is_an_error() {
        let guard = guard_with_versions(0);
        assert!(matches!(
            guard.guard_push("DEV", "404", 1),
            Err(SyncError::RemoteNotFound(_))
        ));
    }

    #[test]
    fn version_conflict_error_converts() {
        let err = SyncError::VersionConflict {
            page_id: "1".into(),
            expected: 2,
            actual: 3,
        };
        let conflict = ConflictGuard::<MemoryGateway>::conflict_from_error("DEV", err).unwrap();
        assert_eq!(conflict.remote_version, 3);
        assert!(conflict.to_string().contains("remote version 3"));

        let other = SyncError::Cancelled;
        assert!(ConflictGuard::<MemoryGateway>::conflict_from_error("DEV", other).is_err());
    }
}
