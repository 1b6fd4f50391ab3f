//! # PageSync Engine
//!
//! Keeps a local filesystem mirror consistent with a remote hierarchical
//! document store.
//!
//! This crate provides:
//! - Policy for choosing incremental or full passes
//! - The incremental "changed since" pass with a resumable watermark
//! - The full reconciliation pass (moves, renames, deletions, stray sweep)
//! - Pre-push conflict detection
//! - Retry with exponential backoff for remote calls
//! - An in-memory remote store for tests
//!
//! ## Key Invariants
//!
//! - Remote ids map one-to-one to local page directories
//! - An index entry is only written after its file is on disk
//! - The watermark never moves past a page that failed
//! - Full-pass watermarks only advance after a clean pass
//!
//! ## Example
//!
//! ```rust
//! use pagesync_engine::{MemoryGateway, RetryConfig, SyncConfig, SyncEngine};
//! use pagesync_storage::StorageConfig;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let gateway = MemoryGateway::new();
//! gateway.create_page("DEV", "1", "Home", None, "<p>Welcome</p>");
//!
//! let config = SyncConfig::new(StorageConfig::new(dir.path()), "https://wiki.example.com")
//!     .with_retry(RetryConfig::no_retry());
//! let engine = SyncEngine::new(config, gateway);
//!
//! let report = engine.sync_space("DEV", false).unwrap();
//! assert_eq!(report.created, 1);
//! assert!(dir.path().join("DEV/1/Home.html").is_file());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod engine;
mod error;
mod gateway;
mod state;

pub use config::{RetryConfig, SyncConfig, SyncMode, DEFAULT_FULL_SYNC_INTERVAL};
pub use conflict::{ConflictGuard, PushCheck, PushConflict, PushOutcome};
pub use engine::SyncEngine;
pub use error::{FailureKind, SyncError, SyncResult};
pub use gateway::{ChangedPage, MemoryGateway, RemoteGateway, RemotePage, TreeEntry};
pub use state::{PageFailure, PageOutcome, PassKind, SyncReport, SyncState};
