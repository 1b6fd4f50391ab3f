//! # PageSync Storage
//!
//! The on-disk side of a local page mirror.
//!
//! This crate owns everything that touches the filesystem:
//!
//! - [`PathCodec`] maps pages to paths, purely from the stored [`SpaceIndex`]
//! - [`PageFileStore`] writes page bodies with an embedded header, atomically
//! - [`MetadataStore`] persists one [`SpaceIndex`] per space
//! - [`SpaceLock`] keeps a second process away from a space being synced
//!
//! It knows nothing about the remote store; the sync engine decides what to
//! write and when to commit.
//!
//! ## Example
//!
//! ```rust
//! use pagesync_storage::{PageRecord, PathCodec, SpaceIndex, StorageConfig};
//!
//! let codec = PathCodec::new(&StorageConfig::new("/mirror"));
//! let mut index = SpaceIndex::new("DEV");
//! index.upsert_page(PageRecord::new("1", "Home", 1, None));
//! index.upsert_page(PageRecord::new("2", "Setup: Linux", 1, Some("1".into())));
//!
//! let path = codec.resolve_path(&index, "2").unwrap();
//! assert!(path.ends_with("DEV/1/2/Setup- Linux.html"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod lock;
mod metadata;
mod nav;
mod page_file;
mod path;
mod types;

pub use config::{StorageConfig, DEFAULT_METADATA_FILE, DEFAULT_ROOT_DIR};
pub use error::{StorageError, StorageResult};
pub use lock::{SpaceLock, LOCK_FILE};
pub use metadata::{ensure_gitignore, MetadataStore};
pub use nav::{navigation, Crumb, NavEntry, Navigation};
pub use page_file::{hash_content, PageFile, PageFileStore, PageHeader};
pub use path::{
    decode_segment, encode_segment, sanitize_title, PathCodec, ATTACHMENTS_DIR, PAGE_EXTENSION,
};
pub use types::{ForestReport, PageRecord, SpaceIndex, Timestamp, INDEX_FORMAT_VERSION};
