//! # PageSync Testkit
//!
//! Test utilities for PageSync.
//!
//! This crate provides:
//! - A temporary mirror fixture wired to an in-memory remote store
//! - Property-based generators for titles, ids, page forests and remote edits
//! - Assertions comparing the mirror tree with its index and the remote
//!
//! ## Usage
//!
//! ```rust
//! use pagesync_testkit::prelude::*;
//!
//! let mirror = TestMirror::new();
//! mirror.seed("DEV", &sample_space());
//! mirror.sync("DEV");
//! assert_one_file_per_page(mirror.codec(), &mirror.index("DEV"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod assertions;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use assertions::*;
pub use fixtures::*;
pub use generators::*;
