//! Working-tree change detection for git-fit.
//!
//! Compares what the manifest says against what is on disk right now.
//! Checksums are expensive for large files, so a stat cache remembers the
//! last known `(hash, stats)` of every file and only files whose stats moved
//! get rehashed.
//!
//! # Key Types
//!
//! - [`StatCache`] -- Persisted `path -> (hash, stats)` memo
//! - [`FileStats`] -- The `(size, mtime, ctime, inode)` tuple that validates a memo
//! - [`ChangeDetector`] -- Classifies items against a manifest
//! - [`Changes`] -- The five disjoint change sets plus stubs
//! - [`ChangeKind`] -- Kind of change, with its status symbol

pub mod changes;
pub mod error;
pub mod stat_cache;
pub mod status;

pub use changes::{ChangeDetector, Changes};
pub use error::{IndexError, IndexResult};
pub use stat_cache::{FileStats, Refresh, StatCache, StatEntry};
pub use status::{ChangeKind, StatusEntry};
