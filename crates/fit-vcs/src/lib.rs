//! Version-control backend for git-fit.
//!
//! Fit never talks to the VCS directly. Everything it needs (which paths
//! carry the `fit` attribute, blob checksums, revision ids, file content at
//! a revision, staging) goes through [`VersionControlBackend`].
//!
//! # Key Types
//!
//! - [`VersionControlBackend`] -- The backend trait
//! - [`GitBackend`] -- Drives the `git` command line
//! - [`MemoryBackend`] -- In-process backend for tests and embedding
//! - [`StagedAdditions`] -- Newly staged paths that would block a commit

pub mod error;
pub mod git;
pub mod memory;
pub mod traits;

pub use error::{VcsError, VcsResult};
pub use git::GitBackend;
pub use memory::MemoryBackend;
pub use traits::{looks_binary, StagedAdditions, VersionControlBackend};
