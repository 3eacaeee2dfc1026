//! High-level SDK for git-fit.
//!
//! Provides one entry point, [`FitRepo`], for every user-facing operation:
//! status, save, restore, get, put, the manifest merge driver and the git
//! hooks. The CLI is a thin layer over it.

pub mod config;
pub mod error;
pub mod hooks;
pub mod merge;
pub mod paths;
pub mod report;
pub mod repository;
pub mod transfer;
pub mod workdir;

#[cfg(test)]
mod testing;

pub use config::{CacheConfig, FitConfig, CONFIG_FILE};
pub use error::{SdkError, SdkResult};
pub use paths::{select_paths, PathSelection, Skipped};
pub use report::{
    MergeDriverOutcome, PostCheckoutReport, PostCommitReport, PreCommitReport, RestoreAction,
    RestorePlan, RestoreReport, SaveReport, StatusReport, StatusRow,
};
pub use repository::FitRepo;
pub use workdir::WorkdirGuard;

// Re-export key types
pub use fit_index::{ChangeKind, Changes};
pub use fit_merge::{ConflictKind, ConflictSet, Resolution, MERGE_HELP};
pub use fit_sync::{
    GetPlan, ItemOutcome, LocalDirStore, PlannedItem, PutPlan, QuietProgress, RemoteStore,
    StoreConfig, StoreRegistry, TransferProgress, TransferReport,
};
pub use fit_types::{ContentHash, Manifest, ManifestEntry};
pub use fit_vcs::{GitBackend, MemoryBackend, StagedAdditions, VersionControlBackend};
