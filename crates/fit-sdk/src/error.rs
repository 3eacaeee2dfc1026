use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Zero-byte files cannot start being tracked: they are
    /// indistinguishable from placeholder stubs.
    #[error("empty, zero-byte files cannot be added to fit: {}", .0.join(", "))]
    EmptyItems(Vec<String>),

    /// A merge is in progress and some conflicts have no choice yet.
    #[error("{} conflicted item(s) are not resolved yet", .0.len())]
    Unresolved(Vec<(String, usize)>),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("vcs error: {0}")]
    Vcs(#[from] fit_vcs::VcsError),

    #[error("index error: {0}")]
    Index(#[from] fit_index::IndexError),

    #[error("cache error: {0}")]
    Store(#[from] fit_store::StoreError),

    #[error("merge error: {0}")]
    Merge(#[from] fit_merge::MergeError),

    #[error("transfer error: {0}")]
    Sync(#[from] fit_sync::SyncError),

    #[error("manifest error: {0}")]
    Type(#[from] fit_types::TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
