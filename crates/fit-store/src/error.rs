use std::path::PathBuf;

use fit_types::ContentHash;

/// Errors that can occur in the object cache.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The ledger exists but cannot be decoded. Deleting it would forget
    /// which objects are pending, so it is never silently reset.
    #[error("corrupt cache ledger {path}: {message}")]
    CorruptLedger { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Downloaded content does not hash to the key it was fetched under.
    #[error("content mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;
