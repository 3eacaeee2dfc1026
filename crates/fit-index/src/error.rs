//! Error types for the index crate.

/// Errors that can occur during change detection.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The backend failed to list or hash files.
    #[error("vcs error: {0}")]
    Vcs(#[from] fit_vcs::VcsError),

    /// A manifest or checksum could not be decoded.
    #[error("type error: {0}")]
    Type(#[from] fit_types::TypeError),

    /// Stat cache serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
