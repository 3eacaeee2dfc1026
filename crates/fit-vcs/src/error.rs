//! Error types for the VCS crate.

use std::path::PathBuf;

/// Errors that can occur while talking to the version-control system.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// The directory is not inside a repository work tree.
    #[error("not inside a git work tree: {0}")]
    NotARepository(PathBuf),

    /// A VCS command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A VCS command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// A VCS command produced output we could not interpret.
    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    /// The backend returned a different number of checksums than paths.
    #[error("hashed {actual} of {expected} paths")]
    HashCountMismatch { expected: usize, actual: usize },

    #[error("invalid checksum: {0}")]
    Type(#[from] fit_types::TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for VCS results.
pub type VcsResult<T> = Result<T, VcsError>;
