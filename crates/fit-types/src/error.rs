use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid item path: {0:?}")]
    InvalidPath(String),

    /// The manifest could not be decoded. Line and column are 1-based.
    #[error("malformed manifest at line {line}, column {column}: {message}")]
    Manifest {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for type-level results.
pub type TypeResult<T> = Result<T, TypeError>;
