//! Error types for the merge crate.

/// Errors that can occur while merging or resolving.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// The resolution form has a problem on the given (1-based) line.
    /// Nothing is applied when this is returned.
    #[error("resolution form line {line}: {message}")]
    Form { line: usize, message: String },

    /// A row chose "theirs" for an item the incoming manifest does not have.
    #[error("incoming manifest has no entry for {0}")]
    MissingIncoming(String),

    /// An operation needed a merge in progress and there is none.
    #[error("no merge in progress")]
    NotMerging,

    #[error("merge state error: {0}")]
    State(#[from] serde_json::Error),

    #[error("manifest error: {0}")]
    Type(#[from] fit_types::TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub(crate) fn form(line: usize, message: impl Into<String>) -> Self {
        Self::Form {
            line,
            message: message.into(),
        }
    }
}

/// Convenience alias for merge results.
pub type MergeResult<T> = Result<T, MergeError>;
