use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A transfer needed the remote and none is configured.
    #[error("no remote store is configured (set [store] in the fit config)")]
    NoRemoteStore,

    #[error("unknown store kind: {0}")]
    UnknownStoreKind(String),

    #[error("store configuration error: {0}")]
    Config(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("cache error: {0}")]
    Cache(#[from] fit_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
