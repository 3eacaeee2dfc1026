use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// A located remote object, as returned by [`RemoteStore::check`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// The `<hash[0..2]>/<hash[2..]>` key the object was looked up under.
    pub key: String,
    /// Size reported by the store, when it knows it.
    pub size: Option<u64>,
}

impl ObjectRef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
        }
    }
}

/// Object transport to wherever fit content lives outside the repository.
///
/// `get` and `put` report a plain `false` for an ordinary miss or refusal;
/// `Err` is for transport failures. Either way the coordinator records the
/// item as failed and moves on.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn check(&self, key: &str) -> SyncResult<Option<ObjectRef>>;
    async fn get(&self, object: &ObjectRef, dest: &Path, size: u64) -> SyncResult<bool>;
    async fn put(&self, src: &Path, key: &str, size: u64) -> SyncResult<bool>;
    async fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}
