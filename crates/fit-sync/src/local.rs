use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::SyncResult;
use crate::remote::{ObjectRef, RemoteStore};

/// A remote store backed by a plain directory, laid out like the local
/// object cache (`<root>/<hash[0..2]>/<hash[2..]>`). Useful for shared
/// network mounts and for tests.
#[derive(Clone, Debug)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl RemoteStore for LocalDirStore {
    async fn check(&self, key: &str) -> SyncResult<Option<ObjectRef>> {
        match fs::metadata(self.path_of(key)).await {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectRef {
                key: key.to_string(),
                size: Some(meta.len()),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, object: &ObjectRef, dest: &Path, _size: u64) -> SyncResult<bool> {
        match fs::copy(self.path_of(&object.key), dest).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, src: &Path, key: &str, _size: u64) -> SyncResult<bool> {
        let target = self.path_of(key);
        let Some(parent) = target.parent() else {
            return Ok(false);
        };
        fs::create_dir_all(parent).await?;

        // Copy beside the target and rename, so readers never see a partial object.
        let staging = parent.join(format!(".{}.part", std::process::id()));
        match fs::copy(src, &staging).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        fs::rename(&staging, &target).await?;
        debug!(key, "stored object in directory store");
        Ok(true)
    }
}
