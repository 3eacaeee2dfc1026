use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::local::LocalDirStore;
use crate::remote::RemoteStore;

/// Which remote store to use and how to reach it.
///
/// Only `kind` is interpreted by the registry. The whole config is handed
/// to the factory for that kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: String,
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: "local".into(),
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

pub type StoreFactory = Box<dyn Fn(&StoreConfig) -> SyncResult<Box<dyn RemoteStore>> + Send + Sync>;

/// Maps store kinds to constructors.
pub struct StoreRegistry {
    factories: BTreeMap<String, StoreFactory>,
}

impl StoreRegistry {
    /// A registry with no kinds at all.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with the built-in kinds (`local`).
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("local", |config| {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| SyncError::Config("the local store needs a path".into()))?;
            Ok(Box::new(LocalDirStore::new(path)) as Box<dyn RemoteStore>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StoreConfig) -> SyncResult<Box<dyn RemoteStore>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn open(&self, config: &StoreConfig) -> SyncResult<Box<dyn RemoteStore>> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| SyncError::UnknownStoreKind(config.kind.clone()))?;
        debug!(kind = %config.kind, "opening remote store");
        factory(config)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_local_kind() {
        let registry = StoreRegistry::new();
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["local"]);
        assert!(registry.open(&StoreConfig::local("/tmp/fit-store")).is_ok());
    }

    #[test]
    fn local_without_path_is_config_error() {
        let config = StoreConfig {
            kind: "local".into(),
            ..StoreConfig::default()
        };
        assert!(matches!(StoreRegistry::new().open(&config), Err(SyncError::Config(_))));
    }

    #[test]
    fn unknown_and_registered_kinds() {
        let mut registry = StoreRegistry::empty();
        let config = StoreConfig {
            kind: "mirror".into(),
            path: Some("/srv/mirror".into()),
        };
        assert!(matches!(
            registry.open(&config),
            Err(SyncError::UnknownStoreKind(k)) if k == "mirror"
        ));

        registry.register("mirror", |c| {
            let path = c.path.clone().unwrap_or_default();
            Ok(Box::new(LocalDirStore::new(path)) as Box<dyn RemoteStore>)
        });
        assert!(registry.open(&config).is_ok());
    }

    #[test]
    fn only_local_is_built_in() {
        let config = StoreConfig {
            kind: "s3".into(),
            path: None,
        };
        assert!(matches!(
            StoreRegistry::new().open(&config),
            Err(SyncError::UnknownStoreKind(k)) if k == "s3"
        ));
    }
}
