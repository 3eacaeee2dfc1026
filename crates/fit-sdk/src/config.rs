//! Fit configuration (`<git-dir>/fit/config.toml`).

use std::path::{Path, PathBuf};

use fit_sync::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

pub const CONFIG_FILE: &str = "config.toml";

/// Repository-level fit settings. Every field has a default, so an absent or
/// empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// The gitattribute that marks files for fit.
    pub attribute: String,
    /// Manifest path, relative to the repository root.
    pub manifest_file: String,
    pub cache: CacheConfig,
    /// The remote store. Needed only by `get` and `put`.
    pub store: Option<StoreConfig>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// After a transfer, the cache is pruned to this many times the total
    /// size of the tracked items.
    pub prune_factor: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            attribute: "fit".into(),
            manifest_file: ".fit".into(),
            cache: CacheConfig::default(),
            store: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { prune_factor: 2.0 }
    }
}

impl FitConfig {
    /// Load the config file inside `fit_dir`. A missing file gives the
    /// defaults; a file that exists but does not parse is an error.
    pub fn load(fit_dir: &Path) -> SdkResult<Self> {
        let path = fit_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content).map_err(|e| SdkError::Config {
            path: path.clone(),
            message: e.to_string(),
        })?;
        config.validate(&path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> SdkResult<()> {
        let invalid = |message: &str| SdkError::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.attribute.trim().is_empty() {
            return Err(invalid("attribute must not be empty"));
        }
        if self.manifest_file.trim().is_empty() || self.manifest_file.contains('\\') {
            return Err(invalid("manifest_file must be a forward-slash path"));
        }
        if !(self.cache.prune_factor.is_finite() && self.cache.prune_factor >= 0.0) {
            return Err(invalid("cache.prune_factor must be a non-negative number"));
        }
        Ok(())
    }

    /// The store settings with a relative `path` resolved against `root`.
    pub fn resolved_store(&self, root: &Path) -> Option<StoreConfig> {
        let mut store = self.store.clone()?;
        if let Some(path) = &store.path {
            if path.is_relative() {
                store.path = Some(root.join(path));
            }
        }
        Some(store)
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        root.join(&self.manifest_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FitConfig::load(dir.path()).unwrap();
        assert_eq!(config, FitConfig::default());
        assert_eq!(config.attribute, "fit");
        assert_eq!(config.cache.prune_factor, 2.0);
        assert!(config.store.is_none());
    }

    #[test]
    fn parses_store_section() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[cache]
prune_factor = 1.5

[store]
kind = "local"
path = "../shared/fit-objects"
"#,
        )
        .unwrap();

        let config = FitConfig::load(dir.path()).unwrap();
        assert_eq!(config.cache.prune_factor, 1.5);
        assert_eq!(config.manifest_file, ".fit");

        let store = config.resolved_store(Path::new("/repo")).unwrap();
        assert_eq!(store.kind, "local");
        assert_eq!(store.path, Some(PathBuf::from("/repo/../shared/fit-objects")));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "attribute = [").unwrap();
        assert!(matches!(FitConfig::load(dir.path()), Err(SdkError::Config { .. })));

        std::fs::write(dir.path().join(CONFIG_FILE), "[cache]\nprune_factor = -1.0\n").unwrap();
        assert!(matches!(FitConfig::load(dir.path()), Err(SdkError::Config { .. })));
    }
}
