use std::collections::BTreeMap;

use fit_store::PruneReport;
use fit_types::{ContentHash, ManifestEntry};

/// One item of a transfer plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedItem {
    pub path: String,
    pub entry: ManifestEntry,
}

impl PlannedItem {
    pub fn new(path: impl Into<String>, entry: ManifestEntry) -> Self {
        Self {
            path: path.into(),
            entry,
        }
    }
}

/// What `get` would do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetPlan {
    /// Stubs the cache can fill without the remote.
    pub from_cache: Vec<PlannedItem>,
    /// Stubs whose content has to be downloaded.
    pub downloads: Vec<PlannedItem>,
}

impl GetPlan {
    pub fn download_bytes(&self) -> u64 {
        self.downloads.iter().map(|i| i.entry.size).sum()
    }
}

/// What `put` would do. Uploads are an upper bound: objects the remote
/// already has are skipped when the transfer runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutPlan {
    pub uploads: Vec<PlannedItem>,
    /// Pending uploads whose object is no longer in the local cache.
    pub missing: Vec<PlannedItem>,
}

impl PutPlan {
    pub fn upload_bytes(&self) -> u64 {
        self.uploads.iter().map(|i| i.entry.size).sum()
    }
}

/// Outcome of a transfer.
#[derive(Clone, Debug, Default)]
pub struct TransferReport {
    /// Items moved over the network.
    pub transferred: Vec<String>,
    /// Items filled from the local cache (get only).
    pub from_cache: Vec<String>,
    /// Items the remote already had (put only).
    pub already_present: Vec<String>,
    /// Items that failed, with a reason.
    pub failed: Vec<(String, String)>,
    /// Working-tree files written, with their hashes (get only).
    pub written: BTreeMap<String, ContentHash>,
    /// Objects now known to exist remotely (put only).
    pub synced: Vec<ContentHash>,
    pub bytes: u64,
    pub pruned: PruneReport,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn fail(&mut self, path: &str, reason: impl Into<String>) {
        self.failed.push((path.to_string(), reason.into()));
    }
}
