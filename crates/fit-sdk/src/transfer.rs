//! `get` and `put`: moving objects between the cache and the remote store.

use std::collections::BTreeSet;
use std::fs;

use fit_sync::{GetPlan, PlannedItem, PutPlan, RemoteStore, TransferProgress, TransferReport};
use tracing::debug;

use crate::error::SdkResult;
use crate::repository::FitRepo;

impl FitRepo {
    /// The configured store, opened through the registry. `None` when no
    /// store is configured.
    fn open_store(&self) -> SdkResult<Option<Box<dyn RemoteStore>>> {
        Ok(self
            .config
            .resolved_store(self.root())
            .map(|config| self.registry.open(&config))
            .transpose()?)
    }

    fn targets(&self, filter: Option<&BTreeSet<String>>) -> SdkResult<BTreeSet<String>> {
        Ok(match filter {
            Some(filter) => filter.clone(),
            None => self.manifest()?.paths().cloned().collect(),
        })
    }

    /// Which stubs `get` would fill, without contacting the remote.
    pub fn get_plan(&self, filter: Option<&BTreeSet<String>>) -> SdkResult<GetPlan> {
        let manifest = self.manifest()?;
        let targets = self.targets(filter)?;
        let mut cache = self.content_cache()?;
        Ok(self.coordinator(&mut cache, None).plan_get(self.root(), &manifest, &targets)?)
    }

    /// Fill zero-byte stubs with their content, from the cache when
    /// possible and from the remote store otherwise.
    pub async fn get(
        &self,
        filter: Option<&BTreeSet<String>>,
        progress: &mut dyn TransferProgress,
    ) -> SdkResult<TransferReport> {
        let manifest = self.manifest()?;
        let targets = self.targets(filter)?;
        let opened = match self.remote {
            Some(_) => None,
            None => self.open_store()?,
        };
        let store = self.remote.as_deref().or(opened.as_deref());

        let mut cache = self.content_cache()?;
        let report = self
            .coordinator(&mut cache, store)
            .get(self.root(), &manifest, &targets, progress)
            .await?;

        let mut stat = self.stat_cache();
        stat.record(self.root(), &report.written)?;
        stat.save()?;
        Ok(report)
    }

    /// Every item of a landed commit whose object has not been uploaded.
    pub fn pending_uploads(&self) -> SdkResult<Vec<PlannedItem>> {
        Ok(self
            .commit_records()?
            .into_iter()
            .flat_map(|(_, record)| record.into_inner())
            .map(|(path, entry)| PlannedItem::new(path, entry))
            .collect())
    }

    pub fn put_plan(&self) -> SdkResult<PutPlan> {
        let pending = self.pending_uploads()?;
        let mut cache = self.content_cache()?;
        Ok(self.coordinator(&mut cache, None).plan_put(&pending))
    }

    /// Upload the objects of landed commits. Commit records shrink as their
    /// objects reach the remote and are deleted once empty.
    pub async fn put(&self, progress: &mut dyn TransferProgress) -> SdkResult<TransferReport> {
        let manifest = self.manifest()?;
        let pending = self.pending_uploads()?;
        let opened = match (&self.remote, pending.is_empty()) {
            (None, false) => self.open_store()?,
            _ => None,
        };
        let store = self.remote.as_deref().or(opened.as_deref());

        let mut cache = self.content_cache()?;
        let report = self.coordinator(&mut cache, store).put(&manifest, &pending, progress).await?;

        let synced: BTreeSet<_> = report.synced.iter().collect();
        for (file, mut record) in self.commit_records()? {
            let before = record.len();
            record.retain(|_, entry| !synced.contains(&entry.hash));
            if record.is_empty() {
                fs::remove_file(&file)?;
                debug!(file = %file.display(), "commit record fully uploaded");
            } else if record.len() != before {
                record.save(&file)?;
            }
        }
        Ok(report)
    }
}
