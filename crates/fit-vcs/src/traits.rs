use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use fit_types::ContentHash;

use crate::error::VcsResult;

/// Paths newly staged in the VCS index that fit objects to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagedAdditions {
    /// Staged paths that carry the fit attribute (`F`).
    pub tracked: BTreeSet<String>,
    /// Staged binary paths with no fit attribute at all (`B`).
    pub binary: BTreeSet<String>,
}

impl StagedAdditions {
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty() && self.binary.is_empty()
    }
}

/// How many leading bytes are inspected by [`looks_binary`].
pub const BINARY_SNIFF_LEN: usize = 8000;

/// Git's heuristic: content is binary if a NUL byte appears early on.
pub fn looks_binary(head: &[u8]) -> bool {
    head.iter().take(BINARY_SNIFF_LEN).any(|&b| b == 0)
}

/// The operations fit needs from the version-control system.
///
/// All paths are relative to [`root`](Self::root), forward-slash separated.
/// Implementations must:
/// - return checksums from [`hash_objects`](Self::hash_objects) in input order,
///   one per path;
/// - report "no such revision" or "no such file at revision" as `Ok(None)`,
///   reserving `Err` for failures of the VCS itself.
pub trait VersionControlBackend: Send + Sync {
    /// Root of the working tree.
    fn root(&self) -> &Path;

    /// The VCS metadata directory. Fit keeps its private state under it.
    fn git_dir(&self) -> &Path;

    /// Every working-tree file whose `attribute` is set.
    fn list_candidate_paths(&self, attribute: &str) -> VcsResult<BTreeSet<String>>;

    /// Blob checksums for the given paths, in the same order.
    fn hash_objects(&self, paths: &[String]) -> VcsResult<Vec<ContentHash>>;

    /// The id of `HEAD`, or `None` before the first commit.
    fn current_revision_id(&self) -> VcsResult<Option<String>>;

    /// Resolve an arbitrary revision expression to an id.
    fn resolve_revision(&self, rev: &str) -> VcsResult<Option<String>>;

    /// Content of `path` as recorded at `rev`.
    fn read_file_at_revision(&self, path: &str, rev: &str) -> VcsResult<Option<Vec<u8>>>;

    /// Stage `path` for the next commit, even if it is ignored.
    fn stage_path_for_commit(&self, path: &str) -> VcsResult<()>;

    /// Checksum of the version of `path` currently staged, if any.
    fn staged_blob_hash(&self, path: &str) -> VcsResult<Option<ContentHash>>;

    /// Newly staged paths that are fit-tracked or binary.
    fn staged_additions(&self, attribute: &str) -> VcsResult<StagedAdditions>;
}

/// Lets callers keep a handle on a backend they hand over, as tests do to
/// commit or change attributes midway.
impl<T: VersionControlBackend + ?Sized> VersionControlBackend for Arc<T> {
    fn root(&self) -> &Path {
        (**self).root()
    }

    fn git_dir(&self) -> &Path {
        (**self).git_dir()
    }

    fn list_candidate_paths(&self, attribute: &str) -> VcsResult<BTreeSet<String>> {
        (**self).list_candidate_paths(attribute)
    }

    fn hash_objects(&self, paths: &[String]) -> VcsResult<Vec<ContentHash>> {
        (**self).hash_objects(paths)
    }

    fn current_revision_id(&self) -> VcsResult<Option<String>> {
        (**self).current_revision_id()
    }

    fn resolve_revision(&self, rev: &str) -> VcsResult<Option<String>> {
        (**self).resolve_revision(rev)
    }

    fn read_file_at_revision(&self, path: &str, rev: &str) -> VcsResult<Option<Vec<u8>>> {
        (**self).read_file_at_revision(path, rev)
    }

    fn stage_path_for_commit(&self, path: &str) -> VcsResult<()> {
        (**self).stage_path_for_commit(path)
    }

    fn staged_blob_hash(&self, path: &str) -> VcsResult<Option<ContentHash>> {
        (**self).staged_blob_hash(path)
    }

    fn staged_additions(&self, attribute: &str) -> VcsResult<StagedAdditions> {
        (**self).staged_additions(attribute)
    }
}
