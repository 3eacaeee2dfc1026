use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fit_types::ContentHash;

use crate::error::VcsResult;
use crate::traits::{looks_binary, StagedAdditions, VersionControlBackend};

/// In-process backend over a real directory.
///
/// Working-tree files live on disk under `root` so the stat cache and the
/// object cache see genuine metadata, but attributes, the staging area and
/// history are plain maps. Checksums are computed natively and every hashed
/// path is counted, which lets tests assert that untouched files are never
/// rehashed.
pub struct MemoryBackend {
    root: PathBuf,
    git_dir: PathBuf,
    state: RwLock<State>,
    hashed: AtomicUsize,
}

#[derive(Default)]
struct State {
    /// Attribute name -> paths where it is set.
    set: HashMap<String, BTreeSet<String>>,
    /// Attribute name -> paths where it is explicitly unset.
    unset: HashMap<String, BTreeSet<String>>,
    /// Staged content, path -> bytes.
    index: BTreeMap<String, Vec<u8>>,
    /// Paths staged as new files since the last commit.
    added: BTreeSet<String>,
    /// Revision id -> snapshot of the index at commit time.
    revisions: HashMap<String, BTreeMap<String, Vec<u8>>>,
    head: Option<String>,
}

impl MemoryBackend {
    /// A backend over `root`, with fit's private directory at `root/.git`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let git_dir = root.join(".git");
        Self {
            root,
            git_dir,
            state: RwLock::new(State::default()),
            hashed: AtomicUsize::new(0),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set `attribute` on `path`.
    pub fn set_attribute(&self, attribute: &str, path: &str) {
        let mut state = self.write();
        state.unset.entry(attribute.to_string()).or_default().remove(path);
        state.set.entry(attribute.to_string()).or_default().insert(path.to_string());
    }

    /// Explicitly unset `attribute` on `path` (`-fit` in `.gitattributes`).
    pub fn unset_attribute(&self, attribute: &str, path: &str) {
        let mut state = self.write();
        state.set.entry(attribute.to_string()).or_default().remove(path);
        state.unset.entry(attribute.to_string()).or_default().insert(path.to_string());
    }

    /// Total number of paths hashed so far.
    pub fn hashed_count(&self) -> usize {
        self.hashed.load(Ordering::SeqCst)
    }

    /// Record the staging area as a new revision and move `HEAD` to it.
    pub fn commit(&self, rev: &str) {
        let mut state = self.write();
        let snapshot = state.index.clone();
        state.revisions.insert(rev.to_string(), snapshot);
        state.head = Some(rev.to_string());
        state.added.clear();
    }

    /// Replace the content of `path` in the staging area without touching
    /// the working tree, as a merge or checkout would.
    pub fn stage_bytes(&self, path: &str, data: Vec<u8>) {
        let mut state = self.write();
        if !state.index.contains_key(path) {
            state.added.insert(path.to_string());
        }
        state.index.insert(path.to_string(), data);
    }

    fn is_set(state: &State, attribute: &str, path: &str) -> bool {
        state.set.get(attribute).is_some_and(|s| s.contains(path))
    }

    fn is_unset(state: &State, attribute: &str, path: &str) -> bool {
        state.unset.get(attribute).is_some_and(|s| s.contains(path))
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("MemoryBackend")
            .field("root", &self.root)
            .field("head", &state.head)
            .field("revisions", &state.revisions.len())
            .field("hashed", &self.hashed_count())
            .finish()
    }
}

impl VersionControlBackend for MemoryBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn list_candidate_paths(&self, attribute: &str) -> VcsResult<BTreeSet<String>> {
        let state = self.read();
        Ok(state
            .set
            .get(attribute)
            .map(|paths| {
                paths
                    .iter()
                    .filter(|p| self.root.join(p).is_file())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn hash_objects(&self, paths: &[String]) -> VcsResult<Vec<ContentHash>> {
        let hashes = paths
            .iter()
            .map(|p| ContentHash::of_file(&self.root.join(p)))
            .collect::<Result<Vec<_>, _>>()?;
        self.hashed.fetch_add(paths.len(), Ordering::SeqCst);
        Ok(hashes)
    }

    fn current_revision_id(&self) -> VcsResult<Option<String>> {
        Ok(self.read().head.clone())
    }

    fn resolve_revision(&self, rev: &str) -> VcsResult<Option<String>> {
        let state = self.read();
        if rev == "HEAD" {
            return Ok(state.head.clone());
        }
        Ok(state.revisions.contains_key(rev).then(|| rev.to_string()))
    }

    fn read_file_at_revision(&self, path: &str, rev: &str) -> VcsResult<Option<Vec<u8>>> {
        let state = self.read();
        let rev = if rev == "HEAD" {
            match &state.head {
                Some(head) => head.as_str(),
                None => return Ok(None),
            }
        } else {
            rev
        };
        Ok(state
            .revisions
            .get(rev)
            .and_then(|snapshot| snapshot.get(path))
            .cloned())
    }

    fn stage_path_for_commit(&self, path: &str) -> VcsResult<()> {
        let data = std::fs::read(self.root.join(path))?;
        self.stage_bytes(path, data);
        Ok(())
    }

    fn staged_blob_hash(&self, path: &str) -> VcsResult<Option<ContentHash>> {
        Ok(self.read().index.get(path).map(|data| ContentHash::of_blob(data)))
    }

    fn staged_additions(&self, attribute: &str) -> VcsResult<StagedAdditions> {
        let state = self.read();
        let mut additions = StagedAdditions::default();
        for path in &state.added {
            if Self::is_set(&state, attribute, path) {
                additions.tracked.insert(path.clone());
            } else if !Self::is_unset(&state, attribute, path)
                && state.index.get(path).is_some_and(|data| looks_binary(data))
            {
                additions.binary.insert(path.clone());
            }
        }
        Ok(additions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn backend() -> (tempfile::TempDir, MemoryBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new(dir.path());
        (dir, backend)
    }

    #[test]
    fn candidates_are_attributed_existing_files() {
        let (dir, vcs) = backend();
        fs::write(dir.path().join("a.bin"), b"a").unwrap();
        vcs.set_attribute("fit", "a.bin");
        vcs.set_attribute("fit", "gone.bin");

        let candidates = vcs.list_candidate_paths("fit").unwrap();
        assert_eq!(candidates.into_iter().collect::<Vec<_>>(), vec!["a.bin"]);
        assert!(vcs.list_candidate_paths("other").unwrap().is_empty());
    }

    #[test]
    fn hashing_matches_blob_checksum_and_counts() {
        let (dir, vcs) = backend();
        fs::write(dir.path().join("x"), b"test content\n").unwrap();
        let hashes = vcs.hash_objects(&["x".to_string()]).unwrap();
        assert_eq!(hashes[0].as_str(), "d670460b4b4aece5915caf5c68d12f560a9fe3e4");
        assert_eq!(vcs.hashed_count(), 1);
    }

    #[test]
    fn history_roundtrip() {
        let (dir, vcs) = backend();
        assert_eq!(vcs.current_revision_id().unwrap(), None);

        fs::write(dir.path().join(".fit"), b"{}\n").unwrap();
        vcs.stage_path_for_commit(".fit").unwrap();
        assert_eq!(
            vcs.staged_blob_hash(".fit").unwrap(),
            Some(ContentHash::of_blob(b"{}\n"))
        );
        vcs.commit("r1");

        assert_eq!(vcs.current_revision_id().unwrap().as_deref(), Some("r1"));
        assert_eq!(vcs.read_file_at_revision(".fit", "HEAD").unwrap().unwrap(), b"{}\n");
        assert_eq!(vcs.read_file_at_revision(".fit", "nope").unwrap(), None);
        assert_eq!(vcs.resolve_revision("r1").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn staged_additions_classify_offenders() {
        let (dir, vcs) = backend();
        fs::write(dir.path().join("big.psd"), b"\0\x01binary").unwrap();
        fs::write(dir.path().join("notes.txt"), b"plain text").unwrap();
        fs::write(dir.path().join("raw.dat"), b"\0\0").unwrap();
        fs::write(dir.path().join("ignored.bin"), b"\0\0").unwrap();
        vcs.set_attribute("fit", "big.psd");
        vcs.unset_attribute("fit", "ignored.bin");
        for p in ["big.psd", "notes.txt", "raw.dat", "ignored.bin"] {
            vcs.stage_path_for_commit(p).unwrap();
        }

        let additions = vcs.staged_additions("fit").unwrap();
        assert_eq!(additions.tracked.iter().collect::<Vec<_>>(), vec!["big.psd"]);
        assert_eq!(additions.binary.iter().collect::<Vec<_>>(), vec!["raw.dat"]);

        vcs.commit("r1");
        assert!(vcs.staged_additions("fit").unwrap().is_empty());
    }
}
