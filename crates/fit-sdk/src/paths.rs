//! Turning user path arguments into fit item paths.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use tracing::warn;

/// Why a path argument selected nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Skipped {
    OutsideRepository(String),
    NotTracked(String),
}

/// The items selected by a set of path arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathSelection {
    pub items: BTreeSet<String>,
    pub skipped: Vec<Skipped>,
}

/// Resolve `args` (relative to `cwd`) against the `available` item paths.
///
/// An argument naming an item selects it; one naming a directory selects
/// every item under it; the repository root (`.` at the top) selects
/// everything. Arguments outside the repository or matching no item are
/// reported in `skipped` and logged.
pub fn select_paths<S: AsRef<str>>(
    args: &[S],
    available: &BTreeSet<String>,
    root: &Path,
    cwd: &Path,
) -> PathSelection {
    let tree = PathTree::build(available);
    let mut selection = PathSelection::default();

    for arg in args {
        let arg = arg.as_ref();
        let Some(relative) = relative_to_root(arg, root, cwd) else {
            warn!(path = arg, "skipping path outside the repository");
            selection.skipped.push(Skipped::OutsideRepository(arg.to_string()));
            continue;
        };

        if relative.is_empty() {
            selection.items.extend(available.iter().cloned());
            continue;
        }
        match tree.find(&relative) {
            Some(node) => node.collect(&relative, &mut selection.items),
            None => {
                warn!(path = %relative, "path is not tracked by fit");
                selection.skipped.push(Skipped::NotTracked(relative));
            }
        }
    }
    selection
}

/// `arg` as a forward-slash path relative to `root`, or `None` when it
/// points outside. The empty string means the root itself.
fn relative_to_root(arg: &str, root: &Path, cwd: &Path) -> Option<String> {
    let joined = normalize(&cwd.join(arg));
    let root = normalize(root);
    let rest = joined.strip_prefix(&root).ok()?;
    let parts: Vec<String> = rest
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Default)]
struct PathTree {
    children: BTreeMap<String, PathTree>,
}

impl PathTree {
    fn build(paths: &BTreeSet<String>) -> Self {
        let mut tree = Self::default();
        for path in paths {
            let mut node = &mut tree;
            for part in path.split('/') {
                node = node.children.entry(part.to_string()).or_default();
            }
        }
        tree
    }

    fn find(&self, path: &str) -> Option<&PathTree> {
        path.split('/').try_fold(self, |node, part| node.children.get(part))
    }

    fn collect(&self, prefix: &str, out: &mut BTreeSet<String>) {
        if self.children.is_empty() {
            out.insert(prefix.to_string());
            return;
        }
        for (name, child) in &self.children {
            child.collect(&format!("{prefix}/{name}"), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> BTreeSet<String> {
        ["art/hero.png", "art/ui/button.png", "bin/tool", "readme.pdf"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn items(selection: &PathSelection) -> Vec<&str> {
        selection.items.iter().map(String::as_str).collect()
    }

    #[test]
    fn directory_prefix_selects_everything_below() {
        let root = Path::new("/repo");
        let selection = select_paths(&["art"], &available(), root, root);
        assert_eq!(items(&selection), vec!["art/hero.png", "art/ui/button.png"]);
        assert!(selection.skipped.is_empty());
    }

    #[test]
    fn paths_are_relative_to_cwd() {
        let root = Path::new("/repo");
        let cwd = Path::new("/repo/art/ui");
        let selection = select_paths(&["button.png", "../hero.png"], &available(), root, cwd);
        assert_eq!(items(&selection), vec!["art/hero.png", "art/ui/button.png"]);
    }

    #[test]
    fn dot_at_root_selects_all() {
        let root = Path::new("/repo");
        let selection = select_paths(&["."], &available(), root, root);
        assert_eq!(selection.items, available());
    }

    #[test]
    fn outside_and_unknown_paths_are_skipped() {
        let root = Path::new("/repo");
        let args = ["../elsewhere", "art/missing.png", "art/hero"];
        let selection = select_paths(&args, &available(), root, root);
        assert!(selection.items.is_empty());
        assert_eq!(
            selection.skipped,
            vec![
                Skipped::OutsideRepository("../elsewhere".into()),
                Skipped::NotTracked("art/missing.png".into()),
                Skipped::NotTracked("art/hero".into()),
            ]
        );
    }
}
