//! Per-item status kinds and their one-character symbols.

use serde::{Deserialize, Serialize};

/// How an item differs from the manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Content differs from the manifest.
    Modified,
    /// Newly carries the fit attribute; tracked from the next save.
    Added,
    /// Physically deleted from the working tree.
    Removed,
    /// Still on disk but no longer carries the fit attribute.
    Untracked,
    /// Matches the manifest.
    Unchanged,
}

impl ChangeKind {
    /// Status column symbol.
    pub fn symbol(self) -> char {
        match self {
            Self::Modified => '*',
            Self::Added => '+',
            Self::Removed => '-',
            Self::Untracked => '~',
            Self::Unchanged => ' ',
        }
    }
}

/// A single status line: a path and how it changed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StatusEntry {
    pub path: String,
    pub kind: ChangeKind,
}

impl StatusEntry {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols() {
        let all = [
            ChangeKind::Modified,
            ChangeKind::Added,
            ChangeKind::Removed,
            ChangeKind::Untracked,
            ChangeKind::Unchanged,
        ];
        let symbols: String = all.iter().map(|k| k.symbol()).collect();
        assert_eq!(symbols, "*+-~ ");
    }
}
