//! The Conflict Resolution Form.
//!
//! While a merge is unresolved, `.fit` holds a human-editable form instead of
//! a manifest. Each conflict is one row:
//!
//! ```text
//! [<choice>]  <mine><theirs>  <path>
//! ```
//!
//! `choice` is `M` (mine), `T` (theirs) or `W` (working tree). Consecutive
//! rows can be grouped by wrapping them in parentheses, `(` before the first
//! row's box and `)` after the last row's box; the group takes the choice
//! given in its first row. Groups nest, and an explicit choice on a row
//! always beats the group it sits in.

use std::collections::BTreeSet;

use fit_types::Manifest;

use crate::engine::{ConflictKind, ConflictSet};
use crate::error::{MergeError, MergeResult};

/// First line of every form. Its presence is how a form is told apart from
/// a manifest.
pub const FORM_SENTINEL: &str = "# Conflict Resolution Form (DO NOT remove this line)";

const FORM_HEADER: &str = "\
#
# ==> 1. Put M, T or W in the [] box of every row, one by one or in batches.
# ==> 2. Run \"git-fit save\" with no path arguments.
# ==> 3. Carry on with the git merge as usual.
#
# \"git-fit merge-help\" explains the format and batch selections in detail.
==========================
";

/// Long-form help printed by `git-fit merge-help`.
pub const MERGE_HELP: &str = "\
Conflict Resolution Form
========================
When a merge changes the same fit item on both sides, the .fit file is
replaced by a Conflict Resolution Form. Every conflicted item gets a row:

    <CHOICE>  <MINE><THEIRS>  <ITEM>

  CHOICE  the box you fill in: [M], [T] or [W]
  MINE    how the current version changed since the common ancestor
  THEIRS  how the incoming version changed since the common ancestor
  ITEM    the item path

Only four combinations exist:

    []  **  foo.jar         modified on both sides
    []  ++  bar.png         added on both sides
    []  *-  bin/runBaz      modified here, removed there
    []  -*  lib/libQux.so   removed here, modified there

Choices
-------
  M  keep my version
  T  take their version
  W  take whatever is in the working tree right now (delete the
     file to resolve the item as a removal)

Batches
-------
Rows are sorted by path, so related items sit together. Wrap consecutive
rows in parentheses and give a choice on the first row to apply it to the
whole group. Groups may nest. A choice written on a row always wins over
the group around it. Whitespace between columns does not matter.

    [W]  **  foo.jar
   ([T]  ++  bar.png
    [W]  *-  bin/runBaz
   ([M]  *-  bin/runCorge
    [])  -*  lib/libQux.so
    [])**lib/libQuux.so

Here foo.jar and bin/runBaz take the working tree, bin/runCorge and
lib/libQux.so take mine, and bar.png and lib/libQuux.so take theirs.

Rebase
------
During a rebase the roles flip: \"mine\" is the commit being replayed and
\"theirs\" is the branch you are rebasing onto.
";

/// A resolution choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Choice {
    Mine,
    Theirs,
    Working,
}

impl Choice {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'M' => Some(Self::Mine),
            'T' => Some(Self::Theirs),
            'W' => Some(Self::Working),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::Mine => 'M',
            Self::Theirs => 'T',
            Self::Working => 'W',
        }
    }
}

/// The selection syntax of one row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mark {
    /// `[]`: nothing chosen here. Inherits the enclosing batch, if any.
    None,
    /// `[X]` with no parentheses.
    Explicit(Choice),
    /// `([X]` or `([]`: opens a batch.
    BatchOpen(Option<Choice>),
    /// `[X])` or `[])`: closes the innermost batch. The row itself still
    /// belongs to the batch it closes.
    BatchClose(Option<Choice>),
    /// `([X])`: a one-row batch.
    Batch(Option<Choice>),
}

/// A parsed form row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormRow {
    /// 1-based line number in the form.
    pub line: usize,
    pub mark: Mark,
    pub kind: ConflictKind,
    pub path: String,
}

/// Outcome of applying a form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The merged manifest with every "theirs" choice applied.
    pub manifest: Manifest,
    pub mine: BTreeSet<String>,
    pub theirs: BTreeSet<String>,
    /// Items to be settled from the working tree by the caller.
    pub working: BTreeSet<String>,
    /// Items with no choice, with their line numbers. Line 0 means the row
    /// is missing from the form.
    pub unresolved: Vec<(String, usize)>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// The letter chosen for `path`, `U` when unresolved, `None` when the
    /// path is not part of the form.
    pub fn letter_for(&self, path: &str) -> Option<char> {
        if self.mine.contains(path) {
            Some('M')
        } else if self.theirs.contains(path) {
            Some('T')
        } else if self.working.contains(path) {
            Some('W')
        } else if self.unresolved.iter().any(|(p, _)| p == path) {
            Some('U')
        } else {
            None
        }
    }
}

/// Render the form for a set of conflicts.
pub fn render_form(conflicts: &ConflictSet) -> String {
    let mut out = String::new();
    out.push_str(FORM_SENTINEL);
    out.push('\n');
    out.push_str(FORM_HEADER);
    out.push('\n');
    for conflict in conflicts.conflicts() {
        out.push_str(&format!("[]  {}  {}\n", conflict.kind.symbol(), conflict.path));
    }
    out
}

/// Whether `data` is a resolution form rather than a manifest.
pub fn is_form(data: &[u8]) -> bool {
    let first = data.split(|&b| b == b'\n').next().unwrap_or_default();
    String::from_utf8_lossy(first).trim_end() == FORM_SENTINEL
}

/// Parse every row of a form. Comment (`#`), rule (`=`) and blank lines are
/// skipped.
pub fn parse_form(text: &str) -> MergeResult<Vec<FormRow>> {
    let mut rows = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('=') {
            continue;
        }
        rows.push(parse_row(line, trimmed)?);
    }
    Ok(rows)
}

fn parse_row(line: usize, text: &str) -> MergeResult<FormRow> {
    let mut rest = text;

    let open = rest.starts_with('(');
    if open {
        rest = rest[1..].trim_start();
    }

    let Some(after_bracket) = rest.strip_prefix('[') else {
        return Err(MergeError::form(line, "expected a [] choice box"));
    };
    let Some(close_bracket) = after_bracket.find(']') else {
        return Err(MergeError::form(line, "unterminated [] choice box"));
    };
    let inside = after_bracket[..close_bracket].trim();
    let choice = match inside.chars().count() {
        0 => None,
        1 => match inside.chars().next().and_then(Choice::from_char) {
            Some(c) => Some(c),
            None => {
                let message = format!("unknown choice {inside:?}, use M, T or W");
                return Err(MergeError::form(line, message));
            }
        },
        _ => {
            let message = format!("choice {inside:?} must be a single letter");
            return Err(MergeError::form(line, message));
        }
    };
    rest = after_bracket[close_bracket + 1..].trim_start();

    let close = rest.starts_with(')');
    if close {
        rest = rest[1..].trim_start();
    }

    let symbol = rest.get(..2).unwrap_or_default();
    let Some(kind) = ConflictKind::from_symbol(symbol) else {
        return Err(MergeError::form(line, "expected a conflict symbol (**, ++, *- or -*)"));
    };
    let path = rest[2..].trim();
    if path.is_empty() {
        return Err(MergeError::form(line, "missing item path"));
    }

    let mark = match (open, close, choice) {
        (true, true, c) => Mark::Batch(c),
        (true, false, c) => Mark::BatchOpen(c),
        (false, true, c) => Mark::BatchClose(c),
        (false, false, Some(c)) => Mark::Explicit(c),
        (false, false, None) => Mark::None,
    };

    Ok(FormRow {
        line,
        mark,
        kind,
        path: path.to_string(),
    })
}

/// Apply parsed rows to the merged manifest.
///
/// `conflicts` is the set the form was rendered from. A row must name one of
/// them with its recorded symbol, at most once; a conflict with no row left
/// in the form is unresolved, reported with line 0.
///
/// `merged` is the manifest produced by the merge (mine plus every
/// non-conflicting incoming change) and `incoming` is the other side. Either
/// every row is valid and the whole form is applied, or an error is
/// returned and nothing is.
pub fn resolve(
    rows: &[FormRow],
    conflicts: &ConflictSet,
    merged: &Manifest,
    incoming: &Manifest,
) -> MergeResult<Resolution> {
    let mut seen = BTreeSet::new();
    for row in rows {
        match conflicts.kind_of(&row.path) {
            Some(kind) if kind == row.kind => {}
            Some(kind) => {
                let message = format!(
                    "{} is a {} conflict, not {}",
                    row.path,
                    kind.symbol(),
                    row.kind.symbol()
                );
                return Err(MergeError::form(row.line, message));
            }
            None => {
                let message = format!("{} is not in conflict", row.path);
                return Err(MergeError::form(row.line, message));
            }
        }
        if !seen.insert(row.path.as_str()) {
            return Err(MergeError::form(row.line, format!("{} is listed twice", row.path)));
        }
    }

    // Each open batch: (line it was opened on, its effective choice).
    let mut stack: Vec<(usize, Option<Choice>)> = Vec::new();
    let mut chosen: Vec<(&FormRow, Option<Choice>)> = Vec::with_capacity(rows.len());

    for row in rows {
        let enclosing = stack.last().and_then(|(_, c)| *c);
        let effective = match row.mark {
            Mark::None => enclosing,
            Mark::Explicit(c) => Some(c),
            Mark::Batch(c) => c.or(enclosing),
            Mark::BatchOpen(c) => {
                let batch = c.or(enclosing);
                stack.push((row.line, batch));
                batch
            }
            Mark::BatchClose(c) => {
                if stack.pop().is_none() {
                    return Err(MergeError::form(row.line, "unmatched closing parenthesis"));
                }
                c.or(enclosing)
            }
        };
        chosen.push((row, effective));
    }

    if let Some((line, _)) = stack.last() {
        return Err(MergeError::form(*line, "unmatched opening parenthesis"));
    }

    let mut resolution = Resolution {
        manifest: merged.clone(),
        ..Resolution::default()
    };
    for (row, choice) in chosen {
        match choice {
            Some(Choice::Theirs) => {
                if row.kind.theirs_removes() {
                    resolution.manifest.remove(&row.path);
                } else {
                    let entry = incoming
                        .get(&row.path)
                        .ok_or_else(|| MergeError::MissingIncoming(row.path.clone()))?;
                    resolution.manifest.insert(row.path.clone(), entry.clone());
                }
                resolution.theirs.insert(row.path.clone());
            }
            Some(Choice::Mine) => {
                resolution.mine.insert(row.path.clone());
            }
            Some(Choice::Working) => {
                resolution.working.insert(row.path.clone());
            }
            None => resolution.unresolved.push((row.path.clone(), row.line)),
        }
    }
    for conflict in conflicts.conflicts() {
        if !seen.contains(conflict.path.as_str()) {
            resolution.unresolved.push((conflict.path, 0));
        }
    }
    Ok(resolution)
}
