//! Backend that drives the `git` command line.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;

use fit_types::ContentHash;
use tracing::debug;

use crate::error::{VcsError, VcsResult};
use crate::traits::{looks_binary, StagedAdditions, VersionControlBackend, BINARY_SNIFF_LEN};

/// A git work tree, driven through `git` subprocesses.
///
/// Every command runs with the work tree root as its current directory, so
/// paths passed in and out are always root-relative.
#[derive(Clone, Debug)]
pub struct GitBackend {
    root: PathBuf,
    git_dir: PathBuf,
}

impl GitBackend {
    /// Locate the repository containing `start`.
    pub fn discover(start: &Path) -> VcsResult<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel", "--absolute-git-dir"])
            .current_dir(start)
            .stderr(Stdio::null())
            .output()
            .map_err(|source| VcsError::Spawn {
                command: "git rev-parse".into(),
                source,
            })?;
        if !output.status.success() {
            return Err(VcsError::NotARepository(start.to_path_buf()));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let mut lines = text.lines();
        match (lines.next(), lines.next()) {
            (Some(root), Some(git_dir)) => Ok(Self {
                root: PathBuf::from(root),
                git_dir: PathBuf::from(git_dir),
            }),
            _ => Err(VcsError::UnexpectedOutput {
                command: "git rev-parse".into(),
                detail: text.into_owned(),
            }),
        }
    }

    /// Use an explicitly known work tree and git directory.
    pub fn new(root: impl Into<PathBuf>, git_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git_dir: git_dir.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.root);
        cmd
    }

    /// Run a command to completion, feeding `input` on stdin from a
    /// producer thread while the caller's thread drains stdout.
    fn run(&self, args: &[&str], input: Option<Vec<u8>>) -> VcsResult<Output> {
        let command = format!("git {}", args.join(" "));
        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn().map_err(|source| VcsError::Spawn {
            command: command.clone(),
            source,
        })?;

        let producer = match (input, child.stdin.take()) {
            (Some(data), Some(mut stdin)) => Some(thread::spawn(move || {
                // Dropping stdin at the end of the closure signals EOF.
                stdin.write_all(&data)
            })),
            _ => None,
        };

        let output = child.wait_with_output()?;

        if let Some(handle) = producer {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => {
                    return Err(VcsError::UnexpectedOutput {
                        command,
                        detail: "stdin writer panicked".into(),
                    })
                }
            }
        }
        Ok(output)
    }

    /// Run a command that must succeed and return its stdout.
    fn run_ok(&self, args: &[&str], input: Option<Vec<u8>>) -> VcsResult<Vec<u8>> {
        let output = self.run(args, input)?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// `git check-attr -z --stdin <attribute>` over NUL-separated paths,
    /// yielding `(path, value)` pairs.
    fn check_attr(&self, attribute: &str, paths: &[String]) -> VcsResult<Vec<(String, String)>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut input = Vec::new();
        for p in paths {
            input.extend_from_slice(p.as_bytes());
            input.push(0);
        }
        let out = self.run_ok(&["check-attr", "-z", "--stdin", attribute], Some(input))?;
        let text = String::from_utf8_lossy(&out);
        let fields: Vec<&str> = text.split('\0').filter(|f| !f.is_empty()).collect();
        if fields.len() % 3 != 0 {
            return Err(VcsError::UnexpectedOutput {
                command: "git check-attr".into(),
                detail: format!("{} fields is not a multiple of 3", fields.len()),
            });
        }
        Ok(fields
            .chunks(3)
            .map(|c| (c[0].to_string(), c[2].to_string()))
            .collect())
    }

    fn is_binary_staged(&self, path: &str) -> VcsResult<bool> {
        let full = self.root.join(path);
        if full.is_file() {
            let mut head = Vec::with_capacity(BINARY_SNIFF_LEN);
            File::open(&full)?
                .take(BINARY_SNIFF_LEN as u64)
                .read_to_end(&mut head)?;
            return Ok(looks_binary(&head));
        }
        let spec = format!(":{path}");
        let output = self.run(&["show", &spec], None)?;
        Ok(output.status.success() && looks_binary(&output.stdout))
    }
}

fn split_nul(data: &[u8]) -> Vec<String> {
    data.split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

impl VersionControlBackend for GitBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn list_candidate_paths(&self, attribute: &str) -> VcsResult<BTreeSet<String>> {
        let listed = self.run_ok(&["ls-files", "-z", "--cached", "--others"], None)?;
        let mut paths = split_nul(&listed);
        paths.sort();
        paths.dedup();
        // Deleted-but-indexed files are listed by --cached; they are not candidates.
        paths.retain(|p| self.root.join(p).is_file());

        let set: BTreeSet<String> = self
            .check_attr(attribute, &paths)?
            .into_iter()
            .filter(|(_, value)| value == "set")
            .map(|(path, _)| path)
            .collect();
        debug!(listed = paths.len(), candidates = set.len(), "listed candidate paths");
        Ok(set)
    }

    fn hash_objects(&self, paths: &[String]) -> VcsResult<Vec<ContentHash>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut input = Vec::new();
        for p in paths {
            input.extend_from_slice(p.as_bytes());
            input.push(b'\n');
        }
        let out = self.run_ok(&["hash-object", "--stdin-paths"], Some(input))?;
        let hashes = String::from_utf8_lossy(&out)
            .lines()
            .map(ContentHash::from_hex)
            .collect::<Result<Vec<_>, _>>()?;
        if hashes.len() != paths.len() {
            return Err(VcsError::HashCountMismatch {
                expected: paths.len(),
                actual: hashes.len(),
            });
        }
        debug!(count = hashes.len(), "hashed objects");
        Ok(hashes)
    }

    fn current_revision_id(&self) -> VcsResult<Option<String>> {
        self.resolve_revision("HEAD")
    }

    fn resolve_revision(&self, rev: &str) -> VcsResult<Option<String>> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", rev], None)?;
        if !output.status.success() {
            return Ok(None);
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!id.is_empty()).then_some(id))
    }

    fn read_file_at_revision(&self, path: &str, rev: &str) -> VcsResult<Option<Vec<u8>>> {
        let spec = format!("{rev}:{path}");
        let output = self.run(&["show", &spec], None)?;
        Ok(output.status.success().then_some(output.stdout))
    }

    fn stage_path_for_commit(&self, path: &str) -> VcsResult<()> {
        self.run_ok(&["add", "-f", "--", path], None)?;
        Ok(())
    }

    fn staged_blob_hash(&self, path: &str) -> VcsResult<Option<ContentHash>> {
        let out = self.run_ok(&["ls-files", "-s", "--", path], None)?;
        let text = String::from_utf8_lossy(&out);
        // "<mode> <hash> <stage>\t<path>"
        match text.split_whitespace().nth(1) {
            Some(hex) => Ok(Some(ContentHash::from_hex(hex)?)),
            None => Ok(None),
        }
    }

    fn staged_additions(&self, attribute: &str) -> VcsResult<StagedAdditions> {
        let out = self.run_ok(
            &["diff", "--cached", "--name-only", "-z", "--diff-filter=A"],
            None,
        )?;
        let staged = split_nul(&out);

        let mut additions = StagedAdditions::default();
        for (path, value) in self.check_attr(attribute, &staged)? {
            match value.as_str() {
                "set" => {
                    additions.tracked.insert(path);
                }
                "unspecified" => {
                    if self.is_binary_staged(&path)? {
                        additions.binary.insert(path);
                    }
                }
                _ => {}
            }
        }
        Ok(additions)
    }
}
