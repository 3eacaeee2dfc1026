use std::env;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Changes the process working directory and changes it back on drop.
///
/// The working directory is process-wide state: hold at most one guard at a
/// time and do not share it across threads.
#[derive(Debug)]
pub struct WorkdirGuard {
    previous: PathBuf,
}

impl WorkdirGuard {
    pub fn enter(dir: &Path) -> io::Result<Self> {
        let previous = env::current_dir()?;
        env::set_current_dir(dir)?;
        Ok(Self { previous })
    }

    /// The directory that will be restored.
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.previous) {
            warn!(
                dir = %self.previous.display(),
                error = %e,
                "could not restore working directory"
            );
        }
    }
}
