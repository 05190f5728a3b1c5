//! Advisory lock serialising backup runs.
//!
//! Cron does not stop a slow run from overlapping with the next one, and two
//! runs writing the same working copy would race on git's index. Each run
//! takes a non-blocking exclusive `flock(2)` before touching anything; the
//! kernel drops it when the guard is dropped or the process dies.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BackupError, Result};

/// Held lock; released on drop
pub struct RunLock {
    path: PathBuf,
    _file: Flock<File>,
}

impl fmt::Debug for RunLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLock").field("path", &self.path).finish()
    }
}

impl RunLock {
    /// Take the lock at `path`, failing immediately if another run holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                BackupError::lock(format!("Failed to create lock directory {:?}: {}", parent, e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| BackupError::lock(format!("Failed to open lock file {:?}: {}", path, e)))?;

        let mut locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(BackupError::lock(format!(
                    "another backup run holds {:?}",
                    path
                )));
            }
            Err((_, errno)) => {
                return Err(BackupError::lock(format!(
                    "Failed to lock {:?}: {}",
                    path, errno
                )));
            }
        };

        // Record the holder for whoever inspects a stuck lock; best effort.
        if locked.set_len(0).is_ok() {
            let _ = writeln!(locked, "{}", std::process::id());
        }
        debug!(path = %path.display(), "Acquired run lock");

        Ok(Self {
            path: path.to_path_buf(),
            _file: locked,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
