//! Writing a snapshot into the repository working tree.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{BackupError, Result};
use crate::snapshot::{GITKEEP, Snapshot, sha256_hex, validate_name};

/// What `WorkingCopy::apply` did to each snapshot file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ApplyReport {
    /// Whether any file was written
    pub fn wrote_anything(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty()
    }
}

/// Directory mirroring the committed snapshot
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    root: PathBuf,
}

impl WorkingCopy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write every snapshot file whose content differs from disk.
    ///
    /// Files already holding the right content are not touched, so applying
    /// the same snapshot twice writes nothing the second time.
    pub fn apply(&self, snapshot: &Snapshot) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();

        for (name, content) in snapshot.iter() {
            let path = self.root.join(validate_name(name)?);
            let wanted = sha256_hex(content.as_bytes());

            // Left behind by files kept under `stale_files = "keep"`.
            if path.is_dir() {
                return Err(BackupError::write(format!(
                    "Cannot write {}: {:?} is a directory holding files the controller no longer deploys; remove them or set stale_files = \"remove\"",
                    name, path
                )));
            }

            let existed = match fs::read(&path) {
                Ok(bytes) if sha256_hex(&bytes) == wanted => {
                    debug!(file = name, sha = %wanted, "Unchanged");
                    report.unchanged.push(name.to_string());
                    continue;
                }
                Ok(_) => true,
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => {
                    return Err(BackupError::write(format!(
                        "Failed to read {:?}: {}",
                        path, e
                    )));
                }
            };

            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    BackupError::write(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
            info!(file = name, "Writing file");
            fs::write(&path, content)
                .map_err(|e| BackupError::write(format!("Failed to write {:?}: {}", path, e)))?;

            if existed {
                report.updated.push(name.to_string());
            } else {
                report.created.push(name.to_string());
            }
        }

        Ok(report)
    }

    /// Delete tracked files that are no longer part of the snapshot.
    ///
    /// Returns the removed paths so they can be staged. `.gitkeep` is never
    /// considered stale.
    pub fn remove_stale(&self, tracked: &[String], snapshot: &Snapshot) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        let mut parents = BTreeSet::new();

        for name in tracked {
            if name == GITKEEP || snapshot.contains(name) {
                continue;
            }
            let path = self.root.join(name);
            match fs::remove_file(&path) {
                Ok(()) => info!(file = %name, "Removed file no longer deployed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(file = %name, "Stale file already gone from disk");
                }
                Err(e) => {
                    return Err(BackupError::write(format!(
                        "Failed to remove {:?}: {}",
                        path, e
                    )));
                }
            }
            if let Some(parent) = Path::new(name).parent() {
                if !parent.as_os_str().is_empty() {
                    parents.insert(parent.to_path_buf());
                }
            }
            removed.push(name.clone());
        }

        // Deepest directories first; non-empty ones are left alone.
        for dir in parents.iter().rev() {
            for ancestor in dir.ancestors().filter(|a| !a.as_os_str().is_empty()) {
                if let Err(e) = fs::remove_dir(self.root.join(ancestor)) {
                    if e.kind() != ErrorKind::NotFound && e.kind() != ErrorKind::DirectoryNotEmpty
                    {
                        warn!(dir = %ancestor.display(), error = %e, "Could not remove empty directory");
                    }
                    break;
                }
            }
        }

        Ok(removed)
    }
}
