//! Shared test doubles for the backup pipeline.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use gitvcl::error::{BackupError, Result};
use gitvcl::{ControllerClient, Snapshot, VersionControl};

/// Controller whose answer the test changes between runs.
///
/// `None` behaves like an unreachable controller.
#[derive(Clone, Default)]
pub struct FakeController {
    state: Rc<RefCell<Option<Snapshot>>>,
    pub calls: Rc<RefCell<usize>>,
}

impl FakeController {
    pub fn serving(pairs: &[(&str, &str)]) -> Self {
        let controller = Self::default();
        controller.serve(pairs);
        controller
    }

    pub fn serve(&self, pairs: &[(&str, &str)]) {
        *self.state.borrow_mut() = Some(Snapshot::from_pairs(pairs.iter().copied()).unwrap());
    }

    pub fn go_offline(&self) {
        *self.state.borrow_mut() = None;
    }
}

impl ControllerClient for FakeController {
    fn fetch_snapshot(&self) -> Result<Snapshot> {
        *self.calls.borrow_mut() += 1;
        self.state
            .borrow()
            .clone()
            .ok_or_else(|| BackupError::connection("connection refused"))
    }
}

/// In-memory stand-in for git: an index and a list of committed trees,
/// both read from the real working copy on disk.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    pub root: PathBuf,
    pub index: BTreeMap<String, String>,
    pub commits: Vec<BTreeMap<String, String>>,
    pub prepared: usize,
    pub push_remote: bool,
    pub fail_push: bool,
    pub fail_commit: bool,
    pub pushes: usize,
}

impl MemoryRepository {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn head(&self) -> BTreeMap<String, String> {
        self.commits.last().cloned().unwrap_or_default()
    }

    /// Paths whose content differs between the last two commits
    pub fn last_commit_paths(&self) -> Vec<String> {
        let n = self.commits.len();
        let after = self.head();
        let before = if n >= 2 {
            self.commits[n - 2].clone()
        } else {
            BTreeMap::new()
        };
        let mut keys: Vec<String> = before.keys().chain(after.keys()).cloned().collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
            .filter(|k| before.get(k) != after.get(k))
            .collect()
    }
}

impl VersionControl for MemoryRepository {
    fn prepare(&mut self) -> Result<()> {
        self.prepared += 1;
        fs::create_dir_all(&self.root).map_err(|e| BackupError::commit(e.to_string()))
    }

    fn tracked_files(&self) -> Result<Vec<String>> {
        Ok(self.index.keys().cloned().collect())
    }

    fn stage(&mut self, paths: &[String]) -> Result<()> {
        for path in paths {
            match fs::read_to_string(self.root.join(path)) {
                Ok(content) => {
                    self.index.insert(path.clone(), content);
                }
                Err(_) => {
                    self.index.remove(path);
                }
            }
        }
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        Ok(self.index != self.head())
    }

    fn commit(&mut self, _message: &str) -> Result<String> {
        if self.fail_commit {
            return Err(BackupError::commit("unable to write new index file"));
        }
        self.commits.push(self.index.clone());
        Ok(format!("commit-{}", self.commits.len()))
    }

    fn push_enabled(&self) -> bool {
        self.push_remote
    }

    fn push(&mut self) -> Result<()> {
        if self.fail_push {
            return Err(BackupError::sync("remote rejected push"));
        }
        self.pushes += 1;
        Ok(())
    }
}

/// Whether a usable `git` binary is on PATH
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir` and return trimmed stdout, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Number of commits reachable from HEAD
pub fn commit_count(dir: &Path) -> usize {
    git(dir, &["rev-list", "--count", "HEAD"]).parse().unwrap()
}

/// Paths touched by the HEAD commit
pub fn head_paths(dir: &Path) -> Vec<String> {
    git(dir, &["show", "--name-only", "--format=", "HEAD"])
        .lines()
        .map(str::to_string)
        .collect()
}
