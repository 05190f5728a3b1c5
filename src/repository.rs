//! The version-controlled side of a backup: the repository holding the
//! working copy and its history.

use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::GitSettings;
use crate::error::{BackupError, Result};
use crate::git::{GitCommand, GitEnv, GitOutput, run_git, run_git_checked};
use crate::snapshot::GITKEEP;

/// Commit primitives the orchestrator needs from a version-control system.
pub trait VersionControl {
    /// Make the repository usable: initialise it if needed and apply
    /// author and remote settings.
    fn prepare(&mut self) -> Result<()>;

    /// Paths currently tracked, relative to the working copy root.
    fn tracked_files(&self) -> Result<Vec<String>>;

    /// Stage the current working-copy state of `paths`, including deletions.
    fn stage(&mut self, paths: &[String]) -> Result<()>;

    /// Whether the index differs from the last commit.
    fn has_staged_changes(&self) -> Result<bool>;

    /// Commit the index and return the new commit id.
    fn commit(&mut self, message: &str) -> Result<String>;

    /// Whether this repository pushes to a remote.
    fn push_enabled(&self) -> bool;

    /// Push the branch to the remote.
    fn push(&mut self) -> Result<()>;
}

/// `VersionControl` backed by the `git` command-line tool
#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
    branch: String,
    author: String,
    email: String,
    remote_url: Option<String>,
    env: GitEnv,
}

impl GitRepository {
    pub fn new(root: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            branch: branch.into(),
            author: "gitvcl".to_string(),
            email: "gitvcl@localhost".to_string(),
            remote_url: None,
            env: GitEnv::default(),
        }
    }

    /// Build from the `[git]` configuration section
    pub fn from_settings(settings: &GitSettings) -> Self {
        let mut repo = Self::new(&settings.repo_folder, &settings.branch)
            .with_author(&settings.author, &settings.email);
        if settings.push_to_repo {
            if let Some(url) = &settings.repository {
                repo = repo.with_remote(url.clone(), settings.ssh_key.clone());
            }
        }
        repo
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = name.into();
        self.email = email.into();
        self
    }

    pub fn with_remote(mut self, url: impl Into<String>, ssh_key: Option<PathBuf>) -> Self {
        self.remote_url = Some(url.into());
        self.env.ssh_key = ssh_key;
        self
    }

    fn is_initialized(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn git(&self, command: GitCommand) -> std::result::Result<GitOutput, anyhow::Error> {
        run_git_checked(&self.root, &self.env, &command)
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.git(GitCommand::SetConfig {
            key: key.to_string(),
            value: value.to_string(),
        })
        .map_err(commit_error)?;
        Ok(())
    }

    fn initialize(&self) -> Result<()> {
        info!(path = %self.root.display(), branch = %self.branch, "Initialising repository");
        fs::create_dir_all(&self.root).map_err(|e| {
            BackupError::commit(format!(
                "Failed to create repository folder {:?}: {}",
                self.root, e
            ))
        })?;
        self.git(GitCommand::Init).map_err(commit_error)?;
        self.git(GitCommand::SetHeadBranch(self.branch.clone()))
            .map_err(commit_error)?;
        self.configure_author()?;

        fs::write(self.root.join(GITKEEP), "").map_err(|e| {
            BackupError::commit(format!("Failed to create {}: {}", GITKEEP, e))
        })?;
        self.git(GitCommand::Add(vec![GITKEEP.to_string()]))
            .map_err(commit_error)?;
        self.git(GitCommand::Commit("Initial commit".to_string()))
            .map_err(commit_error)?;
        Ok(())
    }

    fn configure_author(&self) -> Result<()> {
        self.set_config("user.name", &self.author)?;
        self.set_config("user.email", &self.email)
    }

    fn configure_remote(&self, url: &str) -> Result<()> {
        let current = run_git(&self.root, &self.env, &GitCommand::GetRemoteUrl)
            .map_err(commit_error)?;
        if !current.success {
            debug!(url, "Adding remote");
            self.git(GitCommand::AddRemote(url.to_string()))
                .map_err(commit_error)?;
        } else if current.stdout.trim() != url {
            info!(old = %current.stdout.trim(), new = url, "Updating remote URL");
            self.git(GitCommand::SetRemoteUrl(url.to_string()))
                .map_err(commit_error)?;
        }
        Ok(())
    }
}

fn commit_error(err: anyhow::Error) -> BackupError {
    BackupError::commit(format!("{:#}", err))
}

impl VersionControl for GitRepository {
    fn prepare(&mut self) -> Result<()> {
        if self.is_initialized() {
            self.configure_author()?;
        } else {
            self.initialize()?;
        }
        if let Some(url) = self.remote_url.clone() {
            self.configure_remote(&url)?;
        }
        Ok(())
    }

    fn tracked_files(&self) -> Result<Vec<String>> {
        let output = self.git(GitCommand::ListTracked).map_err(commit_error)?;
        Ok(output
            .stdout
            .split('\0')
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn stage(&mut self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.git(GitCommand::Add(paths.to_vec()))
            .map_err(commit_error)?;
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let output = run_git(&self.root, &self.env, &GitCommand::DiffCachedQuiet)
            .map_err(commit_error)?;
        match output.exit_code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => {
                output
                    .ensure_success("git diff --cached")
                    .map_err(commit_error)?;
                Ok(false)
            }
        }
    }

    fn commit(&mut self, message: &str) -> Result<String> {
        self.git(GitCommand::Commit(message.to_string()))
            .map_err(commit_error)?;
        let head = self.git(GitCommand::RevParseHead).map_err(commit_error)?;
        Ok(head.stdout.trim().to_string())
    }

    fn push_enabled(&self) -> bool {
        self.remote_url.is_some()
    }

    fn push(&mut self) -> Result<()> {
        if self.remote_url.is_none() {
            return Ok(());
        }
        self.git(GitCommand::Push(self.branch.clone()))
            .map_err(|e| BackupError::sync(format!("{:#}", e)))?;
        Ok(())
    }
}
