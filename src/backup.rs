//! Backup orchestration.
//!
//! One run is a straight pipeline: fetch the snapshot, prepare the repository,
//! bring the working copy in line, commit if anything changed, push. Any
//! failure stops the pipeline; whatever was already written stays on disk and
//! is reconciled by the next run, because every snapshot path is staged on
//! every run.

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::config::{BackupConfig, StaleFilePolicy};
use crate::controller::{ControllerClient, HttpController};
use crate::error::Result;
use crate::lock::RunLock;
use crate::repository::{GitRepository, VersionControl};
use crate::working_copy::{ApplyReport, WorkingCopy};

/// Commit message for a run started at `now`
pub fn commit_message(now: DateTime<Local>) -> String {
    now.format("Updated configs at %Y-%m-%d %H:%M").to_string()
}

/// Result of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    /// Id of the commit made by this run, if any
    pub commit: Option<String>,
    pub pushed: bool,
}

impl RunOutcome {
    pub fn committed(&self) -> bool {
        self.commit.is_some()
    }
}

/// One backup cycle over an injected controller and repository
pub struct BackupJob<C, V> {
    controller: C,
    repository: V,
    working_copy: WorkingCopy,
    stale_files: StaleFilePolicy,
}

impl<C: ControllerClient, V: VersionControl> BackupJob<C, V> {
    pub fn new(
        controller: C,
        repository: V,
        working_copy: WorkingCopy,
        stale_files: StaleFilePolicy,
    ) -> Self {
        Self {
            controller,
            repository,
            working_copy,
            stale_files,
        }
    }

    pub fn repository(&self) -> &V {
        &self.repository
    }

    /// Run one cycle stamped with the current local time.
    pub fn run(&mut self) -> Result<RunOutcome> {
        self.run_at(Local::now())
    }

    /// Run one cycle, using `now` for the commit message.
    pub fn run_at(&mut self, now: DateTime<Local>) -> Result<RunOutcome> {
        // Nothing on disk changes until the controller has answered in full.
        let snapshot = self.controller.fetch_snapshot()?;
        if snapshot.is_empty() {
            warn!("Controller reports no deployed VCL files");
        }

        self.repository.prepare()?;

        let removed = match self.stale_files {
            StaleFilePolicy::Remove => {
                let tracked = self.repository.tracked_files()?;
                self.working_copy.remove_stale(&tracked, &snapshot)?
            }
            StaleFilePolicy::Keep => Vec::new(),
        };

        let ApplyReport {
            created, updated, ..
        } = self.working_copy.apply(&snapshot)?;

        let mut paths: Vec<String> = snapshot.names().map(str::to_string).collect();
        paths.extend(removed.iter().cloned());
        self.repository.stage(&paths)?;

        let mut outcome = RunOutcome {
            created,
            updated,
            removed,
            ..RunOutcome::default()
        };

        if self.repository.has_staged_changes()? {
            info!("Changes detected ready to commit.");
            let id = self.repository.commit(&commit_message(now))?;
            info!(commit = %id, "Changes committed to repository.");
            outcome.commit = Some(id);
        } else {
            info!("No changes detected.");
        }

        // Pushing on unchanged runs too lets a failed push heal on the next run.
        if self.repository.push_enabled() {
            info!("Pushing changes to remote repository.");
            self.repository.push()?;
            info!("Changes pushed to remote repository.");
            outcome.pushed = true;
        }

        Ok(outcome)
    }
}

/// Perform one complete backup run for a validated configuration.
///
/// Takes the run lock, then drives a `BackupJob` over the HTTP controller and
/// the git repository named in `config`.
pub fn run_backup(config: &BackupConfig) -> Result<RunOutcome> {
    let _lock = RunLock::acquire(config.lock_path())?;

    let controller = HttpController::from_config(config)?;
    let repository = GitRepository::from_settings(&config.git);
    let working_copy = WorkingCopy::new(&config.git.repo_folder);

    let mut job = BackupJob::new(
        controller,
        repository,
        working_copy,
        config.backup.stale_files,
    );
    job.run()
}
