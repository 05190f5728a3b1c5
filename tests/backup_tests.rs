//! Tests for the backup pipeline
//!
//! These tests drive `BackupJob` with an in-memory controller and repository
//! and verify:
//! - Working copy equals the fetched snapshot after a run
//! - Idempotent runs create no commit
//! - Failure categories abort the pipeline at the right point
//! - Stale file policy
//! - Push behaviour

mod common;

use chrono::{Local, TimeZone};
use common::{FakeController, MemoryRepository};
use gitvcl::error::BackupError;
use gitvcl::{BackupJob, StaleFilePolicy, WorkingCopy};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn job(
    dir: &Path,
    controller: &FakeController,
    policy: StaleFilePolicy,
) -> BackupJob<FakeController, MemoryRepository> {
    BackupJob::new(
        controller.clone(),
        MemoryRepository::new(dir),
        WorkingCopy::new(dir),
        policy,
    )
}

fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

// =============================================================================
// Snapshot Mirroring Tests
// =============================================================================

#[test]
fn test_first_run_writes_and_commits_snapshot() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A"), ("custom.vcl", "B")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);

    let outcome = job.run().unwrap();

    assert_eq!(outcome.created, vec!["custom.vcl", "default.vcl"]);
    assert!(outcome.committed());
    assert_eq!(read(dir.path(), "default.vcl"), "A");
    assert_eq!(read(dir.path(), "custom.vcl"), "B");
    assert_eq!(job.repository().commits.len(), 1);
}

#[test]
fn test_second_identical_run_is_noop() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);

    assert!(job.run().unwrap().committed());
    let second = job.run().unwrap();

    assert!(!second.committed());
    assert!(second.created.is_empty());
    assert!(second.updated.is_empty());
    assert_eq!(job.repository().commits.len(), 1);
}

#[test]
fn test_added_file_scenario() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);
    job.run().unwrap();

    controller.serve(&[("default.vcl", "A"), ("custom.vcl", "B")]);
    let outcome = job.run().unwrap();

    assert_eq!(outcome.created, vec!["custom.vcl"]);
    assert!(outcome.updated.is_empty());
    assert_eq!(read(dir.path(), "custom.vcl"), "B");
    assert_eq!(read(dir.path(), "default.vcl"), "A");
    assert_eq!(job.repository().commits.len(), 2);
    assert_eq!(job.repository().last_commit_paths(), vec!["custom.vcl"]);
}

#[test]
fn test_single_changed_file_makes_one_commit_touching_it() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("a.vcl", "1"), ("b.vcl", "2"), ("c.vcl", "3")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);
    job.run().unwrap();

    controller.serve(&[("a.vcl", "1"), ("b.vcl", "two"), ("c.vcl", "3")]);
    let outcome = job.run().unwrap();

    assert_eq!(outcome.updated, vec!["b.vcl"]);
    assert_eq!(job.repository().commits.len(), 2);
    assert_eq!(job.repository().last_commit_paths(), vec!["b.vcl"]);
}

#[test]
fn test_partial_write_from_failed_run_is_committed_next_time() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);
    job.run().unwrap();

    // A previous run wrote the new content but died before committing.
    fs::write(dir.path().join("default.vcl"), "A2").unwrap();
    controller.serve(&[("default.vcl", "A2")]);
    let outcome = job.run().unwrap();

    assert!(outcome.updated.is_empty());
    assert!(outcome.committed());
    assert_eq!(job.repository().head().get("default.vcl").unwrap(), "A2");
}

#[test]
fn test_local_edit_is_overwritten_and_committed() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);
    job.run().unwrap();

    fs::write(dir.path().join("default.vcl"), "tampered").unwrap();
    let outcome = job.run().unwrap();

    assert_eq!(outcome.updated, vec!["default.vcl"]);
    assert!(!outcome.committed(), "content matches the last commit again");
    assert_eq!(read(dir.path(), "default.vcl"), "A");
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_unreachable_controller_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);
    job.run().unwrap();

    controller.go_offline();
    let err = job.run().unwrap_err();

    assert!(matches!(err, BackupError::Connection(_)));
    assert_eq!(err.exit_code(), 3);
    assert_eq!(read(dir.path(), "default.vcl"), "A");
    assert_eq!(job.repository().commits.len(), 1);
    assert_eq!(job.repository().prepared, 1, "repository untouched after fetch failure");
}

#[test]
fn test_unwritable_file_is_write_error_without_commit() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("default.vcl")).unwrap();
    let controller = FakeController::serving(&[("custom.vcl", "B"), ("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);

    let err = job.run().unwrap_err();

    assert!(matches!(err, BackupError::Write(_)), "{err}");
    assert_eq!(err.exit_code(), 5);
    assert!(job.repository().commits.is_empty());
    assert!(job.repository().index.is_empty(), "nothing staged");
}

#[test]
fn test_commit_failure_keeps_written_files() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut repo = MemoryRepository::new(dir.path());
    repo.fail_commit = true;
    let mut job = BackupJob::new(
        controller,
        repo,
        WorkingCopy::new(dir.path()),
        StaleFilePolicy::Remove,
    );

    let err = job.run().unwrap_err();

    assert!(matches!(err, BackupError::Commit(_)), "{err}");
    assert_eq!(err.exit_code(), 6);
    assert_eq!(read(dir.path(), "default.vcl"), "A");
    assert!(job.repository().commits.is_empty());
}

#[test]
fn test_push_failure_keeps_local_commit() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut repo = MemoryRepository::new(dir.path());
    repo.push_remote = true;
    repo.fail_push = true;
    let mut job = BackupJob::new(
        controller,
        repo,
        WorkingCopy::new(dir.path()),
        StaleFilePolicy::Remove,
    );

    let err = job.run().unwrap_err();

    assert!(matches!(err, BackupError::Sync(_)));
    assert_eq!(job.repository().commits.len(), 1);
}

#[test]
fn test_push_runs_on_unchanged_runs() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut repo = MemoryRepository::new(dir.path());
    repo.push_remote = true;
    let mut job = BackupJob::new(
        controller,
        repo,
        WorkingCopy::new(dir.path()),
        StaleFilePolicy::Remove,
    );

    assert!(job.run().unwrap().pushed);
    let second = job.run().unwrap();
    assert!(second.pushed);
    assert!(!second.committed());
    assert_eq!(job.repository().pushes, 2);
}

#[test]
fn test_no_push_without_remote() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);

    assert!(!job.run().unwrap().pushed);
    assert_eq!(job.repository().pushes, 0);
}

// =============================================================================
// Stale File Policy Tests
// =============================================================================

#[test]
fn test_remove_policy_deletes_and_commits_removal() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A"), ("old.vcl", "O")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);
    job.run().unwrap();

    controller.serve(&[("default.vcl", "A")]);
    let outcome = job.run().unwrap();

    assert_eq!(outcome.removed, vec!["old.vcl"]);
    assert!(!dir.path().join("old.vcl").exists());
    assert!(outcome.committed());
    assert!(!job.repository().head().contains_key("old.vcl"));
    assert_eq!(job.repository().last_commit_paths(), vec!["old.vcl"]);
}

#[test]
fn test_keep_policy_leaves_stale_files() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A"), ("old.vcl", "O")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Keep);
    job.run().unwrap();

    controller.serve(&[("default.vcl", "A")]);
    let outcome = job.run().unwrap();

    assert!(outcome.removed.is_empty());
    assert!(!outcome.committed());
    assert_eq!(read(dir.path(), "old.vcl"), "O");
    assert!(job.repository().head().contains_key("old.vcl"));
}

#[test]
fn test_untracked_stray_files_are_never_committed() {
    let dir = TempDir::new().unwrap();
    let controller = FakeController::serving(&[("default.vcl", "A")]);
    let mut job = job(dir.path(), &controller, StaleFilePolicy::Remove);
    fs::create_dir_all(dir.path()).unwrap();
    fs::write(dir.path().join("notes.txt"), "scratch").unwrap();

    job.run().unwrap();

    assert!(!job.repository().head().contains_key("notes.txt"));
    assert!(dir.path().join("notes.txt").exists());
}

#[test]
fn test_commit_message_uses_run_timestamp() {
    let now = Local.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
    assert_eq!(
        gitvcl::commit_message(now),
        "Updated configs at 2026-03-01 23:30"
    );
}
