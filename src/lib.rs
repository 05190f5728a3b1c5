//! gitvcl Library
//!
//! Fetches the deployed VCL files from a Varnish Controller and records them
//! in a git repository, one commit per run that changed something.

pub mod backup;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod git;
pub mod lock;
pub mod logging;
pub mod repository;
pub mod snapshot;
pub mod working_copy;

// Re-export main types for convenience
pub use backup::{BackupJob, RunOutcome, commit_message, run_backup};
pub use config::{
    BackupConfig, CredentialProvider, Credentials, EnvCredentials, StaleFilePolicy,
    StaticCredentials,
};
pub use controller::{ControllerClient, HttpController};
pub use error::{BackupError, Result};
pub use lock::RunLock;
pub use repository::{GitRepository, VersionControl};
pub use snapshot::{Snapshot, VclFile};
pub use working_copy::{ApplyReport, WorkingCopy};
