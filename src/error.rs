//! Error handling module for gitvcl
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Each variant is one failure category of a backup run and maps to a distinct
//! process exit code, so cron mail and wrappers can tell them apart.

use thiserror::Error;

/// Main error type for a backup run
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration errors (missing file, bad TOML, missing fields)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Controller unreachable or authentication rejected
    #[error("Connection error: {0}")]
    Connection(String),

    /// Controller answered with something we cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Filesystem failure while updating the working copy
    #[error("Write error: {0}")]
    Write(String),

    /// git init/stage/commit failure
    #[error("Commit error: {0}")]
    Commit(String),

    /// Push to the remote failed (local commit is kept)
    #[error("Sync error: {0}")]
    Sync(String),

    /// Another run holds the working copy lock
    #[error("Lock error: {0}")]
    Lock(String),
}

/// Result type alias for backup operations
pub type Result<T> = std::result::Result<T, BackupError>;

// Convenient error constructors
impl BackupError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Create a commit error
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }

    /// Create a sync error
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    /// Create a lock error
    pub fn lock(msg: impl Into<String>) -> Self {
        Self::Lock(msg.into())
    }

    /// Process exit code for this failure category.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Connection(_) => 3,
            Self::Protocol(_) => 4,
            Self::Write(_) => 5,
            Self::Commit(_) => 6,
            Self::Sync(_) => 7,
            Self::Lock(_) => 8,
        }
    }
}
