//! Configuration file handling for backup runs.
//!
//! The configuration is a TOML file named on the command line. It is loaded
//! once per invocation and never mutated afterwards; every other component
//! receives the pieces it needs from here.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

use crate::error::{BackupError, Result};

/// Default controller request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default branch for freshly initialised repositories
pub const DEFAULT_BRANCH: &str = "main";

/// Log levels accepted in `[logging] level`
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete configuration for one backup run
#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    /// Base URL of the Varnish Controller (without `/api/v1`)
    pub api_url: String,
    pub controller: ControllerSettings,
    pub git: GitSettings,
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// `[controller]` section
#[derive(Clone, Deserialize)]
pub struct ControllerSettings {
    pub username: String,
    /// Password stored inline in the config file
    #[serde(default)]
    pub password: Option<String>,
    /// Name of an environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Accept self-signed controller certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

// Hand-written so the password never ends up in logs.
impl fmt::Debug for ControllerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerSettings")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .field("organization", &self.organization)
            .field("timeout_secs", &self.timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// `[git]` section
#[derive(Debug, Clone, Deserialize)]
pub struct GitSettings {
    /// Working copy the VCL files are written into
    pub repo_folder: PathBuf,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub author: String,
    pub email: String,
    #[serde(default)]
    pub push_to_repo: bool,
    /// Remote URL used as `origin` when pushing
    #[serde(default)]
    pub repository: Option<String>,
    /// Private key handed to ssh for pushes
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
}

/// `[backup]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupSettings {
    #[serde(default)]
    pub stale_files: StaleFilePolicy,
    /// Lock file path; defaults to `<repo_folder>.lock`
    #[serde(default)]
    pub lock_file: Option<PathBuf>,
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append log lines to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// What to do with tracked files the controller no longer reports
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StaleFilePolicy {
    /// Delete them from the working copy and commit the removal
    #[default]
    Remove,
    /// Leave them in place as historical artifacts
    Keep,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BackupConfig {
    /// Parse a configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BackupError::config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
        {
            return Err(BackupError::config(format!(
                "{:?} is a YAML file; configuration is read as TOML with the same keys (see settings.example.toml)",
                path
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| {
            BackupError::config(format!(
                "Failed to read configuration from {:?}: {}",
                path, e
            ))
        })?;
        Self::parse(&content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let api_url = self.api_url.trim();
        if api_url.is_empty() {
            return Err(BackupError::config("api_url must be specified"));
        }
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(BackupError::config(
                "api_url must start with http:// or https://",
            ));
        }

        if self.controller.username.trim().is_empty() {
            return Err(BackupError::config("controller.username must be specified"));
        }
        match (&self.controller.password, &self.controller.password_env) {
            (None, None) => {
                return Err(BackupError::config(
                    "one of controller.password or controller.password_env must be specified",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(BackupError::config(
                    "controller.password and controller.password_env are mutually exclusive",
                ));
            }
            (None, Some(var)) if var.trim().is_empty() => {
                return Err(BackupError::config("controller.password_env cannot be empty"));
            }
            _ => {}
        }
        if self.controller.timeout_secs == 0 {
            return Err(BackupError::config("controller.timeout_secs must be positive"));
        }

        if self.git.repo_folder.as_os_str().is_empty() {
            return Err(BackupError::config("git.repo_folder must be specified"));
        }
        validate_branch(&self.git.branch)?;
        if self.git.author.trim().is_empty() {
            return Err(BackupError::config("git.author must be specified"));
        }
        if self.git.email.trim().is_empty() {
            return Err(BackupError::config("git.email must be specified"));
        }
        if self.git.push_to_repo
            && self
                .git
                .repository
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
        {
            return Err(BackupError::config(
                "git.repository must be specified when git.push_to_repo is enabled",
            ));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(BackupError::config(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Path of the advisory lock file guarding the working copy
    pub fn lock_path(&self) -> PathBuf {
        if let Some(path) = &self.backup.lock_file {
            return path.clone();
        }
        let mut name = self
            .git
            .repo_folder
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "gitvcl".into());
        name.push(".lock");
        self.git.repo_folder.with_file_name(name)
    }

    /// Build the credential provider described by `[controller]`
    pub fn credential_provider(&self) -> Box<dyn CredentialProvider> {
        let username = self.controller.username.clone();
        match (&self.controller.password, &self.controller.password_env) {
            (Some(password), _) => Box::new(StaticCredentials::new(username, password.clone())),
            (None, Some(variable)) => Box::new(EnvCredentials::new(username, variable.clone())),
            // validate() rejects this; an empty password lets the controller refuse it
            (None, None) => Box::new(StaticCredentials::new(username, String::new())),
        }
    }
}

fn validate_branch(branch: &str) -> Result<()> {
    if branch.is_empty()
        || branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c))
    {
        return Err(BackupError::config(format!(
            "git.branch {:?} is not a valid branch name",
            branch
        )));
    }
    Ok(())
}

/// Username/password pair presented to the controller
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of controller credentials.
///
/// Resolved at fetch time rather than at config load, so secrets held in the
/// environment are read as late as possible.
pub trait CredentialProvider {
    fn credentials(&self) -> Result<Credentials>;
}

/// Credentials written directly in the configuration file
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// Password taken from an environment variable
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    username: String,
    variable: String,
}

impl EnvCredentials {
    pub fn new(username: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            variable: variable.into(),
        }
    }
}

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let password = std::env::var(&self.variable).map_err(|e| {
            BackupError::config(format!(
                "controller password variable {} is not usable: {}",
                self.variable, e
            ))
        })?;
        Ok(Credentials {
            username: self.username.clone(),
            password,
        })
    }
}
