//! Typed git invocations.
//!
//! Every git call the backup makes is a `GitCommand` variant, so the exact
//! flags live in one place and callers cannot misspell them. `run_git` is the
//! only function that spawns the `git` binary.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// A git subcommand with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCommand {
    /// `git init --quiet`
    Init,
    /// `git symbolic-ref HEAD refs/heads/<branch>`
    SetHeadBranch(String),
    /// `git config <key> <value>`
    SetConfig { key: String, value: String },
    /// `git remote get-url origin`
    GetRemoteUrl,
    /// `git remote add origin <url>`
    AddRemote(String),
    /// `git remote set-url origin <url>`
    SetRemoteUrl(String),
    /// `git ls-files -z`
    ListTracked,
    /// `git add --all -- <paths>`
    Add(Vec<String>),
    /// `git diff --cached --quiet` (exit code 1 means staged changes)
    DiffCachedQuiet,
    /// `git commit --quiet --no-verify -m <message>`
    Commit(String),
    /// `git rev-parse HEAD`
    RevParseHead,
    /// `git push --quiet --set-upstream origin <branch>`
    Push(String),
}

/// Name of the remote pushes go to
pub const REMOTE: &str = "origin";

impl GitCommand {
    /// Arguments exactly as they are passed to `git`.
    pub fn to_cli_args(&self) -> Vec<String> {
        let args: Vec<&str> = match self {
            GitCommand::Init => vec!["init", "--quiet"],
            GitCommand::SetHeadBranch(branch) => {
                return vec![
                    "symbolic-ref".into(),
                    "HEAD".into(),
                    format!("refs/heads/{}", branch),
                ];
            }
            GitCommand::SetConfig { key, value } => vec!["config", key.as_str(), value.as_str()],
            GitCommand::GetRemoteUrl => vec!["remote", "get-url", REMOTE],
            GitCommand::AddRemote(url) => vec!["remote", "add", REMOTE, url.as_str()],
            GitCommand::SetRemoteUrl(url) => vec!["remote", "set-url", REMOTE, url.as_str()],
            GitCommand::ListTracked => vec!["ls-files", "-z"],
            GitCommand::Add(paths) => {
                let mut args = vec!["add", "--all", "--"];
                args.extend(paths.iter().map(String::as_str));
                args
            }
            GitCommand::DiffCachedQuiet => vec!["diff", "--cached", "--quiet"],
            GitCommand::Commit(message) => vec!["commit", "--quiet", "--no-verify", "-m", message.as_str()],
            GitCommand::RevParseHead => vec!["rev-parse", "HEAD"],
            GitCommand::Push(branch) => {
                vec!["push", "--quiet", "--set-upstream", REMOTE, branch.as_str()]
            }
        };
        args.into_iter().map(String::from).collect()
    }
}

/// Environment shared by every git invocation in one repository.
#[derive(Debug, Clone, Default)]
pub struct GitEnv {
    /// Private key for ssh remotes
    pub ssh_key: Option<PathBuf>,
}

impl GitEnv {
    /// Environment variables for the child process.
    pub fn get_env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];
        if let Some(key) = &self.ssh_key {
            vars.push((
                "GIT_SSH_COMMAND".to_string(),
                format!("ssh -i '{}' -o IdentitiesOnly=yes", key.display()),
            ));
        }
        vars
    }
}

/// Output from a git execution.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output from git.
    pub stdout: String,
    /// Standard error from git.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether git exited successfully (exit code 0).
    pub success: bool,
}

impl GitOutput {
    /// Check that git succeeded and return an error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            let code = self.exit_code.unwrap_or(-1);
            anyhow::bail!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr.trim()
            )
        }
    }
}

/// Run one git command inside `workdir`.
///
/// A non-zero exit is not an error here; callers decide with
/// `GitOutput::ensure_success`, since some commands report through their
/// exit code.
pub fn run_git(workdir: &Path, env: &GitEnv, command: &GitCommand) -> Result<GitOutput> {
    let cli_args = command.to_cli_args();
    debug!(workdir = %workdir.display(), args = ?cli_args, "run_git");

    let mut cmd = Command::new("git");
    // Global options: literal paths from the controller, never prompt for a
    // signing passphrase from cron.
    cmd.args(["--literal-pathspecs", "-c", "commit.gpgsign=false"])
        .args(&cli_args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env.get_env_vars() {
        cmd.env(key, value);
    }

    let output = cmd
        .output()
        .with_context(|| format!("Failed to spawn git {}", cli_args.first().map_or("", String::as_str)))?;

    Ok(GitOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code(),
        success: output.status.success(),
    })
}

/// Run a git command and require success.
pub fn run_git_checked(workdir: &Path, env: &GitEnv, command: &GitCommand) -> Result<GitOutput> {
    let output = run_git(workdir, env, command)?;
    let name = command.to_cli_args().into_iter().next().unwrap_or_default();
    output.ensure_success(&format!("git {}", name))?;
    Ok(output)
}
