//! gitvcl - Main entry point
//!
//! Runs exactly one backup cycle and exits; scheduling is left to cron.

use std::process::ExitCode;
use tracing::{debug, error, info};

use gitvcl::cli::Cli;
use gitvcl::config::BackupConfig;
use gitvcl::error::BackupError;
use gitvcl::logging::init_tracing;

/// Load and validate the configuration named on the command line
fn load_config(cli: &Cli) -> Result<BackupConfig, BackupError> {
    let config = BackupConfig::load_from_file(&cli.config)?;
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Logging settings live in the config, so config errors go straight to stderr.
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::from(e.exit_code());
        }
    };
    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("✗ {}", e);
        return ExitCode::from(e.exit_code());
    }
    debug!(config = ?cli.config, "Configuration loaded");
    info!(controller = %config.api_url, repo = %config.git.repo_folder.display(), "Starting VCL backup");

    match gitvcl::run_backup(&config) {
        Ok(outcome) => {
            info!(
                created = outcome.created.len(),
                updated = outcome.updated.len(),
                removed = outcome.removed.len(),
                commit = outcome.commit.as_deref().unwrap_or("none"),
                pushed = outcome.pushed,
                "Backup finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Backup failed: {}", e);
            eprintln!("✗ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
