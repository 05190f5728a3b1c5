//! Logging setup for the `gitvcl` binary.

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;
use crate::error::{BackupError, Result};

/// Install the global tracing subscriber.
///
/// The level comes from `[logging] level` unless `RUST_LOG` is set. With
/// `[logging] file` the output is appended there without ANSI colours,
/// otherwise it goes to stderr so cron mails it.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.to_ascii_lowercase()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match &settings.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    BackupError::config(format!("Failed to open log file {:?}: {}", path, e))
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| BackupError::config(format!("Failed to initialise logging: {}", e)))
}
