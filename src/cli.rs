use clap::Parser;
use std::path::PathBuf;

/// gitvcl - Varnish Controller VCL backup tool
#[derive(Parser, Debug)]
#[command(name = "gitvcl")]
#[command(about = "Back up deployed VCL files from a Varnish Controller into git")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "settings.toml")]
    pub config: PathBuf,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
