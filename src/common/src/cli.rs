use clap::Parser;
use std::path::PathBuf;

/// Common CLI arguments shared by the pruner binary
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path (defaults to ./regprune.toml if present)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging", conflicts_with = "quiet")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (warnings and errors only)")]
    pub quiet: bool,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::{Configuration, LogFormat};
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Level used when `RUST_LOG` is not set
    pub fn default_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments and the configured format
    pub fn init_logging(args: &CommonArgs, format: LogFormat) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level(args)));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        match format {
            LogFormat::Text => builder.init(),
            LogFormat::Json => builder.json().flatten_event(true).init(),
        }
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => Configuration::load_from_path(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            None => Configuration::load().context("Failed to load configuration"),
        }
    }
}
