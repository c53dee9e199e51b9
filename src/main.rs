use clap::Parser;
use common::cli::{CommonArgs, utils};
use pruner::TracingSink;
use std::process::ExitCode;
use std::sync::Arc;

/// Prune stale tags and package versions from container registries
#[derive(Parser)]
#[command(name = "regprune", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
}

fn report_error(e: &anyhow::Error) {
    eprintln!("Error: {e}");
    for cause in e.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match utils::load_config(cli.common.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e);
            return ExitCode::from(2);
        }
    };

    utils::init_logging(&cli.common, config.runtime.log_format);

    tracing::info!(
        dockerhub = config.dockerhub.is_configured(),
        github = config.github.is_configured(),
        concurrency = config.runtime.concurrency,
        "Starting registry prune"
    );

    match pruner::run(&config, Arc::new(TracingSink)).await {
        Ok(summary) => {
            for report in &summary.reports {
                match &report.fatal {
                    Some(e) => tracing::error!(
                        provider = %report.provider,
                        repository = %report.repository,
                        error = %e,
                        "Pipeline failed"
                    ),
                    None => tracing::info!(
                        provider = %report.provider,
                        repository = %report.repository,
                        summary = %report.display(),
                        "Pipeline finished"
                    ),
                }
            }
            ExitCode::from(summary.exit_code())
        }
        Err(e) => {
            report_error(&anyhow::Error::new(e).context("Failed to build HTTP client"));
            ExitCode::from(2)
        }
    }
}
