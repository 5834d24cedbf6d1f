mod config;
mod wiring;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ingest_core::RunOutcome;
use ingest_engine::{LogProgressSink, RunError, RunReport};
use log::LevelFilter;
use pipeline_logging::{pipeline_error, pipeline_info, pipeline_warn, LogDestination};
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, DEFAULT_CONFIG_PATH};

const EXIT_FATAL: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "listing-ingest")]
#[command(about = "Walk a paginated listing and store every new item once")]
#[command(version)]
struct Cli {
    /// RON configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Override the configured cap on listing expansions
    #[arg(long)]
    max_expansions: Option<u32>,
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
    /// Log to the terminal only
    #[arg(long)]
    no_log_file: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match AppConfig::load(&cli.config, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if let Some(max_expansions) = cli.max_expansions {
        config.max_expansions = max_expansions;
    }

    let destination = match (&config.log_file, cli.no_log_file) {
        (Some(path), false) => LogDestination::Both(path.clone()),
        _ => LogDestination::Terminal,
    };
    pipeline_logging::initialize(destination, cli.log_level);
    pipeline_info!(
        "Starting ingestion of {} (max {} expansions)",
        config.initial_discovery_url,
        config.max_expansions
    );

    let pipeline = match wiring::build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            pipeline_error!("Failed to set up the run: {:#}", err);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pipeline_warn!("Interrupt received, stopping after the current item");
            interrupt.cancel();
        }
    });

    let result = pipeline.run(&cancel, &LogProgressSink).await;
    ExitCode::from(report(result))
}

/// Log how the run ended and pick the process exit status.
fn report(result: Result<RunReport, RunError>) -> u8 {
    match result {
        Ok(report) => {
            let metrics = &report.metrics;
            match report.outcome {
                RunOutcome::Completed => pipeline_info!("Run completed"),
                RunOutcome::CompletedWithFailures => pipeline_warn!(
                    "Run completed with {} failed items and {} failed saves",
                    metrics.jobs_failed,
                    metrics.failed_saves
                ),
                RunOutcome::FatalAborted if report.cancelled => {
                    pipeline_warn!("Run cancelled before the end of the listing")
                }
                RunOutcome::FatalAborted => pipeline_error!("Run aborted"),
            }
            pipeline_info!(
                "Processed {} of {} references, {} saved, success rate {}",
                metrics.jobs_processed,
                metrics.total_requests,
                metrics.successful_saves,
                metrics.success_rate_percent()
            );
            if !report.metrics_flushed {
                pipeline_warn!("Run metrics were not saved");
            }
            exit_code(report.outcome)
        }
        Err(RunError::Auth(err)) => {
            pipeline_error!("Sign-in failed, nothing was processed: {}", err);
            EXIT_FATAL
        }
        Err(err @ RunError::SessionFatal { .. }) => {
            pipeline_error!("{}", err);
            EXIT_FATAL
        }
    }
}

fn exit_code(outcome: RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Completed | RunOutcome::CompletedWithFailures => 0,
        RunOutcome::FatalAborted => EXIT_FATAL,
    }
}
