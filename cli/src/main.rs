#![allow(clippy::print_stdout)]
use crate::cli::{Args, Command, EndpointArgs};
use clap::Parser;
use pod_federation::report::append;
use pod_federation::{
    EndpointRegistry, FederationConfig, FederationEngine, QuerySource, RetryPolicy, RunStatus,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

/// The report could not be appended to the report file.
const EXIT_WRITE_FAILED: u8 = 2;
/// The run was interrupted by the user (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
pub async fn main() -> anyhow::Result<ExitCode> {
    // Variables that are already set take precedence over the .env file.
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Cannot load the environment file"),
    }

    let matches = Args::parse();
    match matches.command {
        Command::Testrun {
            endpoints,
            queries_file,
            report_file,
            timeout_secs,
            max_retries,
            backoff_ms,
            max_in_flight,
        } => {
            let mut config = federation_config(endpoints, queries_file, report_file);
            config.timeout = Duration::from_secs(timeout_secs);
            config.retry = RetryPolicy {
                max_retries,
                backoff_base: Duration::from_millis(backoff_ms),
            };
            config.max_in_flight = max_in_flight;
            testrun(&config).await
        }
        Command::Pods { endpoints } => {
            let config = federation_config(endpoints, PathBuf::new(), PathBuf::new());
            let registry = EndpointRegistry::from_config(&config)?;
            for endpoint in registry.iter() {
                match &endpoint.label {
                    Some(label) => println!("{}\t{}\t{label}", endpoint.pod_id, endpoint.url),
                    None => println!("{}\t{}", endpoint.pod_id, endpoint.url),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs to stderr, such that stdout only contains the summary.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn federation_config(
    endpoints: EndpointArgs,
    queries_file: PathBuf,
    report_file: PathBuf,
) -> FederationConfig {
    let mut config = FederationConfig::new(queries_file, report_file);
    config.default_endpoint = endpoints.endpoint;
    config.pods = endpoints.pods;
    config
}

async fn testrun(config: &FederationConfig) -> anyhow::Result<ExitCode> {
    let engine = FederationEngine::from_config(config)?;
    let source = QuerySource::open(&config.queries_file)?;
    info!(
        pods = engine.registry().len(),
        queries_file = %config.queries_file.display(),
        "Configured federation"
    );

    let cancel = CancellationToken::new();
    // Stays installed until the report is written. A partial append would corrupt the report
    // file, so an interrupt during the write only changes the exit code.
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, writing the queries that already completed");
                cancel.cancel();
            }
        }
    });
    let report = engine.run(&source, cancel.clone()).await;

    let summary = report.summary();
    let written = append(&report, &config.report_file);
    interrupt.abort();
    if let Err(e) = written {
        error!(error = %e, "Cannot write the report, printing it instead");
        print!("{}", report.render());
        println!("{summary}");
        return Ok(ExitCode::from(EXIT_WRITE_FAILED));
    }
    info!(path = %config.report_file.display(), "Appended report");
    println!("{summary}");

    Ok(ExitCode::from(exit_code(report.status(), cancel.is_cancelled())))
}

/// The exit code of a run whose report has been written.
fn exit_code(status: RunStatus, interrupted: bool) -> u8 {
    match status {
        RunStatus::Completed if !interrupted => 0,
        RunStatus::Completed | RunStatus::Interrupted => EXIT_INTERRUPTED,
    }
}
