use clap::{Parser, Subcommand};
use sqlprobe_core::{CancellationToken, HealthReport};
use std::process::ExitCode;

mod commands;

use commands::{CheckArgs, RunArgs};

#[derive(Parser, Debug)]
#[command(name = "sqlprobe", version)]
#[command(about = "Check that relational databases answer a trivial query")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe a single database given on the command line
    Check(CheckArgs),
    /// Probe every database declared in a config file
    Run(RunArgs),
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] sqlprobe_core::ConfigError),
    #[error("Failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    // JSON logs go to stderr so stdout carries only the report.
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init();

    let cli = Cli::parse();

    let outcome = run(cli.command).await;
    match &outcome {
        Ok(report) if !report.status.is_healthy() => {
            tracing::warn!(status = %report.status, "Probes reported a failure");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(error = %e, "sqlprobe failed");
            eprintln!("Error: {e}");
        }
    }

    ExitCode::from(exit_code(&outcome))
}

/// 0 when every probe is healthy, 1 when any fails, 2 when nothing could run
fn exit_code(outcome: &Result<HealthReport, CliError>) -> u8 {
    match outcome {
        Ok(report) if report.status.is_healthy() => 0,
        Ok(_) => 1,
        Err(_) => 2,
    }
}

async fn run(command: Commands) -> Result<HealthReport, CliError> {
    let (checks, tag) = match command {
        Commands::Check(args) => (args.into_checks()?, None),
        Commands::Run(args) => {
            let checks = args.load_checks()?;
            (checks, args.tag)
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling probes");
            on_interrupt.cancel();
        }
    });

    let report = match tag {
        Some(tag) => checks.check_tagged(&tag, &cancel).await,
        None => checks.check_all(&cancel).await,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}
