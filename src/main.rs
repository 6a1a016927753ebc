//! Carimbo - technician report generator with an offline asset cache
//!
//! CLI entry point: sets up logging, loads configuration and turns each
//! subcommand into a lifecycle event for the service worker.

use std::fs;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use carimbo::cli::{parse_report_kind, Cli, Command, ReportArgs};
use carimbo::report::{self, ReportError};
use carimbo::worker::{Event, EventOutcome, ServiceWorker};
use carimbo::network::Request;

/// Initializes logging on stderr: 0 = warn, 1 = info, 2+ = debug
///
/// `RUST_LOG` takes precedence when set.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "carimbo=warn",
        1 => "carimbo=info",
        _ => "carimbo=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Validates the report and prints it to stdout for piping into a clipboard
/// tool; problems go to stderr
fn run_report(args: &ReportArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let kind = parse_report_kind(&args.kind)?;
    match report::generate(kind, &args.fields()) {
        Ok(text) => {
            println!("{}", text);
            Ok(ExitCode::SUCCESS)
        }
        Err(ReportError::Invalid(errors)) => {
            eprintln!("Corrija os seguintes campos:");
            for error in errors {
                eprintln!("  - {}", error);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    if let Command::Report(args) = &cli.command {
        return run_report(args);
    }

    let config = cli.load_config()?;
    let worker = ServiceWorker::from_config(&config)?;

    match cli.command {
        Command::Report(_) => unreachable!("report handled above"),
        Command::Install => match worker.dispatch(Event::Install).await {
            EventOutcome::Installed(generation) => {
                println!("Installed {} ({} assets)", generation, config.cache.manifest.len());
                Ok(ExitCode::SUCCESS)
            }
            EventOutcome::InstallFailed(err) => Err(err.into()),
            _ => Err("cache unavailable: nothing was installed".into()),
        },
        Command::Activate => match worker.dispatch(Event::Activate).await {
            EventOutcome::Activated(report) if report.activated => {
                println!("Activated {}", worker.generation());
                for generation in &report.deleted {
                    println!("  deleted {}", generation);
                }
                for failure in &report.failed {
                    eprintln!("  {}", failure);
                }
                Ok(ExitCode::SUCCESS)
            }
            EventOutcome::Activated(_) => {
                eprintln!(
                    "Generation {} is not installed; run `carimbo install` first",
                    worker.generation()
                );
                Ok(ExitCode::FAILURE)
            }
            _ => Err("cache unavailable: nothing was activated".into()),
        },
        Command::Fetch { locator, output } => {
            let served = match worker.dispatch(Event::Fetch(Request::get(locator))).await {
                EventOutcome::Responded(result) => result?,
                other => unreachable!("fetch answered with {:?}", other),
            };
            info!(source = ?served.source, status = served.response.status, "served");

            match output {
                Some(path) => fs::write(path, &served.response.body)?,
                None => io::stdout().write_all(&served.response.body)?,
            }
            Ok(if served.response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Stores => {
            let Some(cache) = worker.cache() else {
                return Err("cache unavailable".into());
            };
            for store in cache.stores()? {
                let state = match store.state {
                    Some(state) => format!("{:?}", state).to_lowercase(),
                    None => "unknown".to_string(),
                };
                println!(
                    "{}{}\t{}\t{} entries",
                    if store.current { "* " } else { "  " },
                    store.id,
                    state,
                    store.entries
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
