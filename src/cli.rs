//! Command-line interface parsing for carimbo
//!
//! This module handles parsing of CLI arguments using clap: global options for
//! verbosity, config file and cache directory, and one subcommand per cache
//! lifecycle event plus `report` for generating technician reports.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::report::{ReportFields, ReportKind};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified report kind is not recognized
    #[error("Invalid report kind: '{0}'. Valid kinds: reparo, instalacao")]
    InvalidReportKind(String),
}

/// Carimbo - technician report generator with an offline asset cache
#[derive(Parser, Debug)]
#[command(name = "carimbo")]
#[command(about = "Technician report generator with an offline asset cache")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the config file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override the cache directory
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download every manifest asset into the configured generation
    Install,
    /// Make the configured generation current and delete older generations
    Activate,
    /// Request an asset, from cache when present, otherwise from the network
    Fetch {
        /// Resource locator, e.g. /index.html
        locator: String,
        /// Write the body to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// List generation stores on disk
    Stores,
    /// Validate a report and print the text to paste
    ///
    /// The report is written to stdout and nothing is copied for you. Pipe it
    /// to a clipboard tool to paste it into the ticket, e.g.
    /// `carimbo report reparo ... | xclip -selection clipboard` or `| pbcopy`.
    Report(ReportArgs),
}

/// Form fields for the `report` subcommand
#[derive(Args, Debug, Default)]
pub struct ReportArgs {
    /// Report kind: reparo or instalacao
    #[arg(value_name = "KIND")]
    pub kind: String,

    /// Customer complaint (reparo) / all products working (instalacao)
    #[arg(long, default_value = "")]
    pub cliente: String,

    /// What was done to fix it (reparo) / where the modem is installed (instalacao)
    #[arg(long, default_value = "")]
    pub endereco: String,

    /// Guidance given to the customer
    #[arg(long, default_value = "")]
    pub produto: String,

    /// Heat map code
    #[arg(long, default_value = "")]
    pub tecnico: String,

    /// Speed test ID
    #[arg(long, default_value = "")]
    pub test: String,

    /// Fiber power meter reading
    #[arg(long, default_value = "")]
    pub power: String,

    /// Free-form notes
    #[arg(long, default_value = "")]
    pub obs: String,
}

impl ReportArgs {
    pub fn fields(&self) -> ReportFields {
        ReportFields {
            cliente: self.cliente.clone(),
            endereco: self.endereco.clone(),
            produto: self.produto.clone(),
            tecnico: self.tecnico.clone(),
            test: self.test.clone(),
            power: self.power.clone(),
            obs: self.obs.clone(),
        }
    }
}

/// Parses a report kind argument into a ReportKind.
///
/// # Returns
/// * `Ok(ReportKind)` if the string matches a known kind or alias
/// * `Err(CliError::InvalidReportKind)` if it doesn't
pub fn parse_report_kind(s: &str) -> Result<ReportKind, CliError> {
    ReportKind::from_str(s).ok_or_else(|| CliError::InvalidReportKind(s.to_string()))
}

impl Cli {
    /// Loads configuration and applies command-line overrides
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = Some(dir.clone());
        }
        Ok(config)
    }
}
