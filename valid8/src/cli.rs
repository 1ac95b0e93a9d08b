//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::events::ServiceType;

/// valid8 - KYC/KYB verification routing
#[derive(Parser)]
#[command(
    name = "valid8",
    about = "KYC/KYB verification routing with adapter fallback and a live dashboard",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered adapters and the adapter resolution would pick
    Adapters {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Drive simulated verifications and print the resulting dashboard
    Simulate {
        /// Number of verifications to run
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,

        /// Service to verify (nin, bvn, cac, passport, ...)
        #[arg(short, long, default_value = "nin")]
        service: ServiceType,

        /// Preferred adapter
        #[arg(short, long)]
        adapter: Option<String>,

        /// Override every adapter's failure rate (0.0 - 1.0)
        #[arg(long)]
        failure_rate: Option<f64>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Output format for adapter/dashboard commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}
