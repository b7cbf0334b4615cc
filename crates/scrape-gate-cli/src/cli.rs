//! Command-line argument parsing with clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Analyze scrape-gate rejection logs, once or continuously.
///
/// With a FILE argument the log is scanned once and a ranked report is
/// printed. Without one, a live monitor prints a snapshot every interval
/// until interrupted, then prints a final report.
#[derive(Parser, Debug, Clone)]
#[command(name = "gate-monitor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log file to analyze once.
    #[arg(value_name = "FILE", conflicts_with = "watch")]
    pub file: Option<PathBuf>,

    /// Log file to follow in live mode.
    #[arg(short, long, value_name = "FILE")]
    pub watch: Option<PathBuf>,

    /// Seconds between live snapshots.
    #[arg(
        short,
        long,
        value_name = "SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Diagnostic log format on stderr.
    #[arg(long, value_enum, env = "GATE_MONITOR_LOG_FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Time between live snapshots.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable ranked tables.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Diagnostic log formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}
