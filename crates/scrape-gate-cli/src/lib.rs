//! # scrape-gate-cli
//!
//! `gate-monitor`, the command-line front end for scrape-gate rejection logs.
//!
//! - `gate-monitor <FILE>` scans a log once and prints the unique offender
//!   count, total attempts, the top 10 attacker IPs and the top 10 paths
//! - `gate-monitor` (optionally with `--watch <FILE>`) prints a top-5
//!   snapshot every interval until Ctrl-C, then a final ranked report
//!
//! Both modes accept `--format json`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Format, LogFormat};
pub use error::CliError;
pub use output::OutputFormat;
