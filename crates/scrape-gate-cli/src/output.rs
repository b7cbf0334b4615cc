//! Output formatting for reports and snapshots.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use scrape_gate::{LogReport, MonitorSnapshot, RankedEntry};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as human-readable text.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// One-shot analysis of a log file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// Analyzed file.
    pub file: PathBuf,
    /// Statistics rebuilt from it.
    #[serde(flatten)]
    pub report: LogReport,
}

impl FileReport {
    /// Pair a report with the file it came from.
    #[must_use]
    pub fn new(file: impl AsRef<Path>, report: LogReport) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            report,
        }
    }
}

impl TableDisplay for FileReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let report = &self.report;

        writeln!(writer, "Analyzing log file: {}", self.file.display())?;
        writeln!(writer)?;
        writeln!(writer, "Statistics")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Unique blocked IPs:  {}", report.unique_blocked_ips)?;
        writeln!(writer, "Total attempts:      {}", report.total_attempts)?;

        if !report.top_attackers.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Top {} attackers", report.top_attackers.len())?;
            write_ranking(writer, &report.top_attackers, 15)?;
        }

        if !report.top_paths.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Most attacked paths")?;
            write_ranking(writer, &report.top_paths, 30)?;
        }
        Ok(())
    }
}

impl TableDisplay for MonitorSnapshot {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "[{}] Monitoring...", self.at.format("%H:%M:%S"))?;

        if !self.top_blocked_ips.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Top blocked IPs:")?;
            for entry in &self.top_blocked_ips {
                writeln!(writer, "  {}: {} attempts", entry.value, entry.count)?;
            }
        }

        if !self.top_attack_patterns.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Most common attack patterns:")?;
            for entry in &self.top_attack_patterns {
                writeln!(writer, "  {}: {} times", entry.value, entry.count)?;
            }
        }
        writeln!(writer)?;
        Ok(())
    }
}

/// Cumulative report printed when live monitoring stops.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct FinalReport(pub LogReport);

impl TableDisplay for FinalReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let report = &self.0;

        writeln!(writer)?;
        writeln!(writer, "Final report")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Unique blocked IPs:      {}", report.unique_blocked_ips)?;
        writeln!(writer, "Total blocked attempts:  {}", report.total_attempts)?;

        if !report.top_attackers.is_empty() {
            writeln!(writer)?;
            writeln!(writer, "Top {} attackers", report.top_attackers.len())?;
            write_ranking(writer, &report.top_attackers, 15)?;
        }
        Ok(())
    }
}

/// Numbered ranking with the value padded to `width`.
fn write_ranking<W: Write>(
    writer: &mut W,
    entries: &[RankedEntry],
    width: usize,
) -> Result<(), CliError> {
    for (rank, entry) in entries.iter().enumerate() {
        writeln!(
            writer,
            "  {:>2}. {:<width$} - {:>3} attempts",
            rank + 1,
            truncate(&entry.value, width),
            entry.count,
        )?;
    }
    Ok(())
}

/// Shorten to at most `max_len` characters, marking the cut with "...".
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len > 3 {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
