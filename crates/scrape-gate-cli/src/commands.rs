//! Command implementations.

use std::io::Write;
use std::path::Path;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scrape_gate::{DEFAULT_TOP_N, GateError, LiveMonitor, analyze_file};

use crate::error::CliError;
use crate::output::{FileReport, FinalReport, OutputFormat};

/// Scan a log file once and print its ranked report.
///
/// A missing file is reported on the output and is not an error.
pub fn analyze<W: Write>(
    writer: &mut W,
    format: &OutputFormat,
    path: &Path,
) -> Result<(), CliError> {
    match analyze_file(path, DEFAULT_TOP_N) {
        Ok(report) => {
            info!(
                path = %path.display(),
                unique_ips = report.unique_blocked_ips,
                attempts = report.total_attempts,
                "Log analyzed"
            );
            format.write(writer, &FileReport::new(path, report))
        }
        Err(GateError::LogNotFound { path }) => {
            warn!(path = %path.display(), "Log file not found");
            writeln!(writer, "file not found: {}", path.display())?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print a snapshot on every tick until `cancel` fires, then the final report.
pub async fn monitor<W: Write>(
    writer: &mut W,
    format: &OutputFormat,
    mut monitor: LiveMonitor,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    if !format.is_json() {
        writeln!(
            writer,
            "Monitoring attack attempts every {}s",
            monitor.interval().as_secs()
        )?;
        writeln!(writer, "Press Ctrl+C to stop")?;
        writeln!(writer)?;
        writer.flush()?;
    }

    {
        let snapshots = monitor.snapshots(cancel);
        futures::pin_mut!(snapshots);
        while let Some(snapshot) = snapshots.next().await {
            format.write(writer, &snapshot)?;
            writer.flush()?;
        }
    }

    info!(lines = monitor.analyzer().lines_read(), "Monitoring stopped");
    format.write(writer, &FinalReport(monitor.final_report()))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cli::Format;

    fn run_analyze(format: Format, path: &Path) -> String {
        let mut buf = Vec::new();
        analyze(&mut buf, &OutputFormat::new(format), path).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn analyze_counts_blocked_and_rate_limited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.log");
        std::fs::write(
            &path,
            "BLOCKED: 1.2.3.4 - GET /wp-admin\n\
             BLOCKED: 1.2.3.4 - GET /.env\n\
             RATE LIMITED: 1.2.3.4 - GET /trends\n\
             ALLOWED: 5.6.7.8 - GET /trends\n",
        )
        .unwrap();

        let output = run_analyze(Format::Table, &path);
        assert!(output.contains("Unique blocked IPs:  1"));
        assert!(output.contains("Total attempts:      3"));
        assert!(output.contains("/wp-admin"));
        assert!(!output.contains("5.6.7.8"));
    }

    #[test]
    fn analyze_missing_file_is_handled() {
        let output = run_analyze(Format::Table, Path::new("/nonexistent/gate.log"));
        assert_eq!(output, "file not found: /nonexistent/gate.log\n");
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_prints_final_report_on_cancel() {
        let mut live = LiveMonitor::new(Duration::from_secs(30));
        live.analyzer_mut().ingest_line("BLOCKED: 9.9.9.9 - GET /.git/config");

        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            stopper.cancel();
        });

        let mut buf = Vec::new();
        monitor(&mut buf, &OutputFormat::default(), live, cancel)
            .await
            .unwrap();
        let output = String::from_utf8(buf).unwrap();

        assert!(output.starts_with("Monitoring attack attempts every 30s"));
        // Ticks at 0s and 30s, cancelled at 45s.
        assert_eq!(output.matches("Monitoring...").count(), 2);
        assert!(output.contains("  9.9.9.9: 1 attempts"));
        assert!(output.contains("Final report"));
        assert!(output.contains("Unique blocked IPs:      1"));
    }
}
