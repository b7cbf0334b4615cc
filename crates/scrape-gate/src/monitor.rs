//! Live monitoring of gate rejections.
//!
//! [`LiveMonitor`] ticks on a fixed interval and yields a snapshot of the
//! current top offenders on each tick. When it follows a log file, every tick
//! first consumes the lines appended since the previous one. Cancelling the
//! token ends the snapshot stream; the accumulated counters stay on the
//! monitor, so a final report can still be taken, and a new stream resumes
//! from the same counters.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::Stream;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analyzer::{DEFAULT_TOP_N, LogAnalyzer, LogReport, RankedEntry};
use crate::error::GateResult;

/// Default time between snapshots.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Entries per ranking in a snapshot.
pub const SNAPSHOT_TOP_N: usize = 5;

/// Top offenders at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    /// Local time of the tick.
    pub at: DateTime<Local>,
    /// Most rejected IPs so far.
    pub top_blocked_ips: Vec<RankedEntry>,
    /// Most targeted paths so far.
    pub top_attack_patterns: Vec<RankedEntry>,
}

/// Follows a growing log file by byte offset.
#[derive(Debug)]
struct LogTail {
    path: PathBuf,
    offset: u64,
}

impl LogTail {
    fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Feed complete lines appended since the last poll. A trailing partial
    /// line is left for the next poll. Returns the number of lines fed.
    async fn poll(&mut self, analyzer: &mut LogAnalyzer) -> GateResult<u64> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Watched log does not exist yet");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata().await?.len();
        if len < self.offset {
            debug!(path = %self.path.display(), "Watched log shrank, rereading from start");
            self.offset = 0;
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut count = 0;

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await?;
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            self.offset += read as u64;
            analyzer.ingest_line(&String::from_utf8_lossy(&buf));
            count += 1;
        }

        Ok(count)
    }
}

/// Periodic reporter over rejection counters.
#[derive(Debug)]
pub struct LiveMonitor {
    analyzer: LogAnalyzer,
    tail: Option<LogTail>,
    interval: Duration,
}

impl LiveMonitor {
    /// Create a monitor that ticks every `interval` with no log source;
    /// its counters stay empty unless lines are fed through
    /// [`LiveMonitor::analyzer_mut`].
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            analyzer: LogAnalyzer::new(),
            tail: None,
            interval,
        }
    }

    /// Follow a log file, consuming appended lines on every tick.
    #[must_use]
    pub fn watching(mut self, path: impl AsRef<Path>) -> Self {
        self.tail = Some(LogTail::new(path.as_ref().to_path_buf()));
        self
    }

    /// Tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Accumulated counters.
    #[must_use]
    pub const fn analyzer(&self) -> &LogAnalyzer {
        &self.analyzer
    }

    /// Mutable access to the counters, for feeding lines from another source.
    pub fn analyzer_mut(&mut self) -> &mut LogAnalyzer {
        &mut self.analyzer
    }

    /// Consume new log lines (if following a file) and take a snapshot.
    pub async fn tick(&mut self) -> MonitorSnapshot {
        if let Some(tail) = self.tail.as_mut() {
            match tail.poll(&mut self.analyzer).await {
                Ok(lines) if lines > 0 => debug!(lines = lines, "Consumed new log lines"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to read watched log"),
            }
        }

        MonitorSnapshot {
            at: Local::now(),
            top_blocked_ips: self.analyzer.blocked_ips().most_common(SNAPSHOT_TOP_N),
            top_attack_patterns: self.analyzer.paths().most_common(SNAPSHOT_TOP_N),
        }
    }

    /// Snapshots on every tick until `cancel` fires. The first snapshot is
    /// taken immediately.
    pub fn snapshots(
        &mut self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = MonitorSnapshot> + '_ {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        futures::stream::unfold(
            (self, ticker, cancel),
            |(monitor, mut ticker, cancel)| async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    _ = ticker.tick() => {
                        let snapshot = monitor.tick().await;
                        Some((snapshot, (monitor, ticker, cancel)))
                    }
                }
            },
        )
    }

    /// Cumulative ranked report of everything seen so far.
    #[must_use]
    pub fn final_report(&self) -> LogReport {
        self.analyzer.report(DEFAULT_TOP_N)
    }
}

impl Default for LiveMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    use crate::log_format::{GateRecord, TAG_BLOCKED, TAG_RATE_LIMITED};

    fn line(tag: &'static str, ip: &str, path: &str) -> String {
        format!("{}\n", GateRecord { tag, ip, method: "GET", path })
    }

    #[tokio::test]
    async fn test_tick_without_source_is_empty() {
        let mut monitor = LiveMonitor::default();
        let snapshot = monitor.tick().await;

        assert!(snapshot.top_blocked_ips.is_empty());
        assert!(snapshot.top_attack_patterns.is_empty());
        assert_eq!(monitor.interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_tick_follows_appended_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut monitor = LiveMonitor::new(Duration::from_secs(1)).watching(file.path());

        file.write_all(line(TAG_BLOCKED, "1.2.3.4", "/admin").as_bytes()).unwrap();
        file.flush().unwrap();
        let first = monitor.tick().await;
        assert_eq!(first.top_blocked_ips[0], RankedEntry { value: "1.2.3.4".into(), count: 1 });

        file.write_all(line(TAG_RATE_LIMITED, "1.2.3.4", "/").as_bytes()).unwrap();
        file.write_all(b"BLOCKED: 9.9.9.9 - GET /pa").unwrap();
        file.flush().unwrap();
        let second = monitor.tick().await;

        // Partial line is not consumed yet.
        assert_eq!(second.top_blocked_ips.len(), 1);
        assert_eq!(second.top_blocked_ips[0].count, 2);

        file.write_all(b"rtial\n").unwrap();
        file.flush().unwrap();
        let third = monitor.tick().await;
        assert_eq!(third.top_blocked_ips.len(), 2);
        assert_eq!(monitor.analyzer().paths().get("/partial"), 1);
    }

    #[tokio::test]
    async fn test_tail_consumes_large_backlog_line_by_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5_000 {
            let ip = format!("10.0.{}.{}", i / 256, i % 256);
            file.write_all(line(TAG_BLOCKED, &ip, "/x").as_bytes()).unwrap();
        }
        file.write_all(b"RATE LIMITED: 10.0.0.0 - GET").unwrap();
        file.flush().unwrap();

        let mut tail = LogTail::new(file.path().to_path_buf());
        let mut analyzer = LogAnalyzer::new();
        assert_eq!(tail.poll(&mut analyzer).await.unwrap(), 5_000);
        assert_eq!(analyzer.report(1).unique_blocked_ips, 5_000);
        assert_eq!(analyzer.paths().get("/x"), 5_000);

        // Offset stops before the partial line.
        let complete = std::fs::metadata(file.path()).unwrap().len()
            - b"RATE LIMITED: 10.0.0.0 - GET".len() as u64;
        assert_eq!(tail.offset, complete);
        assert_eq!(tail.poll(&mut analyzer).await.unwrap(), 0);

        file.write_all(b" /\n").unwrap();
        file.flush().unwrap();
        assert_eq!(tail.poll(&mut analyzer).await.unwrap(), 1);
        assert_eq!(analyzer.blocked_ips().get("10.0.0.0"), 2);
    }

    #[tokio::test]
    async fn test_missing_watched_file_is_not_fatal() {
        let mut monitor =
            LiveMonitor::new(Duration::from_secs(1)).watching("/nonexistent/gate.log");
        let snapshot = monitor.tick().await;
        assert!(snapshot.top_blocked_ips.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_limits_to_top_five() {
        let mut monitor = LiveMonitor::default();
        for i in 0..8 {
            monitor
                .analyzer_mut()
                .ingest_line(&line(TAG_BLOCKED, &format!("10.0.0.{i}"), &format!("/p{i}")));
        }

        let snapshot = monitor.tick().await;
        assert_eq!(snapshot.top_blocked_ips.len(), SNAPSHOT_TOP_N);
        assert_eq!(snapshot.top_attack_patterns.len(), SNAPSHOT_TOP_N);
        assert_eq!(monitor.final_report().top_attackers.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ends_on_cancel_and_keeps_counts() {
        let mut monitor = LiveMonitor::new(Duration::from_secs(30));
        monitor
            .analyzer_mut()
            .ingest_line(&line(TAG_BLOCKED, "5.5.5.5", "/.env"));

        let cancel = CancellationToken::new();
        {
            let stream = monitor.snapshots(cancel.clone());
            futures::pin_mut!(stream);

            let first = stream.next().await.unwrap();
            assert_eq!(first.top_blocked_ips[0].value, "5.5.5.5");
            let second = stream.next().await.unwrap();
            assert_eq!(second.top_attack_patterns[0].value, "/.env");

            cancel.cancel();
            assert!(stream.next().await.is_none());
        }

        let report = monitor.final_report();
        assert_eq!(report.unique_blocked_ips, 1);
        assert_eq!(report.total_attempts, 1);

        // Restarting with a fresh token resumes from the same counters.
        let stream = monitor.snapshots(CancellationToken::new());
        futures::pin_mut!(stream);
        let resumed = stream.next().await.unwrap();
        assert_eq!(resumed.top_blocked_ips[0].count, 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_stream_is_empty() {
        let mut monitor = LiveMonitor::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let snapshots: Vec<_> = monitor.snapshots(cancel).collect().await;
        assert!(snapshots.is_empty());
    }
}
