//! Offline analysis of gate log output.
//!
//! Reads the text records written by the gate and rebuilds attacker
//! statistics: which IPs were rejected most often and which paths were
//! targeted. `BLOCKED` and `RATE LIMITED` records both count towards an IP;
//! only `BLOCKED` records carry a request line that counts towards paths.
//! Every other line is ignored.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::{GateError, GateResult};
use crate::log_format::{TAG_BLOCKED, TAG_RATE_LIMITED};

/// Number of entries in each ranking of a report.
pub const DEFAULT_TOP_N: usize = 10;

/// A `BLOCKED` or `RATE LIMITED` record at the start of a log message:
/// the start of the line, after the `target:` prefix of text logs (possibly
/// ANSI-styled), or at the start of a JSON `message` value. Record fields
/// never contain spaces or quotes, so a tag inside a request field cannot
/// take one of these positions.
static RECORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?:^|:(?:\x1b\[[0-9;]*m)* |"message":")({}|{}) (\S+) - (\S+)(?: ([^\s"]+))?"#,
        regex::escape(TAG_BLOCKED),
        regex::escape(TAG_RATE_LIMITED),
    ))
    .unwrap_or_else(|_| unreachable!())
});

static DOTTED_QUAD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+$").unwrap_or_else(|_| unreachable!()));

/// Kind of rejection a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// Rejected by the classifier.
    Blocked,
    /// Rejected by the rate limiter.
    RateLimited,
}

/// What one log line contributes to the statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Client IP, when the record carries a dotted-quad address.
    pub ip: Option<String>,
    /// Kind of rejection.
    pub event: LogEvent,
    /// Probed path (only for `BLOCKED` records with a request line).
    pub path: Option<String>,
}

impl LogRecord {
    /// Parse a log line. Returns `None` for lines that are not rejection
    /// records.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let caps = RECORD_REGEX.captures(line)?;
        let event = if &caps[1] == TAG_BLOCKED {
            LogEvent::Blocked
        } else {
            LogEvent::RateLimited
        };

        let ip = DOTTED_QUAD_REGEX.is_match(&caps[2]).then(|| caps[2].to_string());
        let path = match (event, &caps[3]) {
            (LogEvent::Blocked, "GET" | "POST") => caps.get(4).map(|m| m.as_str().to_string()),
            _ => None,
        };

        Some(Self { ip, event, path })
    }
}

/// One entry of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    /// The counted value (an IP or a path).
    pub value: String,
    /// How many times it was seen.
    pub count: u64,
}

/// Occurrence counter that remembers first-seen order.
///
/// Rankings sort by descending count; ties keep the order in which values
/// were first counted.
#[derive(Debug, Clone, Default)]
pub struct RankedCounter {
    index: HashMap<String, usize>,
    entries: Vec<(String, u64)>,
}

impl RankedCounter {
    /// Create an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `value`.
    pub fn increment(&mut self, value: &str) {
        match self.index.get(value) {
            Some(&slot) => self.entries[slot].1 += 1,
            None => {
                self.index.insert(value.to_string(), self.entries.len());
                self.entries.push((value.to_string(), 1));
            }
        }
    }

    /// Occurrences of `value`.
    #[must_use]
    pub fn get(&self, value: &str) -> u64 {
        self.index.get(value).map_or(0, |&slot| self.entries[slot].1)
    }

    /// Number of distinct values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all occurrences.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    /// The `n` most common values.
    #[must_use]
    pub fn most_common(&self, n: usize) -> Vec<RankedEntry> {
        let mut ranked: Vec<&(String, u64)> = self.entries.iter().collect();
        // Stable sort keeps first-seen order among equal counts.
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
            .into_iter()
            .take(n)
            .map(|(value, count)| RankedEntry {
                value: value.clone(),
                count: *count,
            })
            .collect()
    }
}

/// Aggregate statistics rebuilt from a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogReport {
    /// Distinct IPs with at least one rejection.
    pub unique_blocked_ips: usize,
    /// Rejections attributed to an IP.
    pub total_attempts: u64,
    /// Most rejected IPs.
    pub top_attackers: Vec<RankedEntry>,
    /// Most targeted paths.
    pub top_paths: Vec<RankedEntry>,
}

/// Accumulates rejection records into IP and path counters.
#[derive(Debug, Clone, Default)]
pub struct LogAnalyzer {
    blocked_ips: RankedCounter,
    paths: RankedCounter,
    lines_read: u64,
}

impl LogAnalyzer {
    /// Create an analyzer with empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one log line. Returns the record it contributed, if any.
    pub fn ingest_line(&mut self, line: &str) -> Option<LogRecord> {
        self.lines_read += 1;

        let record = LogRecord::parse(line)?;
        if let Some(ip) = &record.ip {
            self.blocked_ips.increment(ip);
        }
        if let Some(path) = &record.path {
            self.paths.increment(path);
        }
        Some(record)
    }

    /// Feed every line of a reader. Invalid UTF-8 is replaced rather than
    /// aborting the scan. Returns the number of lines read.
    pub fn ingest_reader<R: BufRead>(&mut self, mut reader: R) -> io::Result<u64> {
        let mut buf = Vec::new();
        let mut count = 0;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            self.ingest_line(&String::from_utf8_lossy(&buf));
            count += 1;
        }

        Ok(count)
    }

    /// Counter of rejected IPs.
    #[must_use]
    pub const fn blocked_ips(&self) -> &RankedCounter {
        &self.blocked_ips
    }

    /// Counter of targeted paths.
    #[must_use]
    pub const fn paths(&self) -> &RankedCounter {
        &self.paths
    }

    /// Total lines fed so far.
    #[must_use]
    pub const fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Build a report with the `top_n` entries of each ranking.
    #[must_use]
    pub fn report(&self, top_n: usize) -> LogReport {
        LogReport {
            unique_blocked_ips: self.blocked_ips.len(),
            total_attempts: self.blocked_ips.total(),
            top_attackers: self.blocked_ips.most_common(top_n),
            top_paths: self.paths.most_common(top_n),
        }
    }
}

/// Analyze log text from any reader.
///
/// # Errors
///
/// Returns `GateError::Io` if reading fails.
pub fn analyze_reader<R: BufRead>(reader: R, top_n: usize) -> GateResult<LogReport> {
    let mut analyzer = LogAnalyzer::new();
    analyzer.ingest_reader(reader)?;
    Ok(analyzer.report(top_n))
}

/// Analyze a log file.
///
/// # Errors
///
/// Returns `GateError::LogNotFound` if the file does not exist and
/// `GateError::Io` for any other read failure.
pub fn analyze_file(path: impl AsRef<Path>, top_n: usize) -> GateResult<LogReport> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => GateError::LogNotFound {
            path: path.to_path_buf(),
        },
        _ => GateError::Io(e),
    })?;

    let mut analyzer = LogAnalyzer::new();
    let lines = analyzer.ingest_reader(BufReader::new(file))?;
    debug!(path = %path.display(), lines = lines, "Analyzed log file");

    Ok(analyzer.report(top_n))
}
