//! # scrape-gate
//!
//! Request classification and rate limiting in front of expensive scraping
//! handlers (automated browser sessions).
//!
//! ## Request Gate
//!
//! - [`Classifier`] - Stateless checks against known-bad IPs and ranges,
//!   blocked paths, scanner User-Agents and path traversal
//! - [`RateLimiter`] - Per-IP sliding window that escalates offenders to a
//!   permanent [`Blocklist`]
//! - [`Gate`] - Runs both in a fixed order and returns a [`GateOutcome`]
//!   (allow, 404, 429 or 405), logging each decision with a stable tag
//!
//! ## Log Analysis
//!
//! - [`analyze_file`] / [`LogAnalyzer`] - Rebuild attacker statistics from
//!   the gate's log records
//! - [`LiveMonitor`] - Periodic top-N snapshots, cancellable through a
//!   `CancellationToken`
//!
//! All state is process-local and in memory: a restart clears every block,
//! and separate processes enforce limits independently.
//!
//! # Example
//!
//! ```rust
//! use scrape_gate::{Gate, GateDecision, Request};
//!
//! let gate = Gate::with_defaults();
//!
//! let request = Request::new("203.0.113.7", "GET", "/trends", "Mozilla/5.0");
//! let outcome = gate.evaluate(&request);
//! assert_eq!(outcome.decision, GateDecision::Allow);
//!
//! let scanner = Request::new("203.0.113.7", "GET", "/wp-admin", "Mozilla/5.0");
//! let outcome = gate.evaluate(&scanner);
//! assert_eq!(outcome.http_status, 404);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analyzer;
pub mod blocklist;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gate;
pub mod log_format;
pub mod monitor;
pub mod rate_limit;
pub mod request;

// Re-export main types
pub use analyzer::{
    DEFAULT_TOP_N, LogAnalyzer, LogEvent, LogRecord, LogReport, RankedCounter, RankedEntry,
    analyze_file, analyze_reader,
};
pub use blocklist::{BlockEntry, Blocklist};
pub use classifier::{ClassificationReason, ClassificationVerdict, Classifier};
pub use config::{GateConfig, GateConfigBuilder, RateLimitConfig, RuleTables};
pub use error::{GateError, GateResult};
pub use gate::{Gate, GateDecision, GateOutcome, GateStats, Rejection};
pub use monitor::{DEFAULT_POLL_INTERVAL, LiveMonitor, MonitorSnapshot};
pub use rate_limit::RateLimiter;
pub use request::Request;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::analyzer::{LogAnalyzer, LogReport, analyze_file};
    pub use crate::classifier::{ClassificationReason, ClassificationVerdict, Classifier};
    pub use crate::config::GateConfig;
    pub use crate::error::{GateError, GateResult};
    pub use crate::gate::{Gate, GateDecision, GateOutcome};
    pub use crate::monitor::LiveMonitor;
    pub use crate::rate_limit::RateLimiter;
    pub use crate::request::Request;
}
