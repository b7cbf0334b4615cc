//! Inbound request descriptor.

use std::time::Instant;

/// The attributes of one HTTP call that the gate inspects.
///
/// The body is never looked at. A missing User-Agent header is represented
/// by an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    ip: String,
    method: String,
    path: String,
    user_agent: String,
    timestamp: Instant,
}

impl Request {
    /// Create a request stamped with the current instant.
    #[must_use]
    pub fn new(
        ip: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            ip: ip.into(),
            method: method.into(),
            path: path.into(),
            user_agent: user_agent.into(),
            timestamp: Instant::now(),
        }
    }

    /// Override the arrival instant.
    #[must_use]
    pub const fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Client IP as reported by the HTTP layer (may be malformed).
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// HTTP method token.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Raw request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// User-Agent header, empty when absent.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Arrival instant.
    #[must_use]
    pub const fn timestamp(&self) -> Instant {
        self.timestamp
    }
}
