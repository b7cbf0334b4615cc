//! Stateless request classification.
//!
//! The classifier decides, with no memory of earlier requests, whether the
//! static attributes of a request make it presumptively hostile. Every check
//! fails closed: input that cannot be understood is treated as an attack.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::Serialize;

use crate::config::RuleTables;
use crate::error::{GateError, GateResult};
use crate::request::Request;

/// Sequences that indicate a directory traversal attempt in a raw path.
const TRAVERSAL_SEQUENCES: &[&str] = &["../", "..\\"];

/// Why a request was classified the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationReason {
    /// IP is listed as a known attacker.
    KnownMaliciousIp,
    /// IP falls inside a suspicious CIDR range.
    SuspiciousRange,
    /// IP literal could not be parsed.
    InvalidIp,
    /// Path equals or contains a blocked token.
    BlockedPath,
    /// User-Agent matches a scanning tool.
    BlockedUserAgent,
    /// User-Agent header is empty or missing.
    EmptyUserAgent,
    /// Path contains a traversal sequence.
    PathTraversal,
    /// Nothing matched.
    None,
}

impl ClassificationReason {
    /// Stable identifier used in log records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KnownMaliciousIp => "known_malicious_ip",
            Self::SuspiciousRange => "suspicious_range",
            Self::InvalidIp => "invalid_ip",
            Self::BlockedPath => "blocked_path",
            Self::BlockedUserAgent => "blocked_user_agent",
            Self::EmptyUserAgent => "empty_user_agent",
            Self::PathTraversal => "path_traversal",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ClassificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classifier's output for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClassificationVerdict {
    /// Whether the request is presumptively hostile.
    pub suspicious: bool,
    /// First rule that matched, or [`ClassificationReason::None`].
    pub reason: ClassificationReason,
}

impl ClassificationVerdict {
    /// Verdict for a request that matched no rule.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            suspicious: false,
            reason: ClassificationReason::None,
        }
    }

    /// Verdict for a request that matched `reason`.
    #[must_use]
    pub const fn suspicious(reason: ClassificationReason) -> Self {
        Self {
            suspicious: true,
            reason,
        }
    }
}

/// Rule tables compiled for fast, allocation-light matching.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Canonical form, so IPv4-mapped IPv6 literals hit the IPv4 entries.
    malicious_ips: HashSet<IpAddr>,
    ranges: Vec<IpNet>,
    /// Lower-cased path tokens, in configured order.
    blocked_paths: Vec<String>,
    /// Lower-cased User-Agent tokens.
    blocked_user_agents: Vec<String>,
}

impl Classifier {
    /// Compile rule tables into a classifier.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidRule` if a table entry cannot be compiled.
    pub fn from_rules(rules: &RuleTables) -> GateResult<Self> {
        rules.validate()?;

        let ranges = rules
            .suspicious_ranges
            .iter()
            .map(|range| {
                range.trim().parse::<IpNet>().map_err(|e| GateError::InvalidRule {
                    rule: range.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<GateResult<Vec<_>>>()?;

        let malicious_ips = rules
            .malicious_ips
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<IpAddr>()
                    .map(|addr| addr.to_canonical())
                    .map_err(|e| GateError::InvalidRule {
                        rule: ip.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<GateResult<HashSet<_>>>()?;

        Ok(Self {
            malicious_ips,
            ranges,
            blocked_paths: rules.blocked_paths.iter().map(|p| p.to_lowercase()).collect(),
            blocked_user_agents: rules
                .blocked_user_agents
                .iter()
                .map(|ua| ua.to_lowercase())
                .collect(),
        })
    }

    /// Which IP rule, if any, the literal trips.
    fn ip_reason(&self, ip: &str) -> Option<ClassificationReason> {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return Some(ClassificationReason::InvalidIp);
        };
        let addr = addr.to_canonical();

        if self.malicious_ips.contains(&addr) {
            return Some(ClassificationReason::KnownMaliciousIp);
        }

        self.ranges
            .iter()
            .any(|net| net.contains(&addr))
            .then_some(ClassificationReason::SuspiciousRange)
    }

    /// Check whether an IP literal is suspicious.
    ///
    /// True for known attackers, for addresses inside a suspicious range, and
    /// for anything that does not parse as an IPv4 or IPv6 address.
    #[must_use]
    pub fn is_ip_suspicious(&self, ip: &str) -> bool {
        self.ip_reason(ip).is_some()
    }

    /// Check whether a path is blocked.
    ///
    /// Matching is case-insensitive and by substring, so any path that embeds
    /// a blocked token anywhere is blocked (`/reports/test-results` contains
    /// `/test`). Deployments rely on this over-block.
    #[must_use]
    pub fn is_path_blocked(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.blocked_paths
            .iter()
            .any(|blocked| path == *blocked || path.contains(blocked.as_str()))
    }

    /// Which User-Agent rule, if any, the header trips.
    fn user_agent_reason(&self, user_agent: &str) -> Option<ClassificationReason> {
        if user_agent.is_empty() {
            return Some(ClassificationReason::EmptyUserAgent);
        }

        let ua = user_agent.to_lowercase();
        self.blocked_user_agents
            .iter()
            .any(|token| ua.contains(token.as_str()))
            .then_some(ClassificationReason::BlockedUserAgent)
    }

    /// Check whether a User-Agent is blocked. Empty always is.
    #[must_use]
    pub fn is_user_agent_blocked(&self, user_agent: &str) -> bool {
        self.user_agent_reason(user_agent).is_some()
    }

    /// Check whether a raw path contains a traversal sequence.
    #[must_use]
    pub fn has_path_traversal(path: &str) -> bool {
        TRAVERSAL_SEQUENCES.iter().any(|seq| path.contains(seq))
    }

    /// Classify a request. The first matching rule wins, in the order
    /// IP, path, User-Agent, traversal.
    #[must_use]
    pub fn classify(&self, request: &Request) -> ClassificationVerdict {
        if let Some(reason) = self.ip_reason(request.ip()) {
            return ClassificationVerdict::suspicious(reason);
        }

        if self.is_path_blocked(request.path()) {
            return ClassificationVerdict::suspicious(ClassificationReason::BlockedPath);
        }

        if let Some(reason) = self.user_agent_reason(request.user_agent()) {
            return ClassificationVerdict::suspicious(reason);
        }

        if Self::has_path_traversal(request.path()) {
            return ClassificationVerdict::suspicious(ClassificationReason::PathTraversal);
        }

        ClassificationVerdict::clean()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_rules(&RuleTables::default()).unwrap_or_else(|_| unreachable!())
    }
}
