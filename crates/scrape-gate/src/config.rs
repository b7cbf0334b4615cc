//! Gate configuration.
//!
//! Everything the gate consumes at startup lives here: the sliding window
//! limits, the static rule tables used by the classifier, and the set of
//! HTTP methods that are forwarded to the handlers. Defaults reproduce the
//! production deployment, so an empty TOML file yields a working gate.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// IPs observed attacking the production endpoints.
const DEFAULT_MALICIOUS_IPS: &[&str] = &[
    "35.203.210.168",
    "87.251.67.27",
    "212.73.148.10",
    "147.185.133.248",
    "95.214.55.246",
    "204.76.203.215",
    "147.185.133.7",
    "45.79.172.21",
    "35.203.210.35",
    "185.247.137.236",
    "147.185.133.29",
    "212.73.148.6",
    "172.82.90.170",
    "162.216.149.31",
    "162.216.150.232",
    "35.203.211.135",
    "85.217.149.15",
];

/// Hosting ranges that carry most scanner traffic.
const DEFAULT_SUSPICIOUS_RANGES: &[&str] = &[
    "35.203.0.0/16",
    "147.185.0.0/16",
    "95.214.0.0/16",
    "162.216.0.0/16",
    "185.247.0.0/16",
];

/// Paths that must always answer 404.
const DEFAULT_BLOCKED_PATHS: &[&str] = &[
    "/admin",
    "/wp-admin",
    "/wp-login.php",
    "/wp-content",
    "/phpmyadmin",
    "/pma",
    "/mysql",
    "/sql",
    "/database",
    "/config",
    "/env",
    "/.env",
    "/.git",
    "/backup",
    "/test",
    "/debug",
    "/api/v1",
    "/v1",
    "/v2",
    "/login",
    "/signin",
    "/auth",
    "/user",
    "/users",
    "/robots.txt",
    "/sitemap.xml",
    "/favicon.ico",
    "/.well-known",
    "/xmlrpc.php",
    "/wp-includes",
    "/cgi-bin",
    "/bin",
    "/etc/passwd",
    "/proc/version",
];

/// Scanner tool tokens matched against the User-Agent header.
const DEFAULT_BLOCKED_USER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "zap",
    "burp",
    "gobuster",
    "dirb",
    "dirbuster",
    "wfuzz",
    "ffuf",
    "nuclei",
    "httpx",
    "subfinder",
    "amass",
    "shodan",
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Configuration for per-IP sliding window rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum requests admitted per window per client IP.
    pub max_requests: u32,
    /// Window duration in seconds.
    pub window_secs: u64,
    /// Whether to enable rate limiting.
    pub enabled: bool,
}

impl RateLimitConfig {
    /// Window duration as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
            enabled: true,
        }
    }
}

/// Static rule tables consumed by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTables {
    /// Exact IP literals that are always hostile.
    pub malicious_ips: Vec<String>,
    /// CIDR ranges that are always hostile.
    pub suspicious_ranges: Vec<String>,
    /// Path tokens; a path equal to or containing any of them is blocked.
    pub blocked_paths: Vec<String>,
    /// User-Agent substrings identifying scanning tools.
    pub blocked_user_agents: Vec<String>,
}

impl RuleTables {
    /// Rule tables with every list empty.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            malicious_ips: Vec::new(),
            suspicious_ranges: Vec::new(),
            blocked_paths: Vec::new(),
            blocked_user_agents: Vec::new(),
        }
    }

    /// Validate that every entry can be compiled.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidRule` for the first malformed entry.
    pub fn validate(&self) -> GateResult<()> {
        for ip in &self.malicious_ips {
            ip.trim()
                .parse::<IpAddr>()
                .map_err(|e| GateError::InvalidRule {
                    rule: ip.clone(),
                    reason: e.to_string(),
                })?;
        }

        for range in &self.suspicious_ranges {
            range
                .trim()
                .parse::<IpNet>()
                .map_err(|e| GateError::InvalidRule {
                    rule: range.clone(),
                    reason: e.to_string(),
                })?;
        }

        let empty_token = self
            .blocked_paths
            .iter()
            .chain(&self.blocked_user_agents)
            .find(|token| token.trim().is_empty());
        if let Some(token) = empty_token {
            return Err(GateError::InvalidRule {
                rule: token.clone(),
                reason: "empty token would match every request".into(),
            });
        }

        Ok(())
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        Self {
            malicious_ips: owned(DEFAULT_MALICIOUS_IPS),
            suspicious_ranges: owned(DEFAULT_SUSPICIOUS_RANGES),
            blocked_paths: owned(DEFAULT_BLOCKED_PATHS),
            blocked_user_agents: owned(DEFAULT_BLOCKED_USER_AGENTS),
        }
    }
}

/// Main gate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Rate limiting settings.
    pub rate_limit: RateLimitConfig,
    /// Classifier rule tables.
    pub rules: RuleTables,
    /// HTTP methods forwarded to the handlers.
    pub allowed_methods: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            rules: RuleTables::default(),
            allowed_methods: vec!["GET".into(), "OPTIONS".into()],
        }
    }
}

impl GateConfig {
    /// Create a new builder for gate configuration.
    #[must_use]
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::default()
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> GateResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GateError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> GateResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| GateError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range or a rule cannot compile.
    pub fn validate(&self) -> GateResult<()> {
        if self.rate_limit.max_requests == 0 {
            return Err(GateError::Config(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(GateError::Config(
                "rate_limit.window_secs must be at least 1".into(),
            ));
        }
        if self.allowed_methods.is_empty() {
            return Err(GateError::Config("allowed_methods cannot be empty".into()));
        }

        self.rules.validate()
    }
}

/// Builder for `GateConfig`.
#[derive(Debug, Clone, Default)]
pub struct GateConfigBuilder {
    config: GateConfig,
}

impl GateConfigBuilder {
    /// Set rate limit configuration.
    #[must_use]
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = config;
        self
    }

    /// Set the request limit and window in one go.
    #[must_use]
    pub fn limit(mut self, max_requests: u32, window_secs: u64) -> Self {
        self.config.rate_limit.max_requests = max_requests;
        self.config.rate_limit.window_secs = window_secs;
        self
    }

    /// Replace the rule tables.
    #[must_use]
    pub fn rules(mut self, rules: RuleTables) -> Self {
        self.config.rules = rules;
        self
    }

    /// Replace the allowed HTTP methods.
    #[must_use]
    pub fn allowed_methods(mut self, methods: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.allowed_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> GateConfig {
        self.config
    }
}
