//! The request gate.
//!
//! [`Gate::evaluate`] is the single entry point the HTTP layer calls for each
//! request. Checks run in a fixed order: classification (stateless), rate
//! limiting (stateful), then method filtering. A hostile request therefore
//! never touches rate limit bookkeeping, and nothing rejected ever reaches a
//! handler.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::{ClassificationReason, ClassificationVerdict, Classifier};
use crate::config::GateConfig;
use crate::error::GateResult;
use crate::log_format::{
    GateRecord, TAG_ALLOWED, TAG_BLOCKED, TAG_METHOD_NOT_ALLOWED, TAG_RATE_LIMITED,
};
use crate::rate_limit::RateLimiter;
use crate::request::Request;

/// What the gate decided for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// Forward to the handler.
    Allow,
    /// Classified as hostile; answer as if nothing lives here.
    NotFound,
    /// Rate limit exceeded or IP blocked.
    RateLimited,
    /// Method not served by the handlers.
    MethodNotAllowed,
}

impl GateDecision {
    /// HTTP status for the decision. `Allow` reports 200, although the
    /// handler's own response is what the client sees.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Allow => 200,
            Self::NotFound => 404,
            Self::RateLimited => 429,
            Self::MethodNotAllowed => 405,
        }
    }

    /// Log tag written for the decision.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Allow => TAG_ALLOWED,
            Self::NotFound => TAG_BLOCKED,
            Self::RateLimited => TAG_RATE_LIMITED,
            Self::MethodNotAllowed => TAG_METHOD_NOT_ALLOWED,
        }
    }
}

/// A synthesized response for a rejected request.
///
/// The body is generic and never names the rule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: &'static str,
}

/// Result of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
    /// The decision.
    pub decision: GateDecision,
    /// Classifier verdict (reason is `none` unless the request was blocked).
    pub verdict: ClassificationVerdict,
    /// HTTP status matching the decision.
    pub http_status: u16,
}

impl GateOutcome {
    fn new(decision: GateDecision, verdict: ClassificationVerdict) -> Self {
        Self {
            decision,
            verdict,
            http_status: decision.http_status(),
        }
    }

    /// Check if the request may reach the handler.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self.decision, GateDecision::Allow)
    }

    /// The response to send instead of calling the handler, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<Rejection> {
        let body = match self.decision {
            GateDecision::Allow => return None,
            GateDecision::NotFound => "Not Found",
            GateDecision::RateLimited => "Too Many Requests",
            GateDecision::MethodNotAllowed => "Method Not Allowed",
        };
        Some(Rejection {
            status: self.http_status,
            body,
        })
    }
}

/// Snapshot of per-decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateStats {
    /// Requests forwarded.
    pub allowed: u64,
    /// Requests answered 404.
    pub not_found: u64,
    /// Requests answered 429.
    pub rate_limited: u64,
    /// Requests answered 405.
    pub method_not_allowed: u64,
}

impl GateStats {
    /// Total requests evaluated.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.allowed + self.not_found + self.rate_limited + self.method_not_allowed
    }
}

#[derive(Debug, Default)]
struct Counters {
    allowed: AtomicU64,
    not_found: AtomicU64,
    rate_limited: AtomicU64,
    method_not_allowed: AtomicU64,
}

impl Counters {
    fn record(&self, decision: GateDecision) {
        let counter = match decision {
            GateDecision::Allow => &self.allowed,
            GateDecision::NotFound => &self.not_found,
            GateDecision::RateLimited => &self.rate_limited,
            GateDecision::MethodNotAllowed => &self.method_not_allowed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> GateStats {
        GateStats {
            allowed: self.allowed.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            method_not_allowed: self.method_not_allowed.load(Ordering::Relaxed),
        }
    }
}

/// Classification plus rate limiting in front of the scraping handlers.
#[derive(Debug)]
pub struct Gate {
    classifier: Classifier,
    limiter: Arc<RateLimiter>,
    allowed_methods: Vec<String>,
    counters: Counters,
}

impl Gate {
    /// Build a gate from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: &GateConfig) -> GateResult<Self> {
        config.validate()?;

        Ok(Self::from_parts(
            Classifier::from_rules(&config.rules)?,
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            config.allowed_methods.clone(),
        ))
    }

    /// Build a gate around existing state.
    ///
    /// The limiter may be shared with other components that inspect it.
    #[must_use]
    pub fn from_parts(
        classifier: Classifier,
        limiter: Arc<RateLimiter>,
        allowed_methods: Vec<String>,
    ) -> Self {
        Self {
            classifier,
            limiter,
            allowed_methods,
            counters: Counters::default(),
        }
    }

    /// Create with the production rules and limits.
    #[must_use]
    pub fn with_defaults() -> Self {
        let config = GateConfig::default();
        Self::from_parts(
            Classifier::default(),
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            config.allowed_methods,
        )
    }

    /// Evaluate a request and log the outcome.
    #[must_use]
    pub fn evaluate(&self, request: &Request) -> GateOutcome {
        let outcome = self.decide(request);
        self.counters.record(outcome.decision);
        Self::log(request, &outcome);
        outcome
    }

    fn decide(&self, request: &Request) -> GateOutcome {
        let verdict = self.classifier.classify(request);
        if verdict.suspicious {
            return GateOutcome::new(GateDecision::NotFound, verdict);
        }

        // Classification already rejects unparsable IPs.
        let Ok(ip) = request.ip().parse::<IpAddr>() else {
            return GateOutcome::new(
                GateDecision::NotFound,
                ClassificationVerdict::suspicious(ClassificationReason::InvalidIp),
            );
        };

        if !self.limiter.admit(ip.to_canonical(), request.timestamp()) {
            return GateOutcome::new(GateDecision::RateLimited, verdict);
        }

        if !self.is_method_allowed(request.method()) {
            return GateOutcome::new(GateDecision::MethodNotAllowed, verdict);
        }

        GateOutcome::new(GateDecision::Allow, verdict)
    }

    /// Check whether a method is forwarded to the handlers. Case-sensitive.
    #[must_use]
    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods.iter().any(|m| m == method)
    }

    fn log(request: &Request, outcome: &GateOutcome) {
        let record = GateRecord {
            tag: outcome.decision.tag(),
            ip: request.ip(),
            method: request.method(),
            path: request.path(),
        };

        match outcome.decision {
            GateDecision::NotFound => warn!(
                reason = %outcome.verdict.reason,
                user_agent = %request.user_agent(),
                "{record}"
            ),
            GateDecision::RateLimited => warn!(user_agent = %request.user_agent(), "{record}"),
            GateDecision::MethodNotAllowed | GateDecision::Allow => info!("{record}"),
        }
    }

    /// Evaluate a request and run `handler` only if it is allowed.
    ///
    /// The handler's output is passed through unchanged; rejected requests
    /// get their synthesized response and the handler is never called.
    pub async fn dispatch<F, Fut>(
        &self,
        request: &Request,
        handler: F,
    ) -> Result<Fut::Output, Rejection>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        match self.evaluate(request).rejection() {
            Some(rejection) => Err(rejection),
            None => Ok(handler().await),
        }
    }

    /// The classifier in use.
    #[must_use]
    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// The rate limiter in use.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Decision counters since construction.
    #[must_use]
    pub fn stats(&self) -> GateStats {
        self.counters.snapshot()
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    use crate::config::RuleTables;

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64)";

    fn gate_with_limit(max_requests: u32) -> Gate {
        let config = GateConfig::builder().limit(max_requests, 60).build();
        Gate::new(&config).unwrap()
    }

    fn get(ip: &str, path: &str) -> Request {
        Request::new(ip, "GET", path, BROWSER)
    }

    #[test]
    fn test_allows_clean_request() {
        let gate = Gate::with_defaults();
        let outcome = gate.evaluate(&get("10.0.0.1", "/topobitcoin"));

        assert!(outcome.is_allowed());
        assert_eq!(outcome.http_status, 200);
        assert_eq!(outcome.verdict, ClassificationVerdict::clean());
        assert!(outcome.rejection().is_none());
    }

    #[test]
    fn test_blocked_path_is_not_found() {
        let gate = Gate::with_defaults();
        let outcome = gate.evaluate(&get("10.0.0.1", "/wp-admin"));

        assert_eq!(outcome.decision, GateDecision::NotFound);
        assert_eq!(outcome.http_status, 404);
        assert_eq!(outcome.verdict.reason, ClassificationReason::BlockedPath);
        assert_eq!(
            outcome.rejection(),
            Some(Rejection { status: 404, body: "Not Found" })
        );
    }

    #[test]
    fn test_rejection_body_does_not_leak_reason() {
        let gate = Gate::with_defaults();
        let by_ip = gate.evaluate(&get("35.203.210.168", "/trends"));
        let by_agent = gate.evaluate(&Request::new("10.0.0.1", "GET", "/trends", "sqlmap/1.0"));

        assert_ne!(by_ip.verdict.reason, by_agent.verdict.reason);
        assert_eq!(by_ip.rejection(), by_agent.rejection());
    }

    #[test]
    fn test_rate_limit_escalates() {
        let gate = gate_with_limit(3);
        let start = Instant::now();

        for i in 0..3 {
            let req = get("10.0.0.7", "/trends").at(start + Duration::from_secs(i));
            assert!(gate.evaluate(&req).is_allowed());
        }

        let over = gate.evaluate(&get("10.0.0.7", "/trends").at(start + Duration::from_secs(4)));
        assert_eq!(over.decision, GateDecision::RateLimited);
        assert_eq!(over.http_status, 429);
        assert_eq!(over.rejection().map(|r| r.body), Some("Too Many Requests"));

        // Still denied long after the window.
        let later = get("10.0.0.7", "/trends").at(start + Duration::from_secs(3600));
        let later = gate.evaluate(&later);
        assert_eq!(later.decision, GateDecision::RateLimited);
        assert!(gate.rate_limiter().is_blocked(&"10.0.0.7".parse().unwrap()));
    }

    #[test]
    fn test_classification_wins_over_rate_limit() {
        let gate = gate_with_limit(1);
        let now = Instant::now();

        assert!(gate.evaluate(&get("10.0.0.8", "/trends").at(now)).is_allowed());
        assert_eq!(
            gate.evaluate(&get("10.0.0.8", "/trends").at(now)).decision,
            GateDecision::RateLimited
        );

        // The IP is now blocked, but a blocked path still reports as not found.
        let outcome = gate.evaluate(&get("10.0.0.8", "/admin").at(now));
        assert_eq!(outcome.decision, GateDecision::NotFound);
    }

    #[test]
    fn test_hostile_requests_do_not_consume_budget() {
        let gate = gate_with_limit(2);
        let now = Instant::now();

        for _ in 0..20 {
            let outcome = gate.evaluate(&get("10.0.0.9", "/.env").at(now));
            assert_eq!(outcome.decision, GateDecision::NotFound);
        }

        let ip: IpAddr = "10.0.0.9".parse().unwrap();
        assert_eq!(gate.rate_limiter().current_count(&ip, now), 0);
        assert!(gate.evaluate(&get("10.0.0.9", "/trends").at(now)).is_allowed());
    }

    #[test]
    fn test_method_checked_after_rate_limit() {
        let gate = gate_with_limit(1);
        let now = Instant::now();

        let post = gate.evaluate(&Request::new("10.0.0.10", "POST", "/trends", BROWSER).at(now));
        assert_eq!(post.decision, GateDecision::MethodNotAllowed);
        assert_eq!(post.http_status, 405);

        // The POST consumed the only slot.
        let next = gate.evaluate(&Request::new("10.0.0.10", "GET", "/trends", BROWSER).at(now));
        assert_eq!(next.decision, GateDecision::RateLimited);
    }

    #[test]
    fn test_method_check_is_case_sensitive() {
        let gate = Gate::with_defaults();

        assert!(gate.is_method_allowed("GET"));
        assert!(gate.is_method_allowed("OPTIONS"));
        assert!(!gate.is_method_allowed("get"));
        assert!(!gate.is_method_allowed("POST"));
    }

    #[test]
    fn test_options_is_allowed() {
        let gate = Gate::with_defaults();
        let outcome = gate.evaluate(&Request::new("10.0.0.11", "OPTIONS", "/trends", BROWSER));
        assert!(outcome.is_allowed());
    }

    #[test]
    fn test_ipv4_mapped_shares_rate_limit_key() {
        let gate = gate_with_limit(1);
        let now = Instant::now();

        assert!(gate.evaluate(&get("10.0.0.12", "/trends").at(now)).is_allowed());
        let mapped = gate.evaluate(&get("::ffff:10.0.0.12", "/trends").at(now));
        assert_eq!(mapped.decision, GateDecision::RateLimited);
    }

    #[test]
    fn test_fresh_gate_has_isolated_state() {
        let first = gate_with_limit(1);
        let now = Instant::now();
        let _ = first.evaluate(&get("10.0.0.13", "/trends").at(now));
        let _ = first.evaluate(&get("10.0.0.13", "/trends").at(now));
        assert_eq!(first.rate_limiter().blocklist().len(), 1);

        // Nothing survives into a new gate, as after a restart.
        let second = gate_with_limit(1);
        assert!(second.evaluate(&get("10.0.0.13", "/trends").at(now)).is_allowed());
    }

    #[test]
    fn test_shared_limiter() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let gate = Gate::from_parts(
            Classifier::from_rules(&RuleTables::empty()).unwrap(),
            Arc::clone(&limiter),
            vec!["GET".into()],
        );
        let now = Instant::now();

        let _ = gate.evaluate(&get("10.0.0.14", "/admin").at(now));
        let _ = gate.evaluate(&get("10.0.0.14", "/admin").at(now));

        assert_eq!(limiter.escalation_count(), 1);
    }

    #[test]
    fn test_stats() {
        let gate = gate_with_limit(1);
        let now = Instant::now();

        let _ = gate.evaluate(&get("10.0.0.15", "/trends").at(now));
        let _ = gate.evaluate(&get("10.0.0.15", "/trends").at(now));
        let _ = gate.evaluate(&get("10.0.0.16", "/admin").at(now));
        let _ = gate.evaluate(&Request::new("10.0.0.17", "DELETE", "/trends", BROWSER).at(now));

        let stats = gate.stats();
        assert_eq!(
            stats,
            GateStats {
                allowed: 1,
                not_found: 1,
                rate_limited: 1,
                method_not_allowed: 1,
            }
        );
        assert_eq!(stats.total(), 4);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GateConfig::builder().limit(0, 60).build();
        assert!(Gate::new(&config).is_err());
    }

    #[traced_test]
    #[test]
    fn test_logs_carry_tags() {
        let gate = gate_with_limit(1);
        let now = Instant::now();

        let _ = gate.evaluate(&get("10.1.1.1", "/wp-login.php").at(now));
        let _ = gate.evaluate(&get("10.1.1.2", "/trends").at(now));
        let _ = gate.evaluate(&get("10.1.1.2", "/trends").at(now));
        let _ = gate.evaluate(&Request::new("10.1.1.3", "PUT", "/trends", BROWSER).at(now));

        assert!(logs_contain("BLOCKED: 10.1.1.1 - GET /wp-login.php"));
        assert!(logs_contain("reason=blocked_path"));
        assert!(logs_contain("ALLOWED: 10.1.1.2 - GET /trends"));
        assert!(logs_contain("RATE LIMITED: 10.1.1.2 - GET /trends"));
        assert!(logs_contain("METHOD NOT ALLOWED: 10.1.1.3 - PUT /trends"));
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler_when_allowed() {
        let gate = Gate::with_defaults();
        let result = gate
            .dispatch(&get("10.2.0.1", "/trends"), || async { "scraped" })
            .await;
        assert_eq!(result, Ok("scraped"));
    }

    #[tokio::test]
    async fn test_dispatch_skips_handler_when_rejected() {
        let gate = Gate::with_defaults();
        let flag = AtomicBool::new(false);
        let called = &flag;

        let result = gate
            .dispatch(&get("10.2.0.2", "/phpmyadmin"), || async move {
                called.store(true, Ordering::SeqCst);
            })
            .await;

        assert_eq!(result, Err(Rejection { status: 404, body: "Not Found" }));
        assert!(!flag.load(Ordering::SeqCst));
    }
}
