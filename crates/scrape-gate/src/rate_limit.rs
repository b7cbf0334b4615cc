//! Per-IP sliding window rate limiting with permanent escalation.
//!
//! Each client IP gets a window of recent admission instants. When an IP
//! already holds `max_requests` instants inside the trailing window, the
//! next attempt moves it to the [`Blocklist`] for the rest of the process
//! lifetime; a blocked IP is denied without touching its window again.
//!
//! Admission for one IP is serialized by that IP's own mutex, so concurrent
//! requests from one source cannot both slip past the limit, while requests
//! from different IPs only share the brief map lookup.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::blocklist::Blocklist;
use crate::config::RateLimitConfig;

/// Rate limit state for one client IP.
#[derive(Debug)]
struct IpWindow {
    /// Admission instants within the window, oldest first.
    timestamps: VecDeque<Instant>,
    /// Set once the IP has been escalated to the blocklist.
    blocked: bool,
}

impl IpWindow {
    fn new(max_requests: u32) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests as usize),
            blocked: false,
        }
    }

    /// Drop instants that fell out of the window ending at `now`.
    fn prune(&mut self, now: Instant, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };

        while self.timestamps.front().is_some_and(|t| *t < cutoff) {
            self.timestamps.pop_front();
        }
    }
}

/// Sliding window rate limiter keyed by client IP.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum admissions per window.
    max_requests: u32,
    /// Window size.
    window: Duration,
    /// Whether limiting is enabled.
    enabled: bool,
    /// Per-IP windows, each behind its own lock.
    windows: RwLock<HashMap<IpAddr, Arc<Mutex<IpWindow>>>>,
    /// IPs that exceeded their window.
    blocklist: Blocklist,
    /// Number of IPs escalated to the blocklist.
    escalations: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter admitting `max_requests` per `window` per IP.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            enabled: true,
            windows: RwLock::new(HashMap::new()),
            blocklist: Blocklist::new(),
            escalations: AtomicU64::new(0),
        }
    }

    /// Create from configuration.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.max_requests, config.window())
        }
    }

    /// Get or lazily create the window for an IP.
    fn window_for(&self, ip: IpAddr) -> Arc<Mutex<IpWindow>> {
        if let Some(window) = self.windows.read().get(&ip) {
            return Arc::clone(window);
        }

        let mut windows = self.windows.write();
        Arc::clone(
            windows
                .entry(ip)
                .or_insert_with(|| Arc::new(Mutex::new(IpWindow::new(self.max_requests)))),
        )
    }

    /// Decide whether a request from `ip` arriving at `now` is admitted.
    ///
    /// Returns `false` for blocked IPs and for the attempt that exceeds the
    /// window, which also blocks the IP permanently.
    pub fn admit(&self, ip: IpAddr, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        if self.blocklist.contains(&ip) {
            return false;
        }

        let window = self.window_for(ip);
        let mut state = window.lock();

        // Another request from this IP may have escalated it while we waited.
        if state.blocked {
            return false;
        }

        state.prune(now, self.window);

        let count = state.timestamps.len();
        if count >= self.max_requests as usize {
            state.blocked = true;
            self.blocklist.insert(ip, "rate limit exceeded");
            self.escalations.fetch_add(1, Ordering::Relaxed);
            warn!(
                ip = %ip,
                count = count,
                limit = self.max_requests,
                window_secs = self.window.as_secs(),
                "Rate limit exceeded, IP permanently blocked"
            );
            return false;
        }

        state.timestamps.push_back(now);
        debug!(ip = %ip, count = count + 1, "Request admitted");
        true
    }

    /// Whether an IP has been escalated to the blocklist.
    #[must_use]
    pub fn is_blocked(&self, ip: &IpAddr) -> bool {
        self.blocklist.contains(ip)
    }

    /// Admissions recorded for an IP inside the window ending at `now`.
    #[must_use]
    pub fn current_count(&self, ip: &IpAddr, now: Instant) -> usize {
        let Some(window) = self.windows.read().get(ip).map(Arc::clone) else {
            return 0;
        };

        let mut state = window.lock();
        state.prune(now, self.window);
        state.timestamps.len()
    }

    /// Number of IPs with rate limit state.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.windows.read().len()
    }

    /// Number of escalations to the blocklist so far.
    #[must_use]
    pub fn escalation_count(&self) -> u64 {
        self.escalations.load(Ordering::Relaxed)
    }

    /// IPs escalated so far, in escalation order.
    #[must_use]
    pub fn blocked_ips(&self) -> Vec<IpAddr> {
        self.blocklist.list().into_iter().map(|(ip, _)| ip).collect()
    }

    /// The blocklist fed by this limiter.
    #[must_use]
    pub const fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }

    /// Get the max requests per window.
    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Get the window size.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Check if rate limiting is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
