//! Process-lifetime IP blocklist.
//!
//! Membership is monotonic: IPs are added by the rate limiter when they
//! exceed their window and are never removed while the process runs. Nothing
//! is persisted, so a restart starts from an empty list.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

/// Why and when an IP was blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockEntry {
    /// Human-readable reason.
    pub reason: String,
    /// When the block was created.
    pub blocked_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Slot {
    /// Insertion order.
    seq: u64,
    entry: BlockEntry,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<IpAddr, Slot>,
    next_seq: u64,
}

/// Set of permanently denied IPs.
#[derive(Debug, Default)]
pub struct Blocklist {
    inner: RwLock<Inner>,
}

impl Blocklist {
    /// Create an empty blocklist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an IP. Returns `false` if it was already present, in which case
    /// the original entry is kept.
    pub(crate) fn insert(&self, ip: IpAddr, reason: impl Into<String>) -> bool {
        let mut inner = self.inner.write();
        if inner.slots.contains_key(&ip) {
            return false;
        }

        let entry = BlockEntry {
            reason: reason.into(),
            blocked_at: Utc::now(),
        };
        info!(ip = %ip, reason = %entry.reason, "IP added to blocklist");

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.slots.insert(ip, Slot { seq, entry });
        true
    }

    /// Check if an IP is blocked.
    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.inner.read().slots.contains_key(ip)
    }

    /// Get the block entry for an IP (if blocked).
    #[must_use]
    pub fn get(&self, ip: &IpAddr) -> Option<BlockEntry> {
        self.inner.read().slots.get(ip).map(|slot| slot.entry.clone())
    }

    /// Number of blocked IPs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Whether no IP has been blocked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().slots.is_empty()
    }

    /// All blocked IPs in the order they were blocked.
    #[must_use]
    pub fn list(&self) -> Vec<(IpAddr, BlockEntry)> {
        let inner = self.inner.read();
        let mut slots: Vec<_> = inner.slots.iter().collect();
        slots.sort_by_key(|(_, slot)| slot.seq);
        slots
            .into_iter()
            .map(|(ip, slot)| (*ip, slot.entry.clone()))
            .collect()
    }
}
