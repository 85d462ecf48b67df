//! Alert deduplication
//!
//! Suppresses repeats of the same (source, rule, port) within the dedup
//! window. The in-memory cache answers first; the alert store is consulted
//! as the cross-process check. Store failures degrade to in-memory-only
//! dedup rather than erroring.

use crate::store::{AlertId, AlertStore};
use dashmap::DashMap;
use nids_common::{Detection, PacketRecord};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    source_ip: Option<IpAddr>,
    rule_id: String,
    port: Option<u16>,
}

impl DedupKey {
    fn from_detection(det: &Detection) -> Self {
        Self {
            source_ip: det.src_ip,
            rule_id: det.rule_id.clone(),
            port: det.dst_port,
        }
    }
}

/// What happened to a submitted detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// Persisted as a new alert
    Stored(AlertId),
    /// Duplicate within the window; not forwarded
    Suppressed,
    /// New, but the store rejected it; tracked in-memory only
    Degraded,
}

/// Windowed suppression in front of the alert store
pub struct AlertDeduplicator {
    cache: DashMap<DedupKey, Instant>,
    window: Duration,
    store: Arc<dyn AlertStore>,
}

impl AlertDeduplicator {
    pub fn new(store: Arc<dyn AlertStore>, window: Duration) -> Self {
        Self { cache: DashMap::new(), window, store }
    }

    /// Forward a detection unless it repeats a recent one
    pub fn submit(&self, detection: &Detection, packet: &PacketRecord) -> DedupOutcome {
        let key = DedupKey::from_detection(detection);

        if let Some(seen) = self.cache.get(&key) {
            if seen.elapsed() < self.window {
                return DedupOutcome::Suppressed;
            }
        }

        // Cross-process check; a failing store only disables this leg
        let since = detection.created_at
            - chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::zero());
        match self
            .store
            .exists_recent(detection.src_ip, &detection.rule_id, detection.dst_port, since)
        {
            Ok(true) => {
                self.cache.insert(key, Instant::now());
                return DedupOutcome::Suppressed;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "dedup store lookup failed; in-memory only");
            }
        }

        match self.store.insert(detection, packet) {
            Ok(id) => {
                self.cache.insert(key, Instant::now());
                DedupOutcome::Stored(id)
            }
            Err(e) => {
                tracing::warn!(error = %e, rule = %detection.rule_id, "alert persist failed");
                self.cache.insert(key, Instant::now());
                DedupOutcome::Degraded
            }
        }
    }

    /// Drop cache entries older than twice the window
    pub fn prune(&self) -> usize {
        let horizon = self.window * 2;
        let before = self.cache.len();
        self.cache.retain(|_, seen| seen.elapsed() < horizon);
        before.saturating_sub(self.cache.len())
    }

    /// Current cache size
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
