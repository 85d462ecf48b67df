//! Process-wide capture statistics
//!
//! Mutated from the capture and processing workers, read by health checks.
//! Counters are lock-free; the rate meter takes a short rwlock only when a
//! snapshot is requested.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Operational counters for the ingest pipeline
#[derive(Debug)]
pub struct CaptureStats {
    total_packets: AtomicU64,
    total_bytes: AtomicU64,
    dropped_packets: AtomicU64,
    queue_depth: AtomicU64,
    capture_alive: AtomicBool,
    analysis_only: AtomicBool,
    /// (instant, packets, bytes) at the last rate sample
    rate_mark: RwLock<Option<(Instant, u64, u64)>>,
    last_packet: RwLock<Option<Instant>>,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self {
            total_packets: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            dropped_packets: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            capture_alive: AtomicBool::new(false),
            analysis_only: AtomicBool::new(false),
            rate_mark: RwLock::new(None),
            last_packet: RwLock::new(None),
        }
    }

    /// Record one captured frame
    #[inline]
    pub fn record_packet(&self, bytes: u64) {
        self.total_packets.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        *self.last_packet.write() = Some(Instant::now());
    }

    /// Record a frame dropped at decode or enqueue
    #[inline]
    pub fn record_drop(&self) {
        self.dropped_packets.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the current ingest queue depth
    #[inline]
    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Mark the capture worker alive or dead
    pub fn set_capture_alive(&self, alive: bool) {
        self.capture_alive.store(alive, Ordering::Relaxed);
    }

    /// Enter analysis-only mode (capture permanently unavailable)
    pub fn set_analysis_only(&self, analysis_only: bool) {
        self.analysis_only.store(analysis_only, Ordering::Relaxed);
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets.load(Ordering::Relaxed)
    }

    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn is_analysis_only(&self) -> bool {
        self.analysis_only.load(Ordering::Relaxed)
    }

    /// Point-in-time view with computed rates and a health verdict
    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let packets = self.total_packets.load(Ordering::Relaxed);
        let bytes = self.total_bytes.load(Ordering::Relaxed);

        let (packet_rate, byte_rate) = {
            let mut mark = self.rate_mark.write();
            let rates = match *mark {
                Some((at, p0, b0)) => {
                    let elapsed = now.duration_since(at).as_secs_f64();
                    if elapsed < 0.001 {
                        (0.0, 0.0)
                    } else {
                        (
                            (packets - p0) as f64 / elapsed,
                            (bytes - b0) as f64 / elapsed,
                        )
                    }
                }
                None => (0.0, 0.0),
            };
            *mark = Some((now, packets, bytes));
            rates
        };

        let last_packet_age_secs = self
            .last_packet
            .read()
            .map(|at| now.duration_since(at).as_secs_f64());

        let capture_alive = self.capture_alive.load(Ordering::Relaxed);
        let analysis_only = self.analysis_only.load(Ordering::Relaxed);

        StatsSnapshot {
            total_packets: packets,
            total_bytes: bytes,
            dropped_packets: self.dropped_packets.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            packet_rate,
            byte_rate,
            last_packet_age_secs,
            capture_alive,
            analysis_only,
            healthy: capture_alive && !analysis_only,
        }
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub dropped_packets: u64,
    pub queue_depth: u64,
    pub packet_rate: f64,
    pub byte_rate: f64,
    pub last_packet_age_secs: Option<f64>,
    pub capture_alive: bool,
    pub analysis_only: bool,
    pub healthy: bool,
}
