//! Connection tracking with idle-timeout eviction

use dashmap::DashMap;
use nids_common::FlowKey;
use std::time::{Duration, Instant};

/// Per-flow state
#[derive(Debug, Clone)]
struct ConnectionState {
    first_seen: Instant,
    last_seen: Instant,
    packets: u64,
    bytes: u64,
}

impl ConnectionState {
    fn new(now: Instant) -> Self {
        Self { first_seen: now, last_seen: now, packets: 0, bytes: 0 }
    }
}

/// Read-only view of a connection handed back per packet
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSnapshot {
    pub duration_secs: f64,
    pub packets: u64,
    pub bytes: u64,
}

/// Flow key -> connection state, safe under concurrent producers
///
/// The sweep only takes per-shard locks; it never holds the table across
/// anything blocking.
pub struct ConnectionTracker {
    connections: DashMap<FlowKey, ConnectionState>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self { connections: DashMap::new() }
    }

    /// Create the connection if new, update counters, return a snapshot
    pub fn start_or_touch(&self, key: FlowKey, bytes: u64) -> ConnectionSnapshot {
        let now = Instant::now();
        let mut entry = self
            .connections
            .entry(key)
            .or_insert_with(|| ConnectionState::new(now));
        entry.last_seen = now;
        entry.packets += 1;
        entry.bytes += bytes;
        ConnectionSnapshot {
            duration_secs: now.duration_since(entry.first_seen).as_secs_f64(),
            packets: entry.packets,
            bytes: entry.bytes,
        }
    }

    /// Seconds since the flow started; 0.0 for unknown flows
    pub fn duration(&self, key: &FlowKey) -> f64 {
        self.connections
            .get(key)
            .map(|c| c.first_seen.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Remove the flow, returning its final duration
    pub fn end(&self, key: &FlowKey) -> Option<f64> {
        self.connections
            .remove(key)
            .map(|(_, c)| c.last_seen.duration_since(c.first_seen).as_secs_f64())
    }

    /// Evict flows idle longer than `idle_timeout`; returns eviction count
    pub fn sweep(&self, idle_timeout: Duration) -> usize {
        let before = self.connections.len();
        let now = Instant::now();
        self.connections
            .retain(|_, state| now.duration_since(state.last_seen) < idle_timeout);
        let evicted = before.saturating_sub(self.connections.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.connections.len(), "connection sweep");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn key(port: u16) -> FlowKey {
        FlowKey {
            src_ip: "10.0.0.5".parse::<IpAddr>().unwrap(),
            dst_ip: "10.0.0.1".parse::<IpAddr>().unwrap(),
            dst_port: port,
        }
    }

    #[test]
    fn test_touch_accumulates() {
        let tracker = ConnectionTracker::new();
        tracker.start_or_touch(key(80), 100);
        let snap = tracker.start_or_touch(key(80), 200);
        assert_eq!(snap.packets, 2);
        assert_eq!(snap.bytes, 300);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_duration_unknown_flow_is_zero() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.duration(&key(443)), 0.0);
    }

    #[test]
    fn test_end_removes() {
        let tracker = ConnectionTracker::new();
        tracker.start_or_touch(key(80), 10);
        assert!(tracker.end(&key(80)).is_some());
        assert!(tracker.end(&key(80)).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_sweep_evicts_idle_only() {
        let tracker = ConnectionTracker::new();
        tracker.start_or_touch(key(80), 10);
        tracker.start_or_touch(key(443), 10);

        std::thread::sleep(Duration::from_millis(30));
        tracker.start_or_touch(key(443), 10); // keep this one fresh

        let evicted = tracker.sweep(Duration::from_millis(20));
        assert_eq!(evicted, 1);
        assert_eq!(tracker.duration(&key(80)), 0.0);
        assert!(tracker.duration(&key(443)) > 0.0);
    }

    #[test]
    fn test_concurrent_touch() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(ConnectionTracker::new());
        let mut handles = Vec::new();
        for t in 0..4u16 {
            let tracker = tracker.clone();
            handles.push(thread::spawn(move || {
                for i in 0..250u16 {
                    tracker.start_or_touch(key(t * 1000 + i), 1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.len(), 1000);
    }
}
