//! External collaborator contracts
//!
//! The alert store, sample collector and cache live outside this process;
//! here are the traits the engine speaks plus in-memory fallbacks used
//! when a backend is unavailable (and in tests).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nids_common::{Detection, PacketRecord, Result};
use nids_flow::FeatureVector;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identifier assigned by the alert store
pub type AlertId = Uuid;

/// Persistence for detections, plus the cross-process dedup check
pub trait AlertStore: Send + Sync {
    fn insert(&self, detection: &Detection, packet: &PacketRecord) -> Result<AlertId>;

    /// Whether a matching alert exists at or after `since`
    fn exists_recent(
        &self,
        source_ip: Option<IpAddr>,
        rule_id: &str,
        port: Option<u16>,
        since: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Training-sample hand-off; best effort, never a hard dependency
pub trait SampleCollector: Send + Sync {
    fn collect(
        &self,
        features: &FeatureVector,
        packet: &PacketRecord,
        label: &str,
        labeled_by: &str,
        confidence: f64,
    ) -> Result<()>;
}

/// Pluggable cache contract with TTL semantics
pub trait Cache: Send + Sync {
    fn get(&self, prefix: &str, key: &str) -> Option<String>;
    fn set(&self, prefix: &str, key: &str, value: String, ttl: Duration);
    fn delete(&self, prefix: &str, key: &str);
    fn clear_prefix(&self, prefix: &str);
}

/// In-process alert store fallback
#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<Vec<StoredAlert>>,
}

struct StoredAlert {
    id: AlertId,
    source_ip: Option<IpAddr>,
    rule_id: String,
    port: Option<u16>,
    created_at: DateTime<Utc>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }

    /// Whether an id handed out by `insert` is present
    pub fn contains(&self, id: AlertId) -> bool {
        self.alerts.lock().iter().any(|a| a.id == id)
    }
}

impl AlertStore for MemoryAlertStore {
    fn insert(&self, detection: &Detection, _packet: &PacketRecord) -> Result<AlertId> {
        let id = Uuid::new_v4();
        self.alerts.lock().push(StoredAlert {
            id,
            source_ip: detection.src_ip,
            rule_id: detection.rule_id.clone(),
            port: detection.dst_port,
            created_at: detection.created_at,
        });
        Ok(id)
    }

    fn exists_recent(
        &self,
        source_ip: Option<IpAddr>,
        rule_id: &str,
        port: Option<u16>,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.alerts.lock().iter().any(|a| {
            a.source_ip == source_ip
                && a.rule_id == rule_id
                && a.port == port
                && a.created_at >= since
        }))
    }
}

/// One collected training sample
#[derive(Debug, Clone)]
pub struct CollectedSample {
    pub features: Vec<f64>,
    pub label: String,
    pub labeled_by: String,
    pub confidence: f64,
}

/// In-process sample collector, mostly for tests
#[derive(Default)]
pub struct MemorySampleCollector {
    samples: Mutex<Vec<CollectedSample>>,
}

impl MemorySampleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<CollectedSample> {
        self.samples.lock().clone()
    }
}

impl SampleCollector for MemorySampleCollector {
    fn collect(
        &self,
        features: &FeatureVector,
        _packet: &PacketRecord,
        label: &str,
        labeled_by: &str,
        confidence: f64,
    ) -> Result<()> {
        self.samples.lock().push(CollectedSample {
            features: features.as_slice().to_vec(),
            label: label.to_string(),
            labeled_by: labeled_by.to_string(),
            confidence,
        });
        Ok(())
    }
}

/// In-process TTL cache fallback
pub struct MemoryCache {
    entries: DashMap<(String, String), (String, Instant, Duration)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, prefix: &str, key: &str) -> Option<String> {
        let map_key = (prefix.to_string(), key.to_string());
        let expired = match self.entries.get(&map_key) {
            Some(entry) => {
                let (value, stored_at, ttl) = entry.value();
                if stored_at.elapsed() <= *ttl {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(&map_key);
        }
        None
    }

    fn set(&self, prefix: &str, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            (prefix.to_string(), key.to_string()),
            (value, Instant::now(), ttl),
        );
    }

    fn delete(&self, prefix: &str, key: &str) {
        self.entries.remove(&(prefix.to_string(), key.to_string()));
    }

    fn clear_prefix(&self, prefix: &str) {
        self.entries.retain(|(p, _), _| p != prefix);
    }
}
