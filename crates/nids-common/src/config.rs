//! Engine configuration
//!
//! Loading is the caller's concern; this is the recognized option set with
//! its defaults.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Capture-boundary and detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interface name; `None` means auto-detect
    pub interface: Option<String>,
    /// Read timeout handed to the capture handle
    pub capture_timeout_ms: u64,
    /// CIDRs exempted from deep analysis (still connection-tracked)
    pub whitelist_ips: Vec<IpNetwork>,
    /// Ports exempted from deep analysis
    pub whitelist_ports: Vec<u16>,
    /// Idle timeout before a connection is evicted
    pub idle_timeout_secs: u64,
    /// How often the eviction sweep runs
    pub sweep_interval_secs: u64,
    /// Window during which repeated detections are suppressed
    pub dedup_window_secs: u64,
    /// Anomaly confidence gate
    pub anomaly_threshold: f64,
    /// Classification confidence gate
    pub classification_threshold: f64,
    /// Samples buffered before the anomaly model first trains
    pub min_samples_for_training: usize,
    /// Wall-clock interval between anomaly retrains
    pub retrain_interval_secs: u64,
    /// Ingest queue capacity; producer drops on overflow
    pub queue_capacity: usize,
    /// Connection-pattern sliding window, in packets
    pub scan_window_packets: usize,
    /// Connection-pattern sliding window, in seconds
    pub scan_window_secs: u64,
    /// Unique destination ports before a source counts as scanning
    pub port_scan_threshold: usize,
    /// Packets from one source in the window before a flood is flagged
    pub flood_threshold: usize,
    /// Capture-worker restarts before giving up
    pub max_retries: u32,
    /// Restart backoff base
    pub retry_base_secs: u64,
    /// Restart backoff cap
    pub retry_cap_secs: u64,
    /// Supervisor liveness-check interval
    pub status_check_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interface: None,
            capture_timeout_ms: 1000,
            whitelist_ips: Vec::new(),
            whitelist_ports: Vec::new(),
            idle_timeout_secs: 300,
            sweep_interval_secs: 30,
            dedup_window_secs: 300,
            anomaly_threshold: 0.5,
            classification_threshold: 0.7,
            min_samples_for_training: 200,
            retrain_interval_secs: 3600,
            queue_capacity: 10_000,
            scan_window_packets: 1000,
            scan_window_secs: 60,
            port_scan_threshold: 10,
            flood_threshold: 100,
            max_retries: 10,
            retry_base_secs: 5,
            retry_cap_secs: 60,
            status_check_interval_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Idle timeout as a duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Dedup window as a duration
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    /// Retrain interval as a duration
    pub fn retrain_interval(&self) -> Duration {
        Duration::from_secs(self.retrain_interval_secs)
    }

    /// Connection-pattern window horizon as a duration
    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(self.scan_window_secs)
    }

    /// True if the address falls inside a whitelisted CIDR
    pub fn is_whitelisted_ip(&self, ip: IpAddr) -> bool {
        self.whitelist_ips.iter().any(|net| net.contains(ip))
    }

    /// True if the port is whitelisted
    pub fn is_whitelisted_port(&self, port: u16) -> bool {
        self.whitelist_ports.contains(&port)
    }

    /// Validate value ranges
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.anomaly_threshold) {
            return Err(crate::NidsError::Config(format!(
                "anomaly_threshold {} outside [0, 1]",
                self.anomaly_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.classification_threshold) {
            return Err(crate::NidsError::Config(format!(
                "classification_threshold {} outside [0, 1]",
                self.classification_threshold
            )));
        }
        if self.queue_capacity == 0 {
            return Err(crate::NidsError::Config("queue_capacity must be > 0".into()));
        }
        if self.min_samples_for_training == 0 {
            return Err(crate::NidsError::Config(
                "min_samples_for_training must be > 0".into(),
            ));
        }
        Ok(())
    }
}
