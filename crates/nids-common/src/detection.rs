//! Detections produced by the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Which stage produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    /// Pattern or connection-pattern rule
    Signature,
    /// Unsupervised anomaly scorer
    Anomaly,
    /// Supervised classifier
    Classification,
    /// Batch flow-level heuristic
    Heuristic,
}

impl fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionKind::Signature => write!(f, "signature"),
            DetectionKind::Anomaly => write!(f, "anomaly"),
            DetectionKind::Classification => write!(f, "classification"),
            DetectionKind::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Detection severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the severity-fallback risk score
    pub fn risk_weight(&self) -> f64 {
        match self {
            Severity::Low => 6.0,
            Severity::Medium => 12.0,
            Severity::High => 18.0,
            Severity::Critical => 25.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One security detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Producing stage
    pub kind: DetectionKind,
    /// Rule, signature or heuristic id (never empty)
    pub rule_id: String,
    /// Severity
    pub severity: Severity,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable description
    pub description: String,
    /// Which component produced it (e.g. "signature_matcher")
    pub source: String,
    /// Offending source address, when known
    pub src_ip: Option<IpAddr>,
    /// Target address, when known
    pub dst_ip: Option<IpAddr>,
    /// Target port, when known
    pub dst_port: Option<u16>,
    /// Creation time; dedup assumes this is monotonic per source
    pub created_at: DateTime<Utc>,
}

impl Detection {
    /// Create a detection with confidence clamped into [0, 1]
    pub fn new(
        kind: DetectionKind,
        rule_id: impl Into<String>,
        severity: Severity,
        confidence: f64,
        description: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            rule_id: rule_id.into(),
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            description: description.into(),
            source: source.into(),
            src_ip: None,
            dst_ip: None,
            dst_port: None,
            created_at: Utc::now(),
        }
    }

    /// Attach only the offending source
    pub fn with_source_ip(mut self, src_ip: IpAddr) -> Self {
        self.src_ip = Some(src_ip);
        self
    }

    /// Attach packet context
    pub fn with_endpoints(
        mut self,
        src_ip: IpAddr,
        dst_ip: IpAddr,
        dst_port: u16,
    ) -> Self {
        self.src_ip = Some(src_ip);
        self.dst_ip = Some(dst_ip);
        self.dst_port = Some(dst_port);
        self
    }
}
