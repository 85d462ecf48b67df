//! Structured batch-analysis document

use chrono::{DateTime, Utc};
use nids_common::Detection;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Where the risk score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSource {
    /// Weighted classifier confidences
    Classifier,
    /// Severity-weighted detection fallback
    SeverityWeighted,
    /// No classifier and no detections; never fabricated
    Unavailable,
}

/// Composite 0-100 risk estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub score: f64,
    pub level: String,
    pub rationale: String,
    pub risk_source: RiskSource,
}

/// Replay bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub packets_processed: u64,
    pub bytes_processed: u64,
    pub processing_time_ms: u64,
    pub duration_seconds: f64,
    pub capture_window: CaptureWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolCount {
    pub protocol: String,
    pub packets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TalkerEntry {
    pub ip: IpAddr,
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortCount {
    pub port: u16,
    pub packets: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSample {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub packets: u64,
    pub bytes: u64,
}

/// One-second activity bucket, offset from the capture start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub offset_secs: u64,
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointEdge {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub packets: u64,
    pub bytes: u64,
}

/// Traffic overview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub top_protocols: Vec<ProtocolCount>,
    pub top_talkers: Vec<TalkerEntry>,
    pub top_ports: Vec<PortCount>,
    pub dns_queries: Vec<String>,
    pub tls_handshakes: u64,
    pub http_hosts: Vec<String>,
    pub flow_samples: Vec<FlowSample>,
    pub timeline: Vec<TimelineBucket>,
}

/// Supporting evidence for the detections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub timeline: Vec<TimelineBucket>,
    pub endpoint_matrix: Vec<EndpointEdge>,
}

/// Complete batch analysis output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: Metadata,
    pub summary: Summary,
    pub detections: Vec<Detection>,
    pub risk: Risk,
    pub evidence: Evidence,
}
