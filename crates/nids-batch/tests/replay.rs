//! Batch analyzer tests over real capture files

use etherparse::PacketBuilder;
use nids_batch::{BatchAnalyzer, RiskSource};
use nids_common::EngineConfig;
use nids_detect::{AnomalyScorer, ClassificationScorer, DetectionEngine};
use nids_flow::{
    AccessFrequencyTracker, ConnectionTracker, FeatureExtractor, FlowRateTracker,
    LoginAttemptTracker,
};
use std::path::Path;
use std::sync::Arc;

fn tcp_frame(src: [u8; 4], dst: [u8; 4], dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
        .ipv4(src, dst, 64)
        .tcp(50000, dst_port, 1, 64);
    let mut data = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut data, payload).unwrap();
    data
}

/// Legacy little-endian pcap with one packet per stored frame
fn write_pcap(path: &Path, frames: &[Vec<u8>]) {
    let mut buf = Vec::new();
    buf.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&4u16.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&65535u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    for (i, data) in frames.iter().enumerate() {
        let ts_sec = 1_700_000_000u32 + (i as u32 / 20);
        buf.extend_from_slice(&ts_sec.to_le_bytes());
        buf.extend_from_slice(&((i as u32 % 20) * 1000).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        buf.extend_from_slice(data);
    }
    std::fs::write(path, buf).unwrap();
}

fn detection_engine() -> Arc<DetectionEngine> {
    let config = Arc::new(EngineConfig::default());
    let extractor = Arc::new(FeatureExtractor::new(
        Arc::new(ConnectionTracker::new()),
        Arc::new(LoginAttemptTracker::default()),
        Arc::new(FlowRateTracker::default()),
        Arc::new(AccessFrequencyTracker::default()),
    ));
    Arc::new(DetectionEngine::new(
        config.clone(),
        extractor,
        AnomalyScorer::new(config.min_samples_for_training, config.anomaly_threshold),
        ClassificationScorer::disabled(),
    ))
}

#[test]
fn test_benign_capture_reports_unavailable_risk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("benign.pcap");
    write_pcap(
        &path,
        &[
            tcp_frame([10, 0, 0, 5], [10, 0, 0, 1], 80, b"GET / HTTP/1.1\r\nHost: a\r\n\r\n"),
            tcp_frame([10, 0, 0, 6], [10, 0, 0, 1], 443, b""),
            tcp_frame([10, 0, 0, 7], [10, 0, 0, 1], 22, b"SSH-2.0-OpenSSH_9.6"),
        ],
    );

    let report = BatchAnalyzer::new().analyze_file(&path).unwrap();
    assert_eq!(report.metadata.packets_processed, 3);
    assert!(report.detections.is_empty());
    assert_eq!(report.risk.score, 0.0);
    assert_eq!(report.risk.level, "low");
    assert_eq!(report.risk.risk_source, RiskSource::Unavailable);
}

#[test]
fn test_port_scan_capture_yields_heuristic_and_risk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.pcap");
    let frames: Vec<Vec<u8>> = (1..=30u16)
        .map(|port| tcp_frame([192, 168, 1, 66], [10, 0, 0, 1], port, b""))
        .collect();
    write_pcap(&path, &frames);

    let report = BatchAnalyzer::new().analyze_file(&path).unwrap();
    assert_eq!(report.metadata.packets_processed, 30);
    assert!(report
        .detections
        .iter()
        .any(|d| d.rule_id == "port_scan"));
    assert_eq!(report.risk.risk_source, RiskSource::SeverityWeighted);
    assert!(report.risk.score >= 10.0);
}

#[test]
fn test_packet_budget_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.pcap");
    let frames: Vec<Vec<u8>> = (0..50u8)
        .map(|i| tcp_frame([10, 0, 0, i], [10, 0, 0, 1], 80, b"x"))
        .collect();
    write_pcap(&path, &frames);

    let report = BatchAnalyzer::new()
        .with_packet_budget(10)
        .analyze_file(&path)
        .unwrap();
    assert_eq!(report.metadata.packets_processed, 10);
}

#[test]
fn test_replay_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repeat.pcap");
    let mut frames: Vec<Vec<u8>> = (1..=30u16)
        .map(|port| tcp_frame([192, 168, 1, 66], [10, 0, 0, 1], port, b""))
        .collect();
    frames.push(tcp_frame([10, 0, 0, 5], [10, 0, 0, 1], 80, b"GET / HTTP/1.1\r\n\r\n"));
    write_pcap(&path, &frames);

    let analyzer = BatchAnalyzer::new();
    let a = analyzer.analyze_file(&path).unwrap();
    let b = analyzer.analyze_file(&path).unwrap();

    let rules = |r: &nids_batch::AnalysisReport| {
        r.detections.iter().map(|d| d.rule_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(rules(&a), rules(&b));
    assert_eq!(a.risk.score, b.risk.score);
    assert_eq!(a.metadata.packets_processed, b.metadata.packets_processed);
    assert_eq!(a.summary.top_ports.len(), b.summary.top_ports.len());
}

#[test]
fn test_engine_detections_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attack.pcap");
    write_pcap(
        &path,
        &[
            tcp_frame([10, 0, 0, 5], [10, 0, 0, 1], 80, b"id=1 union select * from users"),
            tcp_frame([10, 0, 0, 6], [10, 0, 0, 1], 80, b"plain traffic"),
        ],
    );

    let report = BatchAnalyzer::new()
        .with_engine(detection_engine())
        .analyze_file(&path)
        .unwrap();
    assert!(report
        .detections
        .iter()
        .any(|d| d.rule_id == "sql_injection"));
    assert_eq!(report.risk.risk_source, RiskSource::SeverityWeighted);
    assert!(report.risk.score >= 10.0);
}

#[test]
fn test_summary_counters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.pcap");
    write_pcap(
        &path,
        &[
            tcp_frame(
                [10, 0, 0, 5],
                [10, 0, 0, 1],
                8081,
                b"GET /probe HTTP/1.1\r\nHost: hidden.example\r\n\r\n",
            ),
            tcp_frame([10, 0, 0, 5], [10, 0, 0, 1], 443, &[0x16, 0x03, 0x01, 0x00, 0xf4, 0x01]),
            tcp_frame([10, 0, 0, 9], [10, 0, 0, 1], 80, b"GET / HTTP/1.1\r\nHost: www.example\r\n\r\n"),
        ],
    );

    let report = BatchAnalyzer::new().analyze_file(&path).unwrap();
    let summary = &report.summary;

    assert_eq!(summary.tls_handshakes, 1);
    assert!(summary.http_hosts.contains(&"hidden.example".to_string()));
    assert!(summary.top_protocols.iter().any(|p| p.protocol == "TCP"));
    assert!(!summary.flow_samples.is_empty());
    assert!(!report.evidence.endpoint_matrix.is_empty());

    // HTTP on 8081 is flagged by the heuristics
    assert!(report
        .detections
        .iter()
        .any(|d| d.rule_id == "http_nonstandard_port"));
}
