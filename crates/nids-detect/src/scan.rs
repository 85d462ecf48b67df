//! Connection-pattern rules over a sliding packet window
//!
//! The window is bounded both by packet count and by age; both bounds are
//! configuration since their fit depends on traffic volume.

use nids_common::{Detection, DetectionKind, PacketRecord, Severity};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

const SOURCE: &str = "connection_patterns";

struct WindowEntry {
    at: Instant,
    src_ip: IpAddr,
    dst_port: u16,
}

/// Port-scan and flood detection over recent packets
pub struct ConnectionPatternDetector {
    window: Mutex<VecDeque<WindowEntry>>,
    capacity: usize,
    horizon: Duration,
    port_scan_threshold: usize,
    flood_threshold: usize,
}

impl ConnectionPatternDetector {
    pub fn new(
        capacity: usize,
        horizon: Duration,
        port_scan_threshold: usize,
        flood_threshold: usize,
    ) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            horizon,
            port_scan_threshold,
            flood_threshold,
        }
    }

    /// Record this packet and evaluate both rules for its source
    ///
    /// At most one detection per rule per call.
    pub fn analyze(&self, pkt: &PacketRecord) -> Vec<Detection> {
        let now = Instant::now();
        let mut window = self.window.lock();

        while window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(WindowEntry {
            at: now,
            src_ip: pkt.src_ip,
            dst_port: pkt.dst_port,
        });

        let mut ports: HashSet<u16> = HashSet::new();
        let mut packet_count = 0usize;
        for entry in window.iter() {
            if entry.src_ip == pkt.src_ip && now.duration_since(entry.at) <= self.horizon {
                ports.insert(entry.dst_port);
                packet_count += 1;
            }
        }
        drop(window);

        let mut detections = Vec::new();
        if ports.len() > self.port_scan_threshold {
            detections.push(
                Detection::new(
                    DetectionKind::Signature,
                    "port_scan",
                    Severity::Medium,
                    0.8,
                    format!(
                        "{} contacted {} distinct ports within the window",
                        pkt.src_ip,
                        ports.len()
                    ),
                    SOURCE,
                )
                .with_endpoints(pkt.src_ip, pkt.dst_ip, pkt.dst_port),
            );
        }
        if packet_count > self.flood_threshold {
            detections.push(
                Detection::new(
                    DetectionKind::Signature,
                    "dos_attack",
                    Severity::High,
                    0.9,
                    format!(
                        "{} sent {} packets within the window",
                        pkt.src_ip, packet_count
                    ),
                    SOURCE,
                )
                .with_endpoints(pkt.src_ip, pkt.dst_ip, pkt.dst_port),
            );
        }
        detections
    }
}

impl Default for ConnectionPatternDetector {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(60), 10, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nids_common::Protocol;

    fn packet(src: &str, dst_port: u16) -> PacketRecord {
        PacketRecord {
            timestamp: Utc::now(),
            src_ip: src.parse().unwrap(),
            dst_ip: "10.0.0.1".parse().unwrap(),
            src_port: 50000,
            dst_port,
            protocol: Protocol::Tcp,
            raw_len: 60,
            payload_len: 0,
            tcp_flags: None,
            payload: Vec::new(),
            http: None,
        }
    }

    #[test]
    fn test_port_scan_detected_at_eleven_ports() {
        let detector = ConnectionPatternDetector::default();
        let mut last = Vec::new();
        for port in 1..=11u16 {
            last = detector.analyze(&packet("10.0.0.5", port));
        }
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].rule_id, "port_scan");
        assert_eq!(last[0].severity, Severity::Medium);
    }

    #[test]
    fn test_ten_ports_is_quiet() {
        let detector = ConnectionPatternDetector::default();
        let mut last = Vec::new();
        for port in 1..=10u16 {
            last = detector.analyze(&packet("10.0.0.5", port));
        }
        assert!(last.is_empty());
    }

    #[test]
    fn test_sources_do_not_mix() {
        let detector = ConnectionPatternDetector::default();
        for port in 1..=8u16 {
            detector.analyze(&packet("10.0.0.5", port));
        }
        for port in 1..=8u16 {
            let d = detector.analyze(&packet("10.0.0.6", port + 100));
            assert!(d.is_empty());
        }
    }

    #[test]
    fn test_flood_detection() {
        let detector = ConnectionPatternDetector::default();
        let mut last = Vec::new();
        for _ in 0..101 {
            last = detector.analyze(&packet("10.0.0.5", 80));
        }
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].rule_id, "dos_attack");
        assert_eq!(last[0].confidence, 0.9);
    }

    #[test]
    fn test_capacity_bound() {
        let detector = ConnectionPatternDetector::new(50, Duration::from_secs(60), 10, 100);
        for _ in 0..80 {
            detector.analyze(&packet("10.0.0.5", 80));
        }
        assert!(detector.window.lock().len() <= 50);
    }

    #[test]
    fn test_old_entries_age_out() {
        let detector =
            ConnectionPatternDetector::new(1000, Duration::from_millis(10), 10, 100);
        for port in 1..=11u16 {
            detector.analyze(&packet("10.0.0.5", port));
        }
        std::thread::sleep(Duration::from_millis(30));
        // Window entries are stale; a single new packet sees only itself
        let d = detector.analyze(&packet("10.0.0.5", 9999));
        assert!(d.is_empty());
    }
}
