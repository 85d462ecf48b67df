//! Offline PCAP replay
//!
//! One pass over the capture builds the traffic summary, the flow
//! aggregates, and (when an engine is attached) the per-packet detections.
//! Heuristic findings and ML detections are merged, deduplicated, and
//! reduced to a single risk score.

use crate::heuristics::FlowAggregates;
use crate::report::{
    AnalysisReport, CaptureWindow, EndpointEdge, Evidence, FlowSample, Metadata, PortCount,
    ProtocolCount, Summary, TalkerEntry, TimelineBucket,
};
use crate::risk::compute_risk;
use chrono::{DateTime, Utc};
use nids_capture::{FileSource, PacketSource, SourcePoll};
use nids_common::{Detection, FlowKey, Protocol, Result};
use nids_decode::{decode_frame, looks_like_tls_client_hello, sniff_dns_queries};
use nids_detect::{Classification, DetectionEngine};
use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Default replay budget, in packets
pub const DEFAULT_PACKET_BUDGET: usize = 2000;

const TOP_PROTOCOLS: usize = 5;
const TOP_TALKERS: usize = 10;
const TOP_PORTS: usize = 10;
const MAX_DNS_QUERIES: usize = 50;
const MAX_HTTP_HOSTS: usize = 20;
const MAX_FLOW_SAMPLES: usize = 20;
const MAX_TIMELINE_BUCKETS: usize = 600;
const MAX_ENDPOINT_EDGES: usize = 20;

const PCAP_MAGIC_LE: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];
const PCAP_MAGIC_BE: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// Bounded offline analyzer sharing the live decode/detect core
pub struct BatchAnalyzer {
    engine: Option<Arc<DetectionEngine>>,
    packet_budget: usize,
}

impl BatchAnalyzer {
    pub fn new() -> Self {
        Self { engine: None, packet_budget: DEFAULT_PACKET_BUDGET }
    }

    /// Attach the per-packet detection engine
    pub fn with_engine(mut self, engine: Arc<DetectionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Override the packet budget
    pub fn with_packet_budget(mut self, budget: usize) -> Self {
        self.packet_budget = budget.max(1);
        self
    }

    /// Replay a capture file
    pub fn analyze_file(&self, path: &Path) -> Result<AnalysisReport> {
        check_magic(path)?;
        let source = FileSource::open(path)?;
        self.analyze_source(Box::new(source))
    }

    /// Replay any packet source up to the budget
    pub fn analyze_source(&self, mut source: Box<dyn PacketSource>) -> Result<AnalysisReport> {
        let started = Instant::now();

        let mut aggregates = FlowAggregates::new();
        let mut detections: Vec<Detection> = Vec::new();
        let mut classifications: Vec<Classification> = Vec::new();

        let mut packets = 0u64;
        let mut bytes = 0u64;
        let mut skipped = 0u64;
        let mut first_ts: Option<DateTime<Utc>> = None;
        let mut last_ts: Option<DateTime<Utc>> = None;

        let mut protocols: HashMap<String, u64> = HashMap::new();
        let mut talkers: HashMap<IpAddr, (u64, u64)> = HashMap::new();
        let mut ports: HashMap<u16, u64> = HashMap::new();
        let mut flows: HashMap<FlowKey, (u64, u64)> = HashMap::new();
        let mut edges: HashMap<(IpAddr, IpAddr), (u64, u64)> = HashMap::new();
        let mut timeline: HashMap<u64, (u64, u64)> = HashMap::new();
        let mut dns_queries: BTreeSet<String> = BTreeSet::new();
        let mut http_hosts: BTreeSet<String> = BTreeSet::new();
        let mut tls_handshakes = 0u64;

        while (packets as usize) < self.packet_budget {
            let frame = match source.next_frame()? {
                SourcePoll::Frame(frame) => frame,
                SourcePoll::TimedOut => continue,
                SourcePoll::Exhausted => break,
            };
            let pkt = match decode_frame(&frame.data, frame.ts) {
                Ok(pkt) => pkt,
                Err(e) => {
                    tracing::trace!(error = %e, "skipping undecodable frame");
                    skipped += 1;
                    continue;
                }
            };

            packets += 1;
            bytes += pkt.raw_len as u64;
            first_ts.get_or_insert(pkt.timestamp);
            last_ts = Some(pkt.timestamp);

            *protocols.entry(pkt.protocol.to_string()).or_default() += 1;
            let talker = talkers.entry(pkt.src_ip).or_default();
            talker.0 += 1;
            talker.1 += pkt.raw_len as u64;
            if pkt.dst_port != 0 {
                *ports.entry(pkt.dst_port).or_default() += 1;
            }
            let flow = flows.entry(pkt.flow_key()).or_default();
            flow.0 += 1;
            flow.1 += pkt.raw_len as u64;
            let edge = edges.entry((pkt.src_ip, pkt.dst_ip)).or_default();
            edge.0 += 1;
            edge.1 += pkt.raw_len as u64;

            if let Some(start) = first_ts {
                let offset = (pkt.timestamp - start).num_seconds().max(0) as u64;
                if timeline.len() < MAX_TIMELINE_BUCKETS || timeline.contains_key(&offset) {
                    let bucket = timeline.entry(offset).or_default();
                    bucket.0 += 1;
                    bucket.1 += pkt.raw_len as u64;
                }
            }

            if pkt.protocol == Protocol::Udp && pkt.dst_port == 53 {
                for name in sniff_dns_queries(&pkt.payload) {
                    if dns_queries.len() < MAX_DNS_QUERIES {
                        dns_queries.insert(name);
                    }
                }
            }
            if pkt.protocol == Protocol::Tcp && looks_like_tls_client_hello(&pkt.payload) {
                tls_handshakes += 1;
            }
            if let Some(host) = pkt.http.as_ref().and_then(|h| h.host.clone()) {
                if http_hosts.len() < MAX_HTTP_HOSTS {
                    http_hosts.insert(host);
                }
            }

            aggregates.observe(&pkt);

            if let Some(engine) = &self.engine {
                let analysis = engine.analyze_detailed(&pkt);
                detections.extend(analysis.detections);
                if let Some(c) = analysis.classification {
                    classifications.push(c);
                }
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, "frames skipped during replay");
        }

        detections.extend(aggregates.findings());
        let merged = dedup_detections(detections);
        let risk = compute_risk(&merged, &classifications);

        let duration_seconds = match (first_ts, last_ts) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };

        let timeline = to_timeline(timeline);
        Ok(AnalysisReport {
            metadata: Metadata {
                packets_processed: packets,
                bytes_processed: bytes,
                processing_time_ms: started.elapsed().as_millis() as u64,
                duration_seconds,
                capture_window: CaptureWindow { start: first_ts, end: last_ts },
            },
            summary: Summary {
                top_protocols: top_protocols(protocols),
                top_talkers: top_talkers(talkers),
                top_ports: top_ports(ports),
                dns_queries: dns_queries.into_iter().collect(),
                tls_handshakes,
                http_hosts: http_hosts.into_iter().collect(),
                flow_samples: flow_samples(flows),
                timeline: timeline.clone(),
            },
            detections: merged,
            risk,
            evidence: Evidence { timeline, endpoint_matrix: endpoint_matrix(edges) },
        })
    }
}

impl Default for BatchAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Magic-byte validation: a mismatch is logged, not fatal, because some
/// producers write unusual but readable variants
fn check_magic(path: &Path) -> Result<()> {
    let mut magic = [0u8; 4];
    let mut file = std::fs::File::open(path)?;
    use std::io::Read;
    match file.read_exact(&mut magic) {
        Ok(()) => {
            if magic != PCAP_MAGIC_LE && magic != PCAP_MAGIC_BE && magic != PCAPNG_MAGIC {
                tracing::warn!(
                    path = %path.display(),
                    magic = ?magic,
                    "unrecognized capture magic; attempting to parse anyway"
                );
            }
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), "capture file shorter than a header");
        }
    }
    Ok(())
}

/// Keep the first of each (rule, severity, source, destination), ordered by
/// severity then rule id for stable output
fn dedup_detections(detections: Vec<Detection>) -> Vec<Detection> {
    let mut seen: BTreeSet<(String, String, String, String)> = BTreeSet::new();
    let mut merged: Vec<Detection> = Vec::new();
    for det in detections {
        let key = (
            det.rule_id.clone(),
            det.severity.to_string(),
            det.src_ip.map(|ip| ip.to_string()).unwrap_or_default(),
            det.dst_ip.map(|ip| ip.to_string()).unwrap_or_default(),
        );
        if seen.insert(key) {
            merged.push(det);
        }
    }
    merged.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
    merged
}

fn top_protocols(counts: HashMap<String, u64>) -> Vec<ProtocolCount> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
        .into_iter()
        .take(TOP_PROTOCOLS)
        .map(|(protocol, packets)| ProtocolCount { protocol, packets })
        .collect()
}

fn top_talkers(counts: HashMap<IpAddr, (u64, u64)>) -> Vec<TalkerEntry> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then_with(|| a.0.cmp(&b.0)));
    entries
        .into_iter()
        .take(TOP_TALKERS)
        .map(|(ip, (packets, bytes))| TalkerEntry { ip, packets, bytes })
        .collect()
}

fn top_ports(counts: HashMap<u16, u64>) -> Vec<PortCount> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
        .into_iter()
        .take(TOP_PORTS)
        .map(|(port, packets)| PortCount { port, packets })
        .collect()
}

fn flow_samples(flows: HashMap<FlowKey, (u64, u64)>) -> Vec<FlowSample> {
    let mut entries: Vec<_> = flows.into_iter().collect();
    entries.sort_by(|a, b| {
        b.1 .1
            .cmp(&a.1 .1)
            .then_with(|| a.0.to_string().cmp(&b.0.to_string()))
    });
    entries
        .into_iter()
        .take(MAX_FLOW_SAMPLES)
        .map(|(key, (packets, bytes))| FlowSample {
            src_ip: key.src_ip,
            dst_ip: key.dst_ip,
            dst_port: key.dst_port,
            packets,
            bytes,
        })
        .collect()
}

fn endpoint_matrix(edges: HashMap<(IpAddr, IpAddr), (u64, u64)>) -> Vec<EndpointEdge> {
    let mut entries: Vec<_> = edges.into_iter().collect();
    entries.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then_with(|| a.0.cmp(&b.0)));
    entries
        .into_iter()
        .take(MAX_ENDPOINT_EDGES)
        .map(|((src_ip, dst_ip), (packets, bytes))| EndpointEdge {
            src_ip,
            dst_ip,
            packets,
            bytes,
        })
        .collect()
}

fn to_timeline(buckets: HashMap<u64, (u64, u64)>) -> Vec<TimelineBucket> {
    let mut entries: Vec<_> = buckets.into_iter().collect();
    entries.sort_by_key(|(offset, _)| *offset);
    entries
        .into_iter()
        .map(|(offset_secs, (packets, bytes))| TimelineBucket { offset_secs, packets, bytes })
        .collect()
}
