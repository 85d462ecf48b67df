//! Flow-level heuristics over aggregate counters
//!
//! Built in the single replay pass and evaluated once at the end, these
//! catch patterns that per-packet rules cannot see.

use nids_common::{Detection, DetectionKind, PacketRecord, Protocol, Severity};
use nids_decode::{shannon_entropy, sniff_dns_queries};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

const SOURCE: &str = "flow_heuristics";

/// Unique destination ports from one source before it counts as a scan
const PORT_SCAN_PORTS: usize = 25;

/// SYN-only packets on one (src, dst) pair before it counts as a flood
const SYN_FLOOD_PACKETS: u64 = 400;

/// DNS queries per source before tunneling is considered
const DNS_TUNNEL_QUERIES: usize = 10;

/// Query names longer than this are tunneling candidates
const DNS_TUNNEL_NAME_LEN: usize = 50;

/// How many long names make the tunneling verdict
const DNS_TUNNEL_LONG_NAMES: usize = 2;

/// Entropy above this on a non-standard port is suspicious
const ENTROPY_THRESHOLD: f64 = 7.5;

/// Payload bytes required before entropy is meaningful
const ENTROPY_MIN_BYTES: usize = 32;

/// Ports where high-entropy payloads are expected
const ENTROPY_EXEMPT_PORTS: [u16; 3] = [80, 443, 53];

/// Ports where HTTP is expected
const HTTP_STANDARD_PORTS: [u16; 3] = [80, 8080, 443];

#[derive(Default)]
struct SourceDns {
    queries: usize,
    long_names: usize,
}

/// Aggregate counters accumulated while iterating a capture once
#[derive(Default)]
pub struct FlowAggregates {
    ports_per_source: HashMap<IpAddr, HashSet<u16>>,
    syn_only_per_pair: HashMap<(IpAddr, IpAddr), u64>,
    dns_per_source: HashMap<IpAddr, SourceDns>,
    entropy_flows: HashMap<(IpAddr, IpAddr, u16), f64>,
    http_nonstd: HashSet<(IpAddr, IpAddr, u16)>,
}

impl FlowAggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded packet into the counters
    pub fn observe(&mut self, pkt: &PacketRecord) {
        self.ports_per_source
            .entry(pkt.src_ip)
            .or_default()
            .insert(pkt.dst_port);

        if pkt.tcp_flags.map(|f| f.is_syn_only()).unwrap_or(false) {
            *self
                .syn_only_per_pair
                .entry((pkt.src_ip, pkt.dst_ip))
                .or_default() += 1;
        }

        if pkt.protocol == Protocol::Udp && pkt.dst_port == 53 {
            let entry = self.dns_per_source.entry(pkt.src_ip).or_default();
            for name in sniff_dns_queries(&pkt.payload) {
                entry.queries += 1;
                if name.len() > DNS_TUNNEL_NAME_LEN {
                    entry.long_names += 1;
                }
            }
        }

        if pkt.payload.len() >= ENTROPY_MIN_BYTES
            && !ENTROPY_EXEMPT_PORTS.contains(&pkt.dst_port)
        {
            let entropy = shannon_entropy(&pkt.payload);
            if entropy > ENTROPY_THRESHOLD {
                let slot = self
                    .entropy_flows
                    .entry((pkt.src_ip, pkt.dst_ip, pkt.dst_port))
                    .or_insert(entropy);
                if entropy > *slot {
                    *slot = entropy;
                }
            }
        }

        if pkt.http.is_some() && !HTTP_STANDARD_PORTS.contains(&pkt.dst_port) {
            self.http_nonstd
                .insert((pkt.src_ip, pkt.dst_ip, pkt.dst_port));
        }
    }

    /// Evaluate every heuristic against the final counters
    pub fn findings(&self) -> Vec<Detection> {
        let mut findings = Vec::new();

        let mut scanners: Vec<_> = self
            .ports_per_source
            .iter()
            .filter(|(_, ports)| ports.len() >= PORT_SCAN_PORTS)
            .collect();
        scanners.sort_by_key(|(ip, _)| **ip);
        for (ip, ports) in scanners {
            findings.push(
                Detection::new(
                    DetectionKind::Heuristic,
                    "port_scan",
                    Severity::Medium,
                    0.8,
                    format!("{ip} probed {} distinct destination ports", ports.len()),
                    SOURCE,
                )
                .with_source_ip(*ip),
            );
        }

        let mut floods: Vec<_> = self
            .syn_only_per_pair
            .iter()
            .filter(|(_, count)| **count >= SYN_FLOOD_PACKETS)
            .collect();
        floods.sort_by_key(|((src, dst), _)| (*src, *dst));
        for ((src, dst), count) in floods {
            let mut det = Detection::new(
                DetectionKind::Heuristic,
                "syn_flood",
                Severity::High,
                0.9,
                format!("{count} SYN-only packets from {src} to {dst}"),
                SOURCE,
            )
            .with_source_ip(*src);
            det.dst_ip = Some(*dst);
            findings.push(det);
        }

        let mut tunnels: Vec<_> = self
            .dns_per_source
            .iter()
            .filter(|(_, dns)| {
                dns.queries > DNS_TUNNEL_QUERIES && dns.long_names >= DNS_TUNNEL_LONG_NAMES
            })
            .collect();
        tunnels.sort_by_key(|(ip, _)| **ip);
        for (ip, dns) in tunnels {
            findings.push(
                Detection::new(
                    DetectionKind::Heuristic,
                    "dns_tunneling",
                    Severity::High,
                    0.8,
                    format!(
                        "{ip} issued {} DNS queries, {} with names over {} chars",
                        dns.queries, dns.long_names, DNS_TUNNEL_NAME_LEN
                    ),
                    SOURCE,
                )
                .with_source_ip(*ip),
            );
        }

        let mut entropy: Vec<_> = self.entropy_flows.iter().collect();
        entropy.sort_by_key(|((src, dst, port), _)| (*src, *dst, *port));
        for ((src, dst, port), max_entropy) in entropy {
            let mut det = Detection::new(
                DetectionKind::Heuristic,
                "high_entropy_payload",
                Severity::Medium,
                0.7,
                format!(
                    "entropy {max_entropy:.2} bits/byte toward {dst}:{port}, outside common encrypted ports"
                ),
                SOURCE,
            )
            .with_source_ip(*src);
            det.dst_ip = Some(*dst);
            det.dst_port = Some(*port);
            findings.push(det);
        }

        let mut http: Vec<_> = self.http_nonstd.iter().collect();
        http.sort();
        for (src, dst, port) in http {
            let mut det = Detection::new(
                DetectionKind::Heuristic,
                "http_nonstandard_port",
                Severity::Low,
                0.7,
                format!("HTTP-like requests from {src} to {dst}:{port}"),
                SOURCE,
            )
            .with_source_ip(*src);
            det.dst_ip = Some(*dst);
            det.dst_port = Some(*port);
            findings.push(det);
        }

        findings
    }
}
