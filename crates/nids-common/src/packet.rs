//! Decoded packet records and flow identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// How many payload bytes a record keeps for inspection
pub const PAYLOAD_SAMPLE_LEN: usize = 100;

/// Normalized L3/L4 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// TCP over IPv4 or IPv6
    Tcp,
    /// UDP over IPv4 or IPv6
    Udp,
    /// ICMPv4
    Icmp,
    /// ARP frame
    Arp,
    /// IPv6 with an untracked next header
    Ipv6,
    /// ICMPv6
    Icmpv6,
    /// Anything else, by IP protocol number
    Other(u8),
}

impl Protocol {
    /// Stable integer encoding used as the `protocol_type` feature
    pub fn encoded(&self) -> f64 {
        match self {
            Protocol::Tcp => 1.0,
            Protocol::Udp => 2.0,
            Protocol::Icmp => 3.0,
            Protocol::Arp => 4.0,
            Protocol::Ipv6 => 5.0,
            Protocol::Icmpv6 => 6.0,
            Protocol::Other(_) => 0.0,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Arp => write!(f, "ARP"),
            Protocol::Ipv6 => write!(f, "IPV6"),
            Protocol::Icmpv6 => write!(f, "ICMPV6"),
            Protocol::Other(n) => write!(f, "Protocol-{}", n),
        }
    }
}

/// TCP header flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
}

impl TcpFlags {
    /// True for the bare SYN that opens a handshake
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack
    }
}

/// Opportunistically parsed HTTP request fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHints {
    pub method: Option<String>,
    pub uri: Option<String>,
    pub user_agent: Option<String>,
    pub host: Option<String>,
}

impl HttpHints {
    /// True if nothing was extracted
    pub fn is_empty(&self) -> bool {
        self.method.is_none()
            && self.uri.is_none()
            && self.user_agent.is_none()
            && self.host.is_none()
    }
}

/// One decoded frame
///
/// Immutable once built; consumed by the tracker, extractor and detectors,
/// then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Source address
    pub src_ip: IpAddr,
    /// Destination address
    pub dst_ip: IpAddr,
    /// Source port (0 when the protocol has none)
    pub src_port: u16,
    /// Destination port (0 when the protocol has none)
    pub dst_port: u16,
    /// Normalized protocol
    pub protocol: Protocol,
    /// Frame size on the wire
    pub raw_len: usize,
    /// Application payload size
    pub payload_len: usize,
    /// TCP flags, when TCP
    pub tcp_flags: Option<TcpFlags>,
    /// First bytes of the application payload
    pub payload: Vec<u8>,
    /// Best-effort HTTP request fields
    pub http: Option<HttpHints>,
}

impl PacketRecord {
    /// Flow identity of this packet
    pub fn flow_key(&self) -> FlowKey {
        FlowKey {
            src_ip: self.src_ip,
            dst_ip: self.dst_ip,
            dst_port: self.dst_port,
        }
    }

    /// Payload as lossy lowercase text for pattern rules
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).to_lowercase()
    }
}

/// Connection identity: one logical flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.src_ip, self.dst_ip, self.dst_port)
    }
}
