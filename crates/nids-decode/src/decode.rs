//! Frame decoding via etherparse

use crate::http::sniff_http_request;
use chrono::{DateTime, Utc};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use nids_common::packet::PAYLOAD_SAMPLE_LEN;
use nids_common::{PacketRecord, Protocol, TcpFlags};
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

const ETHERTYPE_ARP: u16 = 0x0806;

/// Why a frame could not be decoded
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame too short: {0} bytes")]
    Truncated(usize),

    #[error("unsupported link layer")]
    UnsupportedLink,

    #[error("slice error: {0}")]
    Slice(String),
}

/// Decode one Ethernet frame into a `PacketRecord`
///
/// Protocol numbers we do not track normalize to `Other(n)`; HTTP fields
/// are extracted only when they are trivially there.
pub fn decode_frame(data: &[u8], ts: DateTime<Utc>) -> Result<PacketRecord, DecodeError> {
    if data.len() < 14 {
        return Err(DecodeError::Truncated(data.len()));
    }

    // ARP is not sliced by etherparse; recognize it by ethertype
    let ethertype = u16::from_be_bytes([data[12], data[13]]);
    if ethertype == ETHERTYPE_ARP {
        return decode_arp(data, ts);
    }

    let sliced =
        SlicedPacket::from_ethernet(data).map_err(|e| DecodeError::Slice(e.to_string()))?;

    let (src_ip, dst_ip, ip_number, is_v6) = match &sliced.net {
        Some(NetSlice::Ipv4(v4)) => {
            let header = v4.header();
            (
                IpAddr::V4(header.source_addr()),
                IpAddr::V4(header.destination_addr()),
                header.protocol().0,
                false,
            )
        }
        Some(NetSlice::Ipv6(v6)) => {
            let header = v6.header();
            (
                IpAddr::V6(header.source_addr()),
                IpAddr::V6(header.destination_addr()),
                header.next_header().0,
                true,
            )
        }
        None => return Err(DecodeError::UnsupportedLink),
    };

    let mut src_port = 0u16;
    let mut dst_port = 0u16;
    let mut tcp_flags = None;
    let mut payload: &[u8] = &[];

    let protocol = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            src_port = tcp.source_port();
            dst_port = tcp.destination_port();
            tcp_flags = Some(TcpFlags {
                syn: tcp.syn(),
                ack: tcp.ack(),
                fin: tcp.fin(),
                rst: tcp.rst(),
                psh: tcp.psh(),
                urg: tcp.urg(),
            });
            payload = tcp.payload();
            Protocol::Tcp
        }
        Some(TransportSlice::Udp(udp)) => {
            src_port = udp.source_port();
            dst_port = udp.destination_port();
            payload = udp.payload();
            Protocol::Udp
        }
        Some(TransportSlice::Icmpv4(icmp)) => {
            payload = icmp.payload();
            Protocol::Icmp
        }
        Some(TransportSlice::Icmpv6(icmp)) => {
            payload = icmp.payload();
            Protocol::Icmpv6
        }
        None => normalize_ip_number(ip_number, is_v6),
    };

    let payload_len = payload.len();
    let sample = payload[..payload_len.min(PAYLOAD_SAMPLE_LEN)].to_vec();

    let http = if protocol == Protocol::Tcp {
        sniff_http_request(&sample)
    } else {
        None
    };

    Ok(PacketRecord {
        timestamp: ts,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
        raw_len: data.len(),
        payload_len,
        tcp_flags,
        payload: sample,
        http,
    })
}

/// Protocol numbers without a parsed transport header
fn normalize_ip_number(n: u8, is_v6: bool) -> Protocol {
    match (n, is_v6) {
        (1, false) => Protocol::Icmp,
        (58, true) => Protocol::Icmpv6,
        (_, true) => Protocol::Ipv6,
        (n, false) => Protocol::Other(n),
    }
}

/// Ethernet ARP: sender IP at offset 28, target IP at offset 38
fn decode_arp(data: &[u8], ts: DateTime<Utc>) -> Result<PacketRecord, DecodeError> {
    if data.len() < 42 {
        return Err(DecodeError::Truncated(data.len()));
    }
    let src_ip = IpAddr::V4(Ipv4Addr::new(data[28], data[29], data[30], data[31]));
    let dst_ip = IpAddr::V4(Ipv4Addr::new(data[38], data[39], data[40], data[41]));

    Ok(PacketRecord {
        timestamp: ts,
        src_ip,
        dst_ip,
        src_port: 0,
        dst_port: 0,
        protocol: Protocol::Arp,
        raw_len: data.len(),
        payload_len: 0,
        tcp_flags: None,
        payload: Vec::new(),
        http: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn decode(data: &[u8]) -> PacketRecord {
        decode_frame(data, Utc::now()).unwrap()
    }

    #[test]
    fn test_tcp_frame() {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([192, 168, 1, 10], [10, 0, 0, 1], 64)
            .tcp(51000, 80, 1000, 64)
            .syn();
        let payload = b"GET /index.html HTTP/1.1\r\nUser-Agent: curl/8.0\r\n\r\n";
        let mut data = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut data, payload).unwrap();

        let pkt = decode(&data);
        assert_eq!(pkt.protocol, Protocol::Tcp);
        assert_eq!(pkt.src_port, 51000);
        assert_eq!(pkt.dst_port, 80);
        assert!(pkt.tcp_flags.unwrap().syn);
        assert_eq!(pkt.payload_len, payload.len());

        let http = pkt.http.expect("http request line should be sniffed");
        assert_eq!(http.method.as_deref(), Some("GET"));
        assert_eq!(http.uri.as_deref(), Some("/index.html"));
        assert_eq!(http.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_udp_frame() {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([192, 168, 1, 10], [8, 8, 8, 8], 64)
            .udp(33000, 53);
        let payload = [0u8; 24];
        let mut data = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut data, &payload).unwrap();

        let pkt = decode(&data);
        assert_eq!(pkt.protocol, Protocol::Udp);
        assert_eq!(pkt.dst_port, 53);
        assert!(pkt.http.is_none());
    }

    #[test]
    fn test_payload_sample_is_bounded() {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([192, 168, 1, 10], [10, 0, 0, 1], 64)
            .tcp(51000, 9000, 1000, 64);
        let payload = vec![0x41u8; 400];
        let mut data = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut data, &payload).unwrap();

        let pkt = decode(&data);
        assert_eq!(pkt.payload_len, 400);
        assert_eq!(pkt.payload.len(), PAYLOAD_SAMPLE_LEN);
    }

    #[test]
    fn test_arp_frame() {
        let mut data = vec![0u8; 42];
        data[12] = 0x08;
        data[13] = 0x06;
        data[28..32].copy_from_slice(&[192, 168, 1, 1]);
        data[38..42].copy_from_slice(&[192, 168, 1, 2]);

        let pkt = decode(&data);
        assert_eq!(pkt.protocol, Protocol::Arp);
        assert_eq!(pkt.src_ip.to_string(), "192.168.1.1");
    }

    #[test]
    fn test_short_frame_is_skippable() {
        let err = decode_frame(&[0u8; 5], Utc::now()).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated(5)));
    }

    #[test]
    fn test_ipv6_icmpv6() {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv6([1u8; 16], [2u8; 16], 64)
            .icmpv6_echo_request(1, 1);
        let mut data = Vec::with_capacity(builder.size(0));
        builder.write(&mut data, &[]).unwrap();

        let pkt = decode(&data);
        assert_eq!(pkt.protocol, Protocol::Icmpv6);
    }
}
