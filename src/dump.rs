//! Diagnostic rendering of raw frames
//!
//! Everything here is read-only over the frame bytes and returns the
//! rendered lines instead of printing them, so the output depends only on
//! the buffer, the length and the enabled toggles.

use crate::network::arp::{ArpPacket, ARP_REPLY, ARP_REQUEST};
use crate::network::ethernet::{EthernetFrame, ETH_TYPE_ARP, ETH_TYPE_IPV4};
use crate::network::ipv4::{protocol, Ipv4Header};
use crate::network::{fmt_ip, fmt_mac};

/// Bytes per hex dump line
const HEX_LINE_LEN: usize = 16;

/// Per-protocol dump toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpConfig {
    pub eth: bool,
    pub arp: bool,
    pub ip: bool,
}

impl DumpConfig {
    pub const ALL: DumpConfig = DumpConfig {
        eth: true,
        arp: true,
        ip: true,
    };

    pub const NONE: DumpConfig = DumpConfig {
        eth: false,
        arp: false,
        ip: false,
    };
}

impl Default for DumpConfig {
    fn default() -> Self {
        DumpConfig::ALL
    }
}

/// Render the protocol summary of the first `length` bytes of `buffer`
///
/// Layers whose header does not fit in the available bytes are skipped.
pub fn dump(buffer: &[u8], length: usize, config: &DumpConfig) -> Vec<String> {
    let frame_bytes = &buffer[..length.min(buffer.len())];
    let mut lines = Vec::new();

    let frame = match EthernetFrame::from_bytes(frame_bytes) {
        Some(frame) => frame,
        None => return lines,
    };

    if config.eth {
        lines.push(dump_eth(&frame));
    }

    match frame.ether_type() {
        ETH_TYPE_ARP if config.arp => {
            if let Some(arp) = ArpPacket::from_bytes(frame.payload()) {
                lines.push(dump_arp(&arp));
            }
        }
        ETH_TYPE_IPV4 if config.ip => {
            if let Some(ip) = Ipv4Header::from_bytes(frame.payload()) {
                lines.push(dump_ip(&ip));
            }
        }
        _ => {}
    }

    lines
}

fn dump_eth(frame: &EthernetFrame) -> String {
    format!(
        "[{:04x},{:04x},{}>{}]",
        frame.len(),
        frame.ether_type(),
        fmt_mac(&frame.src_mac()),
        fmt_mac(&frame.dst_mac())
    )
}

fn dump_arp(arp: &ArpPacket) -> String {
    let op = match arp.operation() {
        ARP_REQUEST => "REQ ".to_string(),
        ARP_REPLY => "REPL".to_string(),
        other => format!("{:04x}", other),
    };
    format!(
        "[ARP:{},({},{})>({},{})]",
        op,
        fmt_mac(&arp.src_mac()),
        fmt_ip(&arp.src_ip()),
        fmt_mac(&arp.tgt_mac()),
        fmt_ip(&arp.tgt_ip())
    )
}

fn dump_ip(ip: &Ipv4Header) -> String {
    let proto = match ip.protocol() {
        protocol::ICMP => "ICMP".to_string(),
        protocol::TCP => "TCP ".to_string(),
        protocol::UDP => "UDP ".to_string(),
        other => format!("{:04x}", other),
    };
    format!(
        "[IP4:{:04x},{},{}>{}]",
        ip.total_len(),
        proto,
        fmt_ip(&ip.src_addr()),
        fmt_ip(&ip.dst_addr())
    )
}

/// Hex dump of the first `length` bytes of `buffer`
///
/// Starts with a `packet: <dec>/$<hex>` line followed by offset-prefixed
/// lines of up to 16 bytes.
pub fn hex_dump(buffer: &[u8], length: usize) -> Vec<String> {
    let data = &buffer[..length.min(buffer.len())];
    let mut lines = vec![format!("packet: {}/${:x}", length, length)];
    for (i, chunk) in data.chunks(HEX_LINE_LEN).enumerate() {
        let bytes: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        lines.push(format!("{:08x}: {}", i * HEX_LINE_LEN, bytes));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::icmp::build_ping_request;

    const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

    fn arp_request() -> Vec<u8> {
        let mut frame = Vec::with_capacity(42);
        frame.extend_from_slice(&[0xff; 6]);
        frame.extend_from_slice(&SRC_MAC);
        frame.extend_from_slice(&[0x08, 0x06]);
        frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01]);
        frame.extend_from_slice(&SRC_MAC);
        frame.extend_from_slice(&[10, 0, 0, 1]);
        frame.extend_from_slice(&[0; 6]);
        frame.extend_from_slice(&[10, 0, 0, 2]);
        frame
    }

    fn ping_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 128];
        frame[0..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        frame[6..12].copy_from_slice(&SRC_MAC);
        frame[12..14].copy_from_slice(&[0x08, 0x00]);
        let len = build_ping_request(&mut frame[14..], [10, 0, 0, 1], [10, 0, 0, 2], 1, 1).unwrap();
        frame.truncate(14 + len);
        frame
    }

    #[test]
    fn test_arp_request_dump() {
        let frame = arp_request();
        let lines = dump(&frame, frame.len(), &DumpConfig::ALL);
        assert_eq!(
            lines,
            vec![
                "[002a,0806,02:00:00:00:00:01>ff:ff:ff:ff:ff:ff]".to_string(),
                "[ARP:REQ ,(02:00:00:00:00:01,10.0.0.1)>(00:00:00:00:00:00,10.0.0.2)]".to_string(),
            ]
        );
    }

    #[test]
    fn test_arp_operation_fallbacks() {
        let mut frame = arp_request();
        frame[21] = 2;
        let lines = dump(&frame, frame.len(), &DumpConfig::ALL);
        assert!(lines[1].starts_with("[ARP:REPL,"));

        frame[21] = 9;
        let lines = dump(&frame, frame.len(), &DumpConfig::ALL);
        assert!(lines[1].starts_with("[ARP:0009,"));
    }

    #[test]
    fn test_ip_dump() {
        let frame = ping_frame();
        let config = DumpConfig {
            eth: false,
            arp: false,
            ip: true,
        };
        let lines = dump(&frame, frame.len(), &config);
        assert_eq!(lines, vec!["[IP4:003c,ICMP,10.0.0.1>10.0.0.2]".to_string()]);
    }

    #[test]
    fn test_all_disabled_is_silent() {
        assert!(dump(&arp_request(), 42, &DumpConfig::NONE).is_empty());
        assert!(dump(&ping_frame(), 74, &DumpConfig::NONE).is_empty());
    }

    #[test]
    fn test_arp_only_on_ip_frame() {
        let frame = ping_frame();
        let config = DumpConfig {
            eth: false,
            arp: true,
            ip: false,
        };
        assert!(dump(&frame, frame.len(), &config).is_empty());

        let config = DumpConfig {
            eth: true,
            arp: true,
            ip: false,
        };
        let lines = dump(&frame, frame.len(), &config);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[004a,0800,"));
    }

    #[test]
    fn test_truncated_frames_do_not_overrun() {
        // ten bytes cannot even hold the Ethernet header
        let mut tiny = [0u8; 10];
        tiny[..].copy_from_slice(&ping_frame()[..10]);
        assert!(dump(&tiny, tiny.len(), &DumpConfig::ALL).is_empty());

        // Ethernet header plus ten bytes of claimed IPv4
        let frame = ping_frame();
        let lines = dump(&frame, 24, &DumpConfig::ALL);
        assert_eq!(lines, vec!["[0018,0800,02:00:00:00:00:01>02:00:00:00:00:02]".to_string()]);

        // ARP cut short
        let frame = arp_request();
        let lines = dump(&frame, 30, &DumpConfig::ALL);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_length_beyond_buffer_is_clamped() {
        let frame = arp_request();
        let lines = dump(&frame, 4096, &DumpConfig::ALL);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[002a,"));
    }

    #[test]
    fn test_hex_dump() {
        let data: Vec<u8> = (0u8..20).collect();
        let lines = hex_dump(&data, data.len());
        assert_eq!(lines[0], "packet: 20/$14");
        assert_eq!(
            lines[1],
            "00000000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f "
        );
        assert_eq!(lines[2], "00000010: 10 11 12 13 ");
        assert_eq!(lines.len(), 3);
    }
}
