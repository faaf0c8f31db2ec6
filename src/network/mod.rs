//! Protocol header access
//!
//! Byte-offset accessors for the headers the dumper and the ICMP helpers
//! understand:
//! - Ethernet II frames
//! - ARP for IPv4 over Ethernet
//! - IPv4
//! - ICMP echo
//!
//! Multi-byte fields are always decoded big-endian and explicitly; no header
//! is ever overlaid on the buffer as a struct.

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;

use byteorder::{BigEndian, ByteOrder};

pub use arp::{ArpPacket, ARP_REPLY, ARP_REQUEST};
pub use ethernet::{EthernetFrame, ETH_HDR_SIZE, ETH_TYPE_ARP, ETH_TYPE_IPV4};
pub use ipv4::{protocol, Ipv4Header};

/// Length of an Ethernet hardware address
pub const MAC_LEN: usize = 6;
/// Length of an IPv4 address
pub const IP_LEN: usize = 4;

pub const MAC_BROADCAST: [u8; MAC_LEN] = [0xff; MAC_LEN];
pub const MAC_ZERO: [u8; MAC_LEN] = [0; MAC_LEN];

/// Read a 16-bit big-endian word at the start of `buf`
pub fn get_word(buf: &[u8]) -> u16 {
    BigEndian::read_u16(buf)
}

/// Write a 16-bit big-endian word at the start of `buf`
pub fn put_word(buf: &mut [u8], value: u16) {
    BigEndian::write_u16(buf, value)
}

/// Read a 32-bit big-endian long at the start of `buf`
pub fn get_long(buf: &[u8]) -> u32 {
    BigEndian::read_u32(buf)
}

/// Write a 32-bit big-endian long at the start of `buf`
pub fn put_long(buf: &mut [u8], value: u32) {
    BigEndian::write_u32(buf, value)
}

/// Copy a fixed-width address out of `buf` at `offset`
pub fn read_addr<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}

/// Format a hardware address as `aa:bb:cc:dd:ee:ff`
pub fn fmt_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Format an IPv4 address in dotted decimal
pub fn fmt_ip(ip: &[u8]) -> String {
    ip.iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Calculate Internet checksum
///
/// Algorithm: Sum data in 16-bit chunks, add carry bits to the sum,
/// and return the one's complement of the result.
/// Used for both the IPv4 header and ICMP message checksums.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = 0u32;

    for chunk in data.chunks_exact(2) {
        sum += get_word(chunk) as u32;
    }

    // odd trailing byte is padded with zero
    if data.len() % 2 != 0 {
        if let Some(&last_byte) = data.last() {
            sum += (last_byte as u32) << 8;
        }
    }

    while (sum >> 16) > 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}
