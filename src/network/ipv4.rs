//! IPv4 protocol header
//!
//! Read access goes through the borrowing [`Ipv4Header`] view; outgoing
//! headers are described by [`Ipv4Repr`] and written straight into a buffer.
//!
//! Features:
//! - Header field access
//! - Header validation
//! - Header checksum calculation and in-place update

use thiserror::Error;

use super::{checksum, get_word, put_word, read_addr, IP_LEN};

pub const IPV4_HEADER_LEN: usize = 20;
const IPV4_VERSION: u8 = 4;
const DEFAULT_IHL: u8 = 5; // 5 * 4 = 20 bytes
pub const DEFAULT_TTL: u8 = 64;

const TOTAL_LEN_OFFSET: usize = 2;
const TTL_OFFSET: usize = 8;
const PROTOCOL_OFFSET: usize = 9;
const CHECKSUM_OFFSET: usize = 10;
const SRC_OFFSET: usize = 12;
const DST_OFFSET: usize = 16;

/// IPv4 protocol constants
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// IPv4 flags constants
pub mod flags {
    pub const DONT_FRAGMENT: u16 = 0x4000;
    pub const MORE_FRAGMENTS: u16 = 0x2000;
    pub const FRAGMENT_OFFSET_MASK: u16 = 0x1FFF;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Ipv4Error {
    #[error("unsupported IP version {0}")]
    Version(u8),
    #[error("header length {0} out of range")]
    HeaderLen(usize),
    #[error("total length {0} out of range")]
    TotalLen(usize),
    #[error("header checksum mismatch")]
    Checksum,
}

/// Read-only view of an IPv4 header
///
/// Only the fixed 20-byte part is required to fit in the buffer;
/// [`Ipv4Header::validate`] checks the rest.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Header<'a> {
    data: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    /// Returns None if the data is too short to contain the fixed header
    pub fn from_bytes(data: &'a [u8]) -> Option<Self> {
        if data.len() < IPV4_HEADER_LEN {
            return None;
        }
        Some(Ipv4Header { data })
    }

    pub fn version(&self) -> u8 {
        self.data[0] >> 4
    }

    /// Internet Header Length in 32-bit words
    pub fn ihl(&self) -> u8 {
        self.data[0] & 0x0F
    }

    /// Get the header length in bytes
    pub fn header_len(&self) -> usize {
        (self.ihl() as usize) * 4
    }

    pub fn total_len(&self) -> u16 {
        get_word(&self.data[TOTAL_LEN_OFFSET..])
    }

    pub fn ttl(&self) -> u8 {
        self.data[TTL_OFFSET]
    }

    pub fn protocol(&self) -> u8 {
        self.data[PROTOCOL_OFFSET]
    }

    pub fn checksum(&self) -> u16 {
        get_word(&self.data[CHECKSUM_OFFSET..])
    }

    pub fn src_addr(&self) -> [u8; IP_LEN] {
        read_addr(self.data, SRC_OFFSET)
    }

    pub fn dst_addr(&self) -> [u8; IP_LEN] {
        read_addr(self.data, DST_OFFSET)
    }

    /// Payload bytes, bounded by both the total length field and the buffer
    pub fn payload(&self) -> &'a [u8] {
        let start = self.header_len().min(self.data.len());
        let end = (self.total_len() as usize).clamp(start, self.data.len());
        &self.data[start..end]
    }

    /// Validate IPv4 header structure and checksum
    pub fn validate(&self) -> Result<(), Ipv4Error> {
        if self.version() != IPV4_VERSION {
            return Err(Ipv4Error::Version(self.version()));
        }

        let header_len = self.header_len();
        if header_len < IPV4_HEADER_LEN || header_len > self.data.len() {
            return Err(Ipv4Error::HeaderLen(header_len));
        }

        let total_len = self.total_len() as usize;
        if total_len < header_len || total_len > self.data.len() {
            return Err(Ipv4Error::TotalLen(total_len));
        }

        // a correct header sums to zero including its checksum field
        if checksum(&self.data[..header_len]) != 0 {
            return Err(Ipv4Error::Checksum);
        }

        Ok(())
    }
}

/// Field values for an outgoing IPv4 header without options
#[derive(Debug, Clone)]
pub struct Ipv4Repr {
    pub tos: u8,
    pub total_len: u16,
    pub id: u16,
    pub flags_frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src_addr: [u8; IP_LEN],
    pub dst_addr: [u8; IP_LEN],
}

impl Ipv4Repr {
    /// Header with common defaults: normal service, no fragmentation, TTL 64
    pub fn new_simple(
        protocol: u8,
        src_addr: [u8; IP_LEN],
        dst_addr: [u8; IP_LEN],
        payload_len: u16,
    ) -> Self {
        Ipv4Repr {
            tos: 0,
            total_len: IPV4_HEADER_LEN as u16 + payload_len,
            id: 0,
            flags_frag_offset: 0,
            ttl: DEFAULT_TTL,
            protocol,
            src_addr,
            dst_addr,
        }
    }

    /// Write the header to the first 20 bytes of `buf`, checksum included
    ///
    /// Returns None if `buf` is shorter than the header.
    pub fn emit(&self, buf: &mut [u8]) -> Option<usize> {
        if buf.len() < IPV4_HEADER_LEN {
            return None;
        }
        buf[0] = (IPV4_VERSION << 4) | DEFAULT_IHL;
        buf[1] = self.tos;
        put_word(&mut buf[TOTAL_LEN_OFFSET..], self.total_len);
        put_word(&mut buf[4..], self.id);
        put_word(&mut buf[6..], self.flags_frag_offset);
        buf[TTL_OFFSET] = self.ttl;
        buf[PROTOCOL_OFFSET] = self.protocol;
        buf[SRC_OFFSET..SRC_OFFSET + IP_LEN].copy_from_slice(&self.src_addr);
        buf[DST_OFFSET..DST_OFFSET + IP_LEN].copy_from_slice(&self.dst_addr);
        update_checksum(buf);
        Some(IPV4_HEADER_LEN)
    }
}

/// Recalculate the header checksum of the IPv4 packet in `buf` in place
///
/// Call this after modifying any header fields. Does nothing if the
/// header does not fit.
pub fn update_checksum(buf: &mut [u8]) {
    let header_len = match Ipv4Header::from_bytes(buf) {
        Some(header) => header.header_len(),
        None => return,
    };
    if header_len < IPV4_HEADER_LEN || header_len > buf.len() {
        return;
    }
    put_word(&mut buf[CHECKSUM_OFFSET..], 0);
    let sum = checksum(&buf[..header_len]);
    put_word(&mut buf[CHECKSUM_OFFSET..], sum);
}

/// Exchange source and destination address of the IPv4 packet in `buf`
pub fn swap_addresses(buf: &mut [u8]) {
    if buf.len() < IPV4_HEADER_LEN {
        return;
    }
    let (head, tail) = buf[SRC_OFFSET..DST_OFFSET + IP_LEN].split_at_mut(IP_LEN);
    head.swap_with_slice(tail);
}
