//! ICMP echo (ping) handling
//!
//! All functions take a buffer starting at the IPv4 header of the packet that
//! carries the ICMP message. The checksum is the standard Internet checksum
//! over the whole ICMP message (header and data), as bounded by the IPv4
//! total length field and the buffer.

use super::ipv4::{self, protocol, Ipv4Header, Ipv4Repr, IPV4_HEADER_LEN};
use super::{checksum, get_word, put_word, IP_LEN};

/// Minimum ICMP header length in bytes
pub const ICMP_HEADER_LEN: usize = 8;

/// Data bytes appended to a generated echo request
pub const PING_PAYLOAD_LEN: usize = 32;

/// ICMP message types
pub const ICMP_TYPE_ECHO_REPLY: u8 = 0;
pub const ICMP_TYPE_ECHO_REQUEST: u8 = 8;

const CHECKSUM_OFFSET: usize = 2;

/// ICMP packet header
///
/// Represents the standard 8-byte ICMP header as defined in RFC 792
#[derive(Debug, Clone, Copy)]
pub struct IcmpHeader {
    pub msg_type: u8,
    pub msg_code: u8,
    pub checksum: u16,
    pub rest: [u8; 4], // identifier and sequence for echo
}

impl IcmpHeader {
    /// Parse ICMP header from byte slice
    ///
    /// Returns None if the data is too short to contain a valid ICMP header
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ICMP_HEADER_LEN {
            return None;
        }

        Some(IcmpHeader {
            msg_type: data[0],
            msg_code: data[1],
            checksum: get_word(&data[CHECKSUM_OFFSET..]),
            rest: super::read_addr(data, 4),
        })
    }

    /// Convert ICMP header to bytes
    pub fn to_bytes(&self) -> [u8; ICMP_HEADER_LEN] {
        let mut bytes = [0u8; ICMP_HEADER_LEN];
        bytes[0] = self.msg_type;
        bytes[1] = self.msg_code;
        put_word(&mut bytes[CHECKSUM_OFFSET..], self.checksum);
        bytes[4..8].copy_from_slice(&self.rest);
        bytes
    }

    pub fn is_echo_request(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REQUEST && self.msg_code == 0
    }

    pub fn is_echo_reply(&self) -> bool {
        self.msg_type == ICMP_TYPE_ECHO_REPLY && self.msg_code == 0
    }

    pub fn identifier(&self) -> u16 {
        get_word(&self.rest[0..2])
    }

    pub fn sequence(&self) -> u16 {
        get_word(&self.rest[2..4])
    }

    pub fn set_identifier(&mut self, id: u16) {
        put_word(&mut self.rest[0..2], id);
    }

    pub fn set_sequence(&mut self, seq: u16) {
        put_word(&mut self.rest[2..4], seq);
    }
}

/// Byte range of the ICMP message inside the IPv4 packet in `buf`
fn icmp_range(buf: &[u8]) -> Option<(usize, usize)> {
    let ip = Ipv4Header::from_bytes(buf)?;
    if ip.protocol() != protocol::ICMP || ip.header_len() < IPV4_HEADER_LEN {
        return None;
    }
    let start = ip.header_len();
    let end = start + ip.payload().len();
    if end - start < ICMP_HEADER_LEN {
        return None;
    }
    Some((start, end))
}

/// Check whether `buf` holds an IPv4 packet with an ICMP echo request
pub fn is_ping_request(buf: &[u8]) -> bool {
    icmp_range(buf)
        .and_then(|(start, _)| IcmpHeader::from_bytes(&buf[start..]))
        .map_or(false, |icmp| icmp.is_echo_request())
}

/// Verify the ICMP checksum of the packet in `buf`
pub fn checksum_is_valid(buf: &[u8]) -> bool {
    match icmp_range(buf) {
        Some((start, end)) => checksum(&buf[start..end]) == 0,
        None => false,
    }
}

/// Recalculate the ICMP checksum of the packet in `buf` in place
pub fn compute_checksum(buf: &mut [u8]) {
    if let Some((start, end)) = icmp_range(buf) {
        let field = start + CHECKSUM_OFFSET;
        put_word(&mut buf[field..], 0);
        let sum = checksum(&buf[start..end]);
        put_word(&mut buf[field..], sum);
    }
}

/// Turn the echo request in `buf` into the matching echo reply
///
/// Swaps the IPv4 addresses, changes the message type and recomputes
/// both checksums. Identifier, sequence and data are kept. Returns false
/// and leaves `buf` untouched if it does not hold an echo request.
pub fn convert_ping_request_to_reply(buf: &mut [u8]) -> bool {
    let start = match icmp_range(buf) {
        Some((start, _)) if is_ping_request(buf) => start,
        _ => return false,
    };

    ipv4::swap_addresses(buf);
    ipv4::update_checksum(buf);
    buf[start] = ICMP_TYPE_ECHO_REPLY;
    compute_checksum(buf);
    true
}

/// Write an IPv4 ICMP echo request from `src_ip` to `target_ip` into `buf`
///
/// The data part is `PING_PAYLOAD_LEN` bytes of an incrementing pattern.
/// Returns the packet length, or None if `buf` is too small.
pub fn build_ping_request(
    buf: &mut [u8],
    src_ip: [u8; IP_LEN],
    target_ip: [u8; IP_LEN],
    ident: u16,
    seq: u16,
) -> Option<usize> {
    let icmp_len = ICMP_HEADER_LEN + PING_PAYLOAD_LEN;
    let total_len = IPV4_HEADER_LEN + icmp_len;
    if buf.len() < total_len {
        return None;
    }

    let mut ip = Ipv4Repr::new_simple(protocol::ICMP, src_ip, target_ip, icmp_len as u16);
    ip.id = seq;
    ip.emit(buf)?;

    let mut icmp = IcmpHeader {
        msg_type: ICMP_TYPE_ECHO_REQUEST,
        msg_code: 0,
        checksum: 0,
        rest: [0; 4],
    };
    icmp.set_identifier(ident);
    icmp.set_sequence(seq);
    buf[IPV4_HEADER_LEN..IPV4_HEADER_LEN + ICMP_HEADER_LEN].copy_from_slice(&icmp.to_bytes());

    let data = &mut buf[IPV4_HEADER_LEN + ICMP_HEADER_LEN..total_len];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = i as u8;
    }

    compute_checksum(&mut buf[..total_len]);
    Some(total_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: [u8; 4] = [192, 168, 1, 10];
    const DST: [u8; 4] = [192, 168, 1, 1];

    fn request() -> Vec<u8> {
        let mut buf = vec![0u8; 128];
        let len = build_ping_request(&mut buf, SRC, DST, 0x1234, 7).unwrap();
        buf.truncate(len);
        buf
    }

    #[test]
    fn test_build_ping_request() {
        let buf = request();
        assert_eq!(buf.len(), IPV4_HEADER_LEN + ICMP_HEADER_LEN + PING_PAYLOAD_LEN);

        let ip = Ipv4Header::from_bytes(&buf).unwrap();
        assert_eq!(ip.validate(), Ok(()));
        assert_eq!(ip.src_addr(), SRC);
        assert_eq!(ip.dst_addr(), DST);

        let icmp = IcmpHeader::from_bytes(ip.payload()).unwrap();
        assert!(icmp.is_echo_request());
        assert_eq!(icmp.identifier(), 0x1234);
        assert_eq!(icmp.sequence(), 7);

        assert!(is_ping_request(&buf));
        assert!(checksum_is_valid(&buf));
    }

    #[test]
    fn test_build_into_small_buffer() {
        let mut buf = [0u8; 40];
        assert_eq!(build_ping_request(&mut buf, SRC, DST, 1, 1), None);
    }

    #[test]
    fn test_request_to_reply() {
        let mut buf = request();
        assert!(convert_ping_request_to_reply(&mut buf));

        let ip = Ipv4Header::from_bytes(&buf).unwrap();
        assert_eq!(ip.validate(), Ok(()));
        assert_eq!(ip.src_addr(), DST);
        assert_eq!(ip.dst_addr(), SRC);

        let icmp = IcmpHeader::from_bytes(ip.payload()).unwrap();
        assert!(icmp.is_echo_reply());
        assert_eq!(icmp.identifier(), 0x1234);
        assert_eq!(icmp.sequence(), 7);
        assert!(checksum_is_valid(&buf));
        assert!(!is_ping_request(&buf));

        // a reply is not converted again
        let before = buf.clone();
        assert!(!convert_ping_request_to_reply(&mut buf));
        assert_eq!(buf, before);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut buf = request();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        assert!(!checksum_is_valid(&buf));
        compute_checksum(&mut buf);
        assert!(checksum_is_valid(&buf));
    }

    #[test]
    fn test_non_icmp_packets() {
        let mut buf = request();
        buf[9] = protocol::UDP;
        assert!(!is_ping_request(&buf));
        assert!(!checksum_is_valid(&buf));
        assert!(!is_ping_request(&buf[..10]));
    }

    #[test]
    fn test_odd_length_message() {
        let mut buf = request();
        buf.pop();
        let total_len = buf.len() as u16;
        put_word(&mut buf[2..], total_len);
        ipv4::update_checksum(&mut buf);
        compute_checksum(&mut buf);
        assert!(checksum_is_valid(&buf));
    }
}
