//! Ethernet II frame header

use super::{get_word, read_addr, MAC_LEN};

/// Ethernet header length: destination, source and type
pub const ETH_HDR_SIZE: usize = 14;

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;

const DST_OFFSET: usize = 0;
const SRC_OFFSET: usize = 6;
const TYPE_OFFSET: usize = 12;

/// Read-only view of an Ethernet frame
///
/// The view borrows the frame bytes and decodes fields on demand.
#[derive(Debug, Clone, Copy)]
pub struct EthernetFrame<'a> {
    data: &'a [u8],
}

impl<'a> EthernetFrame<'a> {
    /// Wrap `data` as an Ethernet frame
    ///
    /// Returns None if the data is too short to contain the header
    pub fn from_bytes(data: &'a [u8]) -> Option<Self> {
        if data.len() < ETH_HDR_SIZE {
            return None;
        }
        Some(EthernetFrame { data })
    }

    pub fn dst_mac(&self) -> [u8; MAC_LEN] {
        read_addr(self.data, DST_OFFSET)
    }

    pub fn src_mac(&self) -> [u8; MAC_LEN] {
        read_addr(self.data, SRC_OFFSET)
    }

    pub fn ether_type(&self) -> u16 {
        get_word(&self.data[TYPE_OFFSET..])
    }

    /// Bytes following the Ethernet header
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETH_HDR_SIZE..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Overwrite the destination and source addresses of the frame in `data`
///
/// Does nothing if `data` cannot hold an Ethernet header.
pub fn set_addresses(data: &mut [u8], dst: &[u8; MAC_LEN], src: &[u8; MAC_LEN]) {
    if data.len() < ETH_HDR_SIZE {
        return;
    }
    data[DST_OFFSET..DST_OFFSET + MAC_LEN].copy_from_slice(dst);
    data[SRC_OFFSET..SRC_OFFSET + MAC_LEN].copy_from_slice(src);
}
