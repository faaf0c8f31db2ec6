//! ARP for IPv4 over Ethernet

use super::{get_word, read_addr, IP_LEN, MAC_LEN};

/// ARP packet length for Ethernet/IPv4
pub const ARP_PKT_SIZE: usize = 28;

pub const ARP_REQUEST: u16 = 1;
pub const ARP_REPLY: u16 = 2;

const OP_OFFSET: usize = 6;
const SRC_MAC_OFFSET: usize = 8;
const SRC_IP_OFFSET: usize = 14;
const TGT_MAC_OFFSET: usize = 18;
const TGT_IP_OFFSET: usize = 24;

/// Read-only view of an ARP packet
#[derive(Debug, Clone, Copy)]
pub struct ArpPacket<'a> {
    data: &'a [u8],
}

impl<'a> ArpPacket<'a> {
    /// Returns None if the data is too short to contain an Ethernet/IPv4 ARP packet
    pub fn from_bytes(data: &'a [u8]) -> Option<Self> {
        if data.len() < ARP_PKT_SIZE {
            return None;
        }
        Some(ArpPacket { data })
    }

    pub fn hardware_type(&self) -> u16 {
        get_word(self.data)
    }

    pub fn protocol_type(&self) -> u16 {
        get_word(&self.data[2..])
    }

    pub fn operation(&self) -> u16 {
        get_word(&self.data[OP_OFFSET..])
    }

    pub fn src_mac(&self) -> [u8; MAC_LEN] {
        read_addr(self.data, SRC_MAC_OFFSET)
    }

    pub fn src_ip(&self) -> [u8; IP_LEN] {
        read_addr(self.data, SRC_IP_OFFSET)
    }

    pub fn tgt_mac(&self) -> [u8; MAC_LEN] {
        read_addr(self.data, TGT_MAC_OFFSET)
    }

    pub fn tgt_ip(&self) -> [u8; IP_LEN] {
        read_addr(self.data, TGT_IP_OFFSET)
    }
}
