
use std::fmt::Debug;
use std::net::Ipv4Addr;

pub struct Packet {
    /// source address of the received datagram
    pub src_addr: Ipv4Addr,

    /// packet data, starting at the IPv4 header
    pub data: [u8; 65536],

    /// length of packet data
    pub data_len: usize,
}

impl Packet {
    pub fn new() -> Self {
        Self {
            src_addr: Ipv4Addr::UNSPECIFIED,
            data: [0; 65536],
            data_len: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut packet = Self::new();
        let len = bytes.len().min(packet.data.len());
        packet.data[..len].copy_from_slice(&bytes[..len]);
        packet.data_len = len;
        packet
    }

    pub fn data(&self) -> &[u8] {
        let len = self.data_len;
        if len > self.data.len() {
            &self.data
        } else {
            &self.data[..len]
        }
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("src_addr", &self.src_addr)
            .field("data_len", &self.data_len)
            .finish()
    }
}
