
use crate::addr::read_ipv4;
use crate::Error;

use std::net::Ipv4Addr;

/// size of `struct igmpmsg`
pub const CONTROL_MESSAGE_LEN: usize = 20;

/// offset of the byte the kernel zeroes in place of the IPv4 protocol field
const MBZ_OFFSET: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessageType {
    /// no forwarding cache entry for (S,G)
    NoCache,
    WrongVif,
    WholePacket,
    WrongVifWhole,
    Unknown(u8),
}

impl From<u8> for ControlMessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => ControlMessageType::NoCache,
            2 => ControlMessageType::WrongVif,
            3 => ControlMessageType::WholePacket,
            4 => ControlMessageType::WrongVifWhole,
            other => ControlMessageType::Unknown(other),
        }
    }
}

/// Upcall from the kernel multicast routing engine (`struct igmpmsg`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub msg_type: u8,
    pub mbz: u8,
    pub vif: u8,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
}

impl ControlMessage {
    pub fn kind(&self) -> ControlMessageType {
        self.msg_type.into()
    }
}

/// Whether a datagram read from the routing socket is a kernel upcall rather than an IP packet.
pub fn is_control_message(data: &[u8]) -> bool {
    data.len() >= CONTROL_MESSAGE_LEN && data[MBZ_OFFSET] == 0
}

pub fn parse_control(data: &[u8]) -> Result<ControlMessage, Error> {
    if data.len() < CONTROL_MESSAGE_LEN {
        return Err(Error::BufferTooShort("kernel control message"));
    }

    Ok(ControlMessage {
        msg_type: data[8],
        mbz: data[MBZ_OFFSET],
        vif: data[10],
        src_addr: read_ipv4(data, 12, "control message source")?,
        dst_addr: read_ipv4(data, 16, "control message group")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOCACHE: [u8; 28] = [
        0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x40, 0x00, 0x01, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x01,
        0xef, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn decodes_nocache_upcall() {
        assert!(is_control_message(&NOCACHE));
        let msg = parse_control(&NOCACHE).unwrap();
        assert_eq!(msg.msg_type, 1);
        assert_eq!(msg.kind(), ControlMessageType::NoCache);
        assert_eq!(msg.mbz, 0);
        assert_eq!(msg.vif, 0);
        assert_eq!(msg.src_addr, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(msg.dst_addr, Ipv4Addr::new(239, 0, 0, 4));
    }

    #[test]
    fn vif_hi_is_not_read() {
        let mut buf = NOCACHE;
        buf[10] = 3;
        buf[11] = 0xff;
        assert_eq!(parse_control(&buf).unwrap().vif, 3);
    }

    #[test]
    fn exact_length_and_one_short() {
        let msg = parse_control(&NOCACHE[..20]).unwrap();
        assert_eq!(msg, parse_control(&NOCACHE).unwrap());
        assert!(parse_control(&NOCACHE[..19]).unwrap_err().is_buffer_too_short());
        assert!(!is_control_message(&NOCACHE[..19]));
    }

    #[test]
    fn igmp_datagram_is_not_an_upcall() {
        let mut buf = NOCACHE;
        buf[MBZ_OFFSET] = 2;
        assert!(!is_control_message(&buf));
        assert_eq!(ControlMessageType::from(4), ControlMessageType::WrongVifWhole);
        assert_eq!(ControlMessageType::from(7), ControlMessageType::Unknown(7));
    }
}
