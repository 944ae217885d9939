
use crate::addr::read_ipv4;
use crate::Error;

use std::net::Ipv4Addr;

/// fixed part of an IPv4 header
pub const IPV4_HEADER_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    /// kernel upcall on the multicast routing socket
    Control,
    Igmp,
    Pim,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            0 => IpProtocol::Control,
            2 => IpProtocol::Igmp,
            103 => IpProtocol::Pim,
            other => IpProtocol::Other(other),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(value: IpProtocol) -> Self {
        match value {
            IpProtocol::Control => 0,
            IpProtocol::Igmp => 2,
            IpProtocol::Pim => 103,
            IpProtocol::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub id: u16,

    /// flags and fragment offset, as carried on the wire
    pub frag_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
}

impl Ipv4Header {
    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    pub fn ip_protocol(&self) -> IpProtocol {
        self.protocol.into()
    }

    /// Bytes following the header, located by IHL.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8], Error> {
        let len = self.header_len();
        if len < IPV4_HEADER_LEN {
            return Err(Error::BufferTooShort("IPv4 header length field"));
        }
        buf.get(len..).ok_or(Error::BufferTooShort("IPv4 options"))
    }
}

/// Decodes the fixed 20-byte IPv4 header. Options are not decoded.
pub fn parse_ip_header(data: &[u8]) -> Result<Ipv4Header, Error> {
    if data.len() < IPV4_HEADER_LEN {
        return Err(Error::BufferTooShort("IPv4 header"));
    }

    Ok(Ipv4Header {
        version: data[0] >> 4,
        ihl: data[0] & 0x0f,
        tos: data[1],
        total_length: u16::from_be_bytes([data[2], data[3]]),
        id: u16::from_be_bytes([data[4], data[5]]),
        frag_offset: u16::from_be_bytes([data[6], data[7]]),
        ttl: data[8],
        protocol: data[9],
        checksum: u16::from_be_bytes([data[10], data[11]]),
        src_addr: read_ipv4(data, 12, "IPv4 source address")?,
        dst_addr: read_ipv4(data, 16, "IPv4 destination address")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(protocol: u8, src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        let mut buf = vec![0x45, 0x00, 0x00, 0x14, 0x12, 0x34, 0x40, 0x00, 64, protocol, 0xab, 0xcd];
        buf.extend_from_slice(&src);
        buf.extend_from_slice(&dst);
        buf
    }

    #[test]
    fn decodes_igmp_header() {
        let buf = header(2, [192, 0, 2, 1], [224, 0, 0, 1]);
        let hdr = parse_ip_header(&buf).unwrap();
        assert_eq!(hdr.version, 4);
        assert_eq!(hdr.ihl, 5);
        assert_eq!(hdr.ttl, 64);
        assert_eq!(hdr.protocol, 2);
        assert_eq!(hdr.ip_protocol(), IpProtocol::Igmp);
        assert_eq!(hdr.total_length, 20);
        assert_eq!(hdr.id, 0x1234);
        assert_eq!(hdr.frag_offset, 0x4000);
        assert_eq!(hdr.checksum, 0xabcd);
        assert_eq!(hdr.src_addr.to_string(), "192.0.2.1");
        assert_eq!(hdr.dst_addr.to_string(), "224.0.0.1");
    }

    #[test]
    fn nineteen_bytes_is_too_short() {
        let buf = header(2, [10, 0, 0, 1], [239, 0, 0, 4]);
        assert!(parse_ip_header(&buf[..19]).unwrap_err().is_buffer_too_short());
        assert!(parse_ip_header(&[]).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut buf = header(0, [10, 0, 0, 1], [239, 0, 0, 4]);
        let bare = parse_ip_header(&buf).unwrap();
        buf.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(parse_ip_header(&buf).unwrap(), bare);
        assert_eq!(bare.ip_protocol(), IpProtocol::Control);
    }

    #[test]
    fn payload_honours_ihl() {
        // router alert option makes IHL 6
        let mut buf = header(2, [10, 0, 0, 1], [224, 0, 0, 22]);
        buf[0] = 0x46;
        buf.extend_from_slice(&[0x94, 0x04, 0x00, 0x00]);
        buf.extend_from_slice(&[0x16, 0x00, 0xfa, 0xfc, 0xef, 0x00, 0x00, 0x02]);
        let hdr = parse_ip_header(&buf).unwrap();
        assert_eq!(hdr.header_len(), 24);
        assert_eq!(hdr.payload(&buf).unwrap()[0], 0x16);

        assert!(hdr.payload(&buf[..22]).is_err());

        buf[0] = 0x44;
        let hdr = parse_ip_header(&buf).unwrap();
        assert!(hdr.payload(&buf).is_err());
    }
}
