
pub mod ip;
pub mod v3;
pub mod control;
pub mod packet;

#[cfg(target_os = "linux")]
pub mod socket;

#[cfg(target_os = "linux")]
pub use socket::RawIgmpSocket;
#[cfg(target_os = "linux")]
pub use socket::AsyncIgmpSocket;

use crate::addr::read_ipv4;
use crate::Error;

use control::ControlMessage;
use ip::Ipv4Header;
use v3::*;

use std::net::Ipv4Addr;

/// every IGMP message starts with these 8 bytes
pub const IGMP_HEADER_LEN: usize = 8;

/// fixed part of an IGMPv3 query, before the source list
pub const IGMPV3_QUERY_HEADER_LEN: usize = 12;

const GROUP_RECORD_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgmpType {
    MembershipQuery,
    V1MembershipReport,
    V2MembershipReport,
    V2LeaveGroup,
    V3MembershipReport,
    Unknown(u8),
}

impl From<u8> for IgmpType {
    fn from(value: u8) -> Self {
        match value {
            0x11 => IgmpType::MembershipQuery,
            0x12 => IgmpType::V1MembershipReport,
            0x16 => IgmpType::V2MembershipReport,
            0x17 => IgmpType::V2LeaveGroup,
            0x22 => IgmpType::V3MembershipReport,
            other => IgmpType::Unknown(other),
        }
    }
}

/// IGMPv1/v2 message; also any unrecognised type carried in the common 8-byte layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgmpMessage {
    pub igmp_type: u8,

    /// raw code byte (max response time in v2 queries)
    pub code: u8,
    pub checksum: u16,
    pub group: Ipv4Addr,
}

impl IgmpMessage {
    pub fn kind(&self) -> IgmpType {
        self.igmp_type.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IgmpPacket {
    /// type 0x11 (8 bytes), 0x12, 0x16, 0x17 or unknown
    Legacy(IgmpMessage),

    /// type 0x11 with a v3 trailer
    V3Query(Igmpv3Query),

    /// type 0x22
    V3Report(Igmpv3Report),
}

impl IgmpPacket {
    pub fn igmp_type(&self) -> u8 {
        match self {
            IgmpPacket::Legacy(msg) => msg.igmp_type,
            IgmpPacket::V3Query(_) => 0x11,
            IgmpPacket::V3Report(_) => 0x22,
        }
    }
}

/// Decodes an IGMP message starting at the first byte of the IGMP header.
/// Checksums are not verified.
pub fn parse_igmp(data: &[u8]) -> Result<IgmpPacket, Error> {
    if data.len() < IGMP_HEADER_LEN {
        return Err(Error::BufferTooShort("IGMP header"));
    }

    match data[0] {
        0x22 => Ok(IgmpPacket::V3Report(parse_v3_report(data)?)),

        // a v1/v2 query is exactly 8 bytes; anything longer is v3
        0x11 if data.len() > IGMP_HEADER_LEN => Ok(IgmpPacket::V3Query(parse_v3_query(data)?)),

        igmp_type => Ok(IgmpPacket::Legacy(IgmpMessage {
            igmp_type,
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
            group: read_ipv4(data, 4, "IGMP group")?,
        })),
    }
}

fn parse_v3_query(data: &[u8]) -> Result<Igmpv3Query, Error> {
    if data.len() < IGMPV3_QUERY_HEADER_LEN {
        return Err(Error::BufferTooShort("IGMPv3 query header"));
    }

    let max_response_code = data[1];
    let num_sources = u16::from_be_bytes([data[10], data[11]]) as usize;
    if data.len() - IGMPV3_QUERY_HEADER_LEN < num_sources * 4 {
        return Err(Error::BufferTooShort("IGMPv3 query sources"));
    }

    let mut sources = Vec::with_capacity(num_sources);
    for i in 0..num_sources {
        sources.push(read_ipv4(data, IGMPV3_QUERY_HEADER_LEN + 4 * i, "IGMPv3 query sources")?);
    }

    Ok(Igmpv3Query {
        max_response_code,
        max_response_time: decode_exp_code(max_response_code),
        checksum: u16::from_be_bytes([data[2], data[3]]),
        group: read_ipv4(data, 4, "IGMPv3 query group")?,
        suppress_router_processing: data[8] & 0x08 != 0,
        qrv: data[8] & 0x07,
        qqic: data[9],
        sources,
    })
}

fn parse_v3_report(data: &[u8]) -> Result<Igmpv3Report, Error> {
    let num_records = u16::from_be_bytes([data[6], data[7]]) as usize;

    let mut records = Vec::with_capacity(num_records.min(data.len() / GROUP_RECORD_HEADER_LEN));
    let mut offset = IGMP_HEADER_LEN;
    for _ in 0..num_records {
        if offset + GROUP_RECORD_HEADER_LEN > data.len() {
            return Err(Error::BufferTooShort("group record area"));
        }

        let record_type = data[offset];
        let aux_data_len = data[offset + 1];
        let num_sources = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;

        let end_offset = offset + GROUP_RECORD_HEADER_LEN + 4 * num_sources + 4 * aux_data_len as usize;
        if end_offset > data.len() {
            return Err(Error::BufferTooShort("group record area"));
        }

        let multicast_address = read_ipv4(data, offset + 4, "group record area")?;
        let mut sources = Vec::with_capacity(num_sources);
        for j in 0..num_sources {
            sources.push(read_ipv4(data, offset + GROUP_RECORD_HEADER_LEN + 4 * j, "group record area")?);
        }

        records.push(GroupRecord {
            record_type,
            aux_data_len,
            multicast_address,
            sources,
        });
        offset = end_offset;
    }

    Ok(Igmpv3Report {
        checksum: u16::from_be_bytes([data[2], data[3]]),
        records,
    })
}

/// What arrived on the multicast routing socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingMessage {
    /// kernel upcall (IPv4 protocol byte is zero)
    Control(ControlMessage),

    Igmp {
        header: Ipv4Header,
        packet: IgmpPacket,
    },

    Other {
        header: Ipv4Header,
    },
}

pub struct IgmpParser {
    pub(crate) packet: packet::Packet,
}

impl IgmpParser {
    pub fn new() -> Self {
        Self {
            packet: packet::Packet::new(),
        }
    }

    pub fn new_from_packet(packet: packet::Packet) -> Self {
        Self {
            packet,
        }
    }

    pub fn packet(&self) -> &packet::Packet {
        &self.packet
    }

    pub fn parse(&self) -> Result<RoutingMessage, Error> {
        parse_routing_message(self.packet.data())
    }
}

impl Default for IgmpParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies a datagram read from the routing socket and decodes it.
pub fn parse_routing_message(data: &[u8]) -> Result<RoutingMessage, Error> {
    if control::is_control_message(data) {
        return Ok(RoutingMessage::Control(control::parse_control(data)?));
    }

    let header = ip::parse_ip_header(data)?;
    match header.ip_protocol() {
        ip::IpProtocol::Igmp => {
            let packet = parse_igmp(header.payload(data)?)?;
            Ok(RoutingMessage::Igmp { header, packet })
        }

        _ => Ok(RoutingMessage::Other { header }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::v3::GroupRecordType;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr::new(a, b, c, d)
    }

    #[test]
    fn legacy_messages() {
        let cases: [([u8; 8], u8, u16, Ipv4Addr); 4] = [
            ([0x11, 0x00, 0x94, 0x04, 0xef, 0x00, 0x00, 0x01], 0x11, 37892, ip(239, 0, 0, 1)),
            ([0x12, 0x00, 0x00, 0x00, 0xef, 0x00, 0x00, 0x02], 0x12, 0, ip(239, 0, 0, 2)),
            ([0x16, 0x00, 0x3e, 0xd4, 0xef, 0x00, 0x00, 0x03], 0x16, 16084, ip(239, 0, 0, 3)),
            ([0x17, 0x00, 0x00, 0x00, 0xef, 0x00, 0x00, 0x04], 0x17, 0, ip(239, 0, 0, 4)),
        ];
        for (buf, igmp_type, checksum, group) in cases {
            match parse_igmp(&buf).unwrap() {
                IgmpPacket::Legacy(msg) => {
                    assert_eq!(msg.igmp_type, igmp_type);
                    assert_eq!(msg.checksum, checksum);
                    assert_eq!(msg.group, group);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn v2_report_for_ospf_group() {
        let buf = [0x16, 0x00, 0x09, 0xfa, 224, 0, 0, 5];
        let IgmpPacket::Legacy(msg) = parse_igmp(&buf).unwrap() else {
            panic!("not a legacy message");
        };
        assert_eq!(msg.kind(), IgmpType::V2MembershipReport);
        assert_eq!(msg.group.to_string(), "224.0.0.5");
    }

    #[test]
    fn seven_bytes_is_too_short() {
        let buf = [0x16, 0x00, 0x3e, 0xd4, 0xef, 0x00, 0x00, 0x03];
        assert!(parse_igmp(&buf[..7]).unwrap_err().is_buffer_too_short());
        assert!(parse_igmp(&[]).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn unknown_type_decodes_as_legacy() {
        let buf = [0x99, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0xaa];
        let IgmpPacket::Legacy(msg) = parse_igmp(&buf).unwrap() else {
            panic!("not a legacy message");
        };
        assert_eq!(msg.kind(), IgmpType::Unknown(0x99));
        assert_eq!(msg.code, 5);
        assert_eq!(msg.checksum, 1);
    }

    #[test]
    fn v3_query_with_one_source() {
        let buf = [0x11, 0x64, 0x00, 0x00, 0xef, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0xc0, 0xa8, 0x01, 0x01];
        let IgmpPacket::V3Query(query) = parse_igmp(&buf).unwrap() else {
            panic!("not a v3 query");
        };
        assert_eq!(query.max_response_code, 100);
        assert_eq!(query.max_response_time, 100);
        assert_eq!(query.group, ip(239, 0, 0, 1));
        assert!(!query.suppress_router_processing);
        assert_eq!(query.qrv, 0);
        assert_eq!(query.sources, vec![ip(192, 168, 1, 1)]);
    }

    #[test]
    fn v3_query_flags_and_exponential_code() {
        let buf = [0x11, 0x80, 0x12, 0x34, 0, 0, 0, 0, 0x0a, 0x7d, 0x00, 0x00];
        let IgmpPacket::V3Query(query) = parse_igmp(&buf).unwrap() else {
            panic!("not a v3 query");
        };
        assert_eq!(query.max_response_time, 128);
        assert_eq!(query.checksum, 0x1234);
        assert!(query.suppress_router_processing);
        assert_eq!(query.qrv, 2);
        assert_eq!(query.qqic, 125);
        assert_eq!(query.query_interval(), 125);
        assert!(query.sources.is_empty());
        assert!(query.is_general_query());

        let mut buf = buf;
        buf[1] = 0x7f;
        let IgmpPacket::V3Query(query) = parse_igmp(&buf).unwrap() else {
            panic!("not a v3 query");
        };
        assert_eq!(query.max_response_time, 127);
    }

    #[test]
    fn query_between_eight_and_twelve_bytes_is_too_short() {
        let buf = [0x11, 0x64, 0x00, 0x00, 0xef, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        for len in 9..=11 {
            assert!(parse_igmp(&buf[..len]).unwrap_err().is_buffer_too_short(), "len {}", len);
        }
        assert!(matches!(parse_igmp(&buf[..8]).unwrap(), IgmpPacket::Legacy(_)));
    }

    #[test]
    fn v3_query_source_count_exceeding_buffer() {
        let buf = [0x11, 0x64, 0x00, 0x00, 0xef, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xc0, 0xa8, 0x01, 0x01, 0xc0, 0xa8, 0x01];
        assert!(parse_igmp(&buf).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn v3_report_single_record() {
        let buf = [0x22, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, 0x00, 0x01, 0xef, 0x00, 0x00, 0x04, 0xc0, 0xa8, 0x01, 0x0a];
        let IgmpPacket::V3Report(report) = parse_igmp(&buf).unwrap() else {
            panic!("not a v3 report");
        };
        assert_eq!(report.checksum, 0x1c);
        assert_eq!(report.num_records(), 1);
        let record = &report.records[0];
        assert_eq!(record.kind(), GroupRecordType::ChangeToIncludeMode);
        assert_eq!(record.multicast_address, ip(239, 0, 0, 4));
        assert_eq!(record.sources, vec![ip(192, 168, 1, 10)]);
    }

    #[test]
    fn v3_report_without_records() {
        let buf = [0x22, 0x00, 0xdd, 0xff, 0x00, 0x00, 0x00, 0x00];
        let IgmpPacket::V3Report(report) = parse_igmp(&buf).unwrap() else {
            panic!("not a v3 report");
        };
        assert!(report.records.is_empty());
    }

    #[test]
    fn v3_report_skips_aux_data() {
        let buf = [
            0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
            // record 1: one aux word, no sources
            0x02, 0x01, 0x00, 0x00, 0xef, 0x00, 0x00, 0x01, 0xde, 0xad, 0xbe, 0xef,
            // record 2: two sources
            0x05, 0x00, 0x00, 0x02, 0xef, 0x00, 0x00, 0x02, 10, 0, 0, 1, 10, 0, 0, 2,
        ];
        let IgmpPacket::V3Report(report) = parse_igmp(&buf).unwrap() else {
            panic!("not a v3 report");
        };
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].aux_data_len, 1);
        assert!(report.records[0].sources.is_empty());
        assert_eq!(report.records[1].kind(), GroupRecordType::AllowNewSources);
        assert_eq!(report.records[1].sources, vec![ip(10, 0, 0, 1), ip(10, 0, 0, 2)]);
        assert_eq!(report.records.iter().map(|r| r.wire_len()).sum::<usize>(), buf.len() - 8);
    }

    #[test]
    fn v3_report_truncated_second_record() {
        let buf = [
            0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02,
            0x01, 0x00, 0x00, 0x00, 0xef, 0x00, 0x00, 0x01,
            0x01, 0x00, 0x00, 0x01, 0xef, 0x00, 0x00, 0x02, 10, 0, 0,
        ];
        assert!(parse_igmp(&buf).unwrap_err().is_buffer_too_short());
        // header of the missing record cut short
        assert!(parse_igmp(&buf[..20]).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn v3_report_count_larger_than_buffer() {
        let buf = [0x22, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff];
        assert!(parse_igmp(&buf).unwrap_err().is_buffer_too_short());
    }

    #[test]
    fn routing_message_dispatch() {
        let igmp = [
            0x46, 0xc0, 0x00, 0x20, 0x00, 0x00, 0x40, 0x00, 0x01, 0x02, 0xeb, 0x14, 0x0a, 0x00, 0x00, 0x01,
            0xef, 0x00, 0x00, 0x02, 0x94, 0x04, 0x00, 0x00, 0x16, 0x00, 0xfa, 0xfc, 0xef, 0x00, 0x00, 0x02,
        ];
        let parser = IgmpParser::new_from_packet(packet::Packet::from_bytes(&igmp));
        match parser.parse().unwrap() {
            RoutingMessage::Igmp { header, packet: IgmpPacket::Legacy(msg) } => {
                assert_eq!(header.src_addr, ip(10, 0, 0, 1));
                assert_eq!(msg.kind(), IgmpType::V2MembershipReport);
                assert_eq!(msg.group, ip(239, 0, 0, 2));
            }
            other => panic!("unexpected {:?}", other),
        }

        let upcall = [
            0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x40, 0x00, 0x01, 0x00, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x01,
            0xef, 0x00, 0x00, 0x04, 0x01, 0x00, 0x00, 0x00,
        ];
        assert!(matches!(parse_routing_message(&upcall).unwrap(), RoutingMessage::Control(_)));

        let mut pim = upcall;
        pim[9] = 103;
        assert!(matches!(parse_routing_message(&pim).unwrap(), RoutingMessage::Other { .. }));
    }

    #[test]
    fn upcall_with_zeroed_unused_words() {
        let mut upcall = [0u8; 20];
        upcall[8] = 2;
        upcall[10] = 1;
        upcall[12..16].copy_from_slice(&[192, 0, 2, 7]);
        upcall[16..20].copy_from_slice(&[239, 1, 2, 3]);
        assert!(control::is_control_message(&upcall));
        match parse_routing_message(&upcall).unwrap() {
            RoutingMessage::Control(msg) => {
                assert_eq!(msg.kind(), control::ControlMessageType::WrongVif);
                assert_eq!(msg.vif, 1);
                assert_eq!(msg.src_addr, ip(192, 0, 2, 7));
                assert_eq!(msg.dst_addr, ip(239, 1, 2, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_routing_message(&upcall[..19]).unwrap_err().is_buffer_too_short());
    }
}
