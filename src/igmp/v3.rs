
use std::net::Ipv4Addr;

/// Decodes the IGMPv3 exponential code used by Max Resp Code and QQIC (RFC 3376 4.1.1, 4.1.7).
pub fn decode_exp_code(code: u8) -> u32 {
    if code < 0x80 {
        return code as u32;
    }
    let exp = (code >> 4) & 0x07;
    let mant = code & 0x0f;
    ((mant | 0x10) as u32) << (exp + 3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRecordType {
    ModeIsInclude,
    ModeIsExclude,
    ChangeToIncludeMode,
    ChangeToExcludeMode,
    AllowNewSources,
    BlockOldSources,
    Unknown(u8),
}

impl From<u8> for GroupRecordType {
    fn from(value: u8) -> Self {
        match value {
            1 => GroupRecordType::ModeIsInclude,
            2 => GroupRecordType::ModeIsExclude,
            3 => GroupRecordType::ChangeToIncludeMode,
            4 => GroupRecordType::ChangeToExcludeMode,
            5 => GroupRecordType::AllowNewSources,
            6 => GroupRecordType::BlockOldSources,
            other => GroupRecordType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub record_type: u8,

    /// auxiliary data length in 32-bit words; the data itself is skipped
    pub aux_data_len: u8,
    pub multicast_address: Ipv4Addr,
    pub sources: Vec<Ipv4Addr>,
}

impl GroupRecord {
    pub fn kind(&self) -> GroupRecordType {
        self.record_type.into()
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// bytes this record occupies on the wire
    pub fn wire_len(&self) -> usize {
        8 + 4 * self.sources.len() + 4 * self.aux_data_len as usize
    }
}

/// type 0x22
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Igmpv3Report {
    pub checksum: u16,
    pub records: Vec<GroupRecord>,
}

impl Igmpv3Report {
    pub fn num_records(&self) -> usize {
        self.records.len()
    }
}

/// type 0x11, longer than 8 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Igmpv3Query {
    /// Max Resp Code as received
    pub max_response_code: u8,

    /// decoded Max Resp Code, in tenths of a second
    pub max_response_time: u32,
    pub checksum: u16,
    pub group: Ipv4Addr,
    pub suppress_router_processing: bool,
    pub qrv: u8,

    /// Querier's Query Interval Code as received
    pub qqic: u8,
    pub sources: Vec<Ipv4Addr>,
}

impl Igmpv3Query {
    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// querier's query interval in seconds
    pub fn query_interval(&self) -> u32 {
        decode_exp_code(self.qqic)
    }

    pub fn is_general_query(&self) -> bool {
        self.group.is_unspecified()
    }
}
