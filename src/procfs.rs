
//! Readers for the kernel's IPv4 multicast routing tables under `/proc/net`.

use crate::consts::VIFF_USE_IFINDEX;
use crate::error::invalid_data;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

pub const IP_MR_VIF_PATH: &str = "/proc/net/ip_mr_vif";
pub const IP_MR_CACHE_PATH: &str = "/proc/net/ip_mr_cache";

/// Converts an address printed by the kernel as a host-order `%08X` integer.
pub fn host_hex_to_ipv4(hex: &str) -> Result<Ipv4Addr, std::io::Error> {
    let value = u32::from_str_radix(hex, 16).map_err(|e| invalid_data(format!("bad address {:?}: {}", hex, e)))?;
    Ok(Ipv4Addr::from(value.to_ne_bytes()))
}

fn field<T: std::str::FromStr>(fields: &[&str], i: usize, line: &str) -> Result<T, std::io::Error>
where
    T::Err: std::fmt::Display,
{
    let raw = fields.get(i).ok_or_else(|| invalid_data(format!("missing field {} in {:?}", i, line)))?;
    raw.parse().map_err(|e| invalid_data(format!("bad field {} in {:?}: {}", i, line, e)))
}

/// One row of `/proc/net/ip_mr_vif`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VifTableEntry {
    pub index: u16,
    pub name: String,
    pub bytes_in: u64,
    pub pkts_in: u64,
    pub bytes_out: u64,
    pub pkts_out: u64,
    pub flags: u32,
    pub local: Ipv4Addr,
    pub remote: Ipv4Addr,
}

impl VifTableEntry {
    /// Interface index the VIF was bound by, when it was added with `VIFF_USE_IFINDEX`.
    /// The kernel then prints the index in the local address column.
    pub fn local_index(&self) -> Option<i32> {
        if self.flags & u32::from(VIFF_USE_IFINDEX) != 0 {
            Some(i32::from_ne_bytes(self.local.octets()))
        } else {
            None
        }
    }
}

pub fn parse_vif_table(content: &str) -> Result<Vec<VifTableEntry>, std::io::Error> {
    let mut vifs = Vec::new();
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 9 {
            return Err(invalid_data(format!("malformed vif line: {:?}", line)));
        }

        vifs.push(VifTableEntry {
            index: field(&fields, 0, line)?,
            name: fields[1].to_string(),
            bytes_in: field(&fields, 2, line)?,
            pkts_in: field(&fields, 3, line)?,
            bytes_out: field(&fields, 4, line)?,
            pkts_out: field(&fields, 5, line)?,
            flags: u32::from_str_radix(fields[6], 16).map_err(|e| invalid_data(format!("bad flags in {:?}: {}", line, e)))?,
            local: host_hex_to_ipv4(fields[7])?,
            remote: host_hex_to_ipv4(fields[8])?,
        });
    }
    Ok(vifs)
}

/// One row of `/proc/net/ip_mr_cache`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfcTableEntry {
    pub group: Ipv4Addr,
    pub origin: Ipv4Addr,

    /// incoming VIF; -1 while unresolved
    pub iif: i16,
    pub packets: u64,
    pub bytes: u64,
    pub wrong_if: u64,

    /// outgoing VIF index to TTL threshold
    pub oifs: BTreeMap<u16, u8>,
}

fn parse_index_ttl(pair: &str) -> Result<(u16, u8), std::io::Error> {
    let (index, ttl) = pair.split_once(':').ok_or_else(|| invalid_data(format!("bad oif {:?}", pair)))?;
    let index = index.parse().map_err(|e| invalid_data(format!("bad oif {:?}: {}", pair, e)))?;
    let ttl = ttl.parse().map_err(|e| invalid_data(format!("bad oif {:?}: {}", pair, e)))?;
    Ok((index, ttl))
}

pub fn parse_mfc_table(content: &str) -> Result<Vec<MfcTableEntry>, std::io::Error> {
    let mut entries = Vec::new();
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 6 {
            return Err(invalid_data(format!("malformed mfc line: {:?}", line)));
        }

        let oifs = fields[6..].iter().map(|pair| parse_index_ttl(pair)).collect::<Result<_, _>>()?;
        entries.push(MfcTableEntry {
            group: host_hex_to_ipv4(fields[0])?,
            origin: host_hex_to_ipv4(fields[1])?,
            iif: field(&fields, 2, line)?,
            packets: field(&fields, 3, line)?,
            bytes: field(&fields, 4, line)?,
            wrong_if: field(&fields, 5, line)?,
            oifs,
        });
    }
    Ok(entries)
}

pub fn read_vif_table<P: AsRef<Path>>(path: P) -> Result<Vec<VifTableEntry>, std::io::Error> {
    parse_vif_table(&std::fs::read_to_string(path)?)
}

pub fn read_mfc_table<P: AsRef<Path>>(path: P) -> Result<Vec<MfcTableEntry>, std::io::Error> {
    parse_mfc_table(&std::fs::read_to_string(path)?)
}

/// Virtual interfaces registered by the active multicast routing daemon.
pub fn ip_mr_vif() -> Result<Vec<VifTableEntry>, std::io::Error> {
    read_vif_table(IP_MR_VIF_PATH)
}

/// The kernel multicast forwarding cache.
pub fn ip_mr_cache() -> Result<Vec<MfcTableEntry>, std::io::Error> {
    read_mfc_table(IP_MR_CACHE_PATH)
}
