
//! Conversion between network-order address bytes and their text form.

use crate::Error;

use std::net::{Ipv4Addr, Ipv6Addr};

/// maximum length of a dotted-quad string, including the terminating NUL
pub const INET_ADDRSTRLEN: usize = 16;

/// maximum length of an IPv6 address string, including the terminating NUL
pub const INET6_ADDRSTRLEN: usize = 46;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    pub fn from_raw(family: libc::c_int) -> Option<Self> {
        match family {
            libc::AF_INET => Some(AddressFamily::Inet),
            libc::AF_INET6 => Some(AddressFamily::Inet6),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> libc::c_int {
        match self {
            AddressFamily::Inet => libc::AF_INET,
            AddressFamily::Inet6 => libc::AF_INET6,
        }
    }

    /// length of the binary address
    pub fn addr_len(&self) -> usize {
        match self {
            AddressFamily::Inet => 4,
            AddressFamily::Inet6 => 16,
        }
    }
}

/// Renders 4 or 16 network-order bytes as canonical address text.
pub fn format_addr(bytes: &[u8]) -> Result<String, Error> {
    let text = match bytes.len() {
        4 => Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string(),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Ipv6Addr::from(octets).to_string()
        }
        _ => return Err(Error::AddressConversionError),
    };

    if text.len() >= INET6_ADDRSTRLEN {
        return Err(Error::AddressConversionError);
    }
    Ok(text)
}

/// Parses address text of the given family into network-order bytes.
pub fn parse_addr(family: AddressFamily, text: &str) -> Result<Vec<u8>, Error> {
    match family {
        AddressFamily::Inet => Ok(parse_ipv4(text)?.octets().to_vec()),
        AddressFamily::Inet6 => {
            let addr: Ipv6Addr = text.parse().map_err(|_| Error::InvalidAddressFormat)?;
            Ok(addr.octets().to_vec())
        }
    }
}

pub fn parse_ipv4(text: &str) -> Result<Ipv4Addr, Error> {
    text.parse().map_err(|_| Error::InvalidAddressFormat)
}

/// Reads an IPv4 address at `offset`, failing with `BufferTooShort(what)` if it does not fit.
pub fn read_ipv4(buf: &[u8], offset: usize, what: &'static str) -> Result<Ipv4Addr, Error> {
    match buf.get(offset..offset.saturating_add(4)) {
        Some(b) => Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3])),
        None => Err(Error::BufferTooShort(what)),
    }
}
