
use crate::Error;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};

pub fn index_to_name(index: libc::c_uint) -> Result<String, std::io::Error> {
    let ifname_buf = [0u8; libc::IFNAMSIZ];
    let ret = unsafe { libc::if_indextoname(index, ifname_buf.as_ptr() as *mut libc::c_char) };
    if ret.is_null() {
        return Err(std::io::Error::last_os_error());
    }

    let name = unsafe { std::ffi::CStr::from_ptr(ret as *const libc::c_char) };
    Ok(name.to_string_lossy().into_owned())
}

pub fn name_to_index(name: &str) -> Result<libc::c_uint, std::io::Error> {
    nix::net::if_::if_nametoindex(name).map_err(std::io::Error::from)
}

/// One address assignment reported by `getifaddrs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub index: u32,

    /// `IFF_*` bits
    pub flags: u32,
    pub address: IpAddr,
}

/// All addresses of one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub index: u32,
    pub flags: u32,
    pub addresses: Vec<IpAddr>,
}

impl Interface {
    pub fn is_multicast(&self) -> bool {
        self.flags & libc::IFF_MULTICAST as u32 != 0
    }

    pub fn is_up(&self) -> bool {
        self.flags & libc::IFF_UP as u32 != 0
    }

    pub fn is_loopback(&self) -> bool {
        self.flags & libc::IFF_LOOPBACK as u32 != 0
    }

    pub fn ipv4_addresses(&self) -> impl Iterator<Item = std::net::Ipv4Addr> + '_ {
        self.addresses.iter().filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    pub fn has_address(&self, addr: IpAddr) -> bool {
        self.addresses.contains(&addr)
    }
}

/// Lists every IPv4/IPv6 address assignment on the host. Entries without an
/// address (e.g. link-layer records) are skipped.
pub fn network_interfaces() -> Result<Vec<NetworkInterface>, Error> {
    let addrs = getifaddrs().map_err(std::io::Error::from)?;
    let mut interfaces = Vec::new();
    for ifaddr in addrs {
        let address = match ifaddr.address {
            Some(storage) => {
                if let Some(sin) = storage.as_sockaddr_in() {
                    IpAddr::V4(*SocketAddrV4::from(*sin).ip())
                } else if let Some(sin6) = storage.as_sockaddr_in6() {
                    IpAddr::V6(*SocketAddrV6::from(*sin6).ip())
                } else {
                    continue;
                }
            }
            None => continue,
        };

        let index = match name_to_index(&ifaddr.interface_name) {
            Ok(index) => index,
            Err(e) => {
                log::warn!("failed to get index of {}: {}", ifaddr.interface_name, e);
                continue;
            }
        };

        interfaces.push(NetworkInterface {
            name: ifaddr.interface_name,
            index,
            flags: flags_bits(ifaddr.flags),
            address,
        });
    }
    Ok(interfaces)
}

fn flags_bits(flags: InterfaceFlags) -> u32 {
    flags.bits() as u32
}

/// Groups address entries by interface name. Flags and index come from the first entry seen.
pub fn group_by_name(entries: Vec<NetworkInterface>) -> BTreeMap<String, Interface> {
    let mut interfaces: BTreeMap<String, Interface> = BTreeMap::new();
    for entry in entries {
        match interfaces.get_mut(&entry.name) {
            Some(interface) => interface.addresses.push(entry.address),
            None => {
                interfaces.insert(entry.name.clone(), Interface {
                    name: entry.name,
                    index: entry.index,
                    flags: entry.flags,
                    addresses: vec![entry.address],
                });
            }
        }
    }
    interfaces
}

pub fn interfaces_by_name() -> Result<BTreeMap<String, Interface>, Error> {
    Ok(group_by_name(network_interfaces()?))
}
