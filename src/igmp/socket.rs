
use super::packet;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use socket2::{Domain, Protocol, Socket, Type};

use std::ffi::c_int;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

/// Raw `IPPROTO_IGMP` socket. Once MRT is enabled on it, it doubles as the kernel's
/// multicast routing socket.
#[derive(Debug)]
pub struct RawIgmpSocket {
    socket: Socket,
}

impl RawIgmpSocket {
    pub fn new() -> Result<Self, std::io::Error> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::from(libc::IPPROTO_IGMP)))?;
        Ok(Self { socket })
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), std::io::Error> {
        self.socket.set_nonblocking(nonblocking)
    }

    fn ip_mreq(&self, group: Ipv4Addr, interface: Ipv4Addr) -> libc::ip_mreq {
        libc::ip_mreq {
            imr_multiaddr: libc::in_addr { s_addr: u32::from_ne_bytes(group.octets()) },
            imr_interface: libc::in_addr { s_addr: u32::from_ne_bytes(interface.octets()) },
        }
    }

    pub fn join_multicast(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<(), std::io::Error> {
        let mreq = self.ip_mreq(group, interface);
        unsafe { setsockopt(self.as_raw_fd(), Ipv4Opt::IP_ADD_MEMBERSHIP, &mreq) }
    }

    pub fn leave_multicast(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<(), std::io::Error> {
        let mreq = self.ip_mreq(group, interface);
        unsafe { setsockopt(self.as_raw_fd(), Ipv4Opt::IP_DROP_MEMBERSHIP, &mreq) }
    }

    pub fn set_multicast_ttl(&self, ttl: u8) -> Result<(), std::io::Error> {
        let ttl = ttl as c_int;
        unsafe { setsockopt(self.as_raw_fd(), Ipv4Opt::IP_MULTICAST_TTL, &ttl) }
    }

    pub fn set_multicast_loop(&self, loopback: bool) -> Result<(), std::io::Error> {
        let loopback: c_int = if loopback { 1 } else { 0 };
        unsafe { setsockopt(self.as_raw_fd(), Ipv4Opt::IP_MULTICAST_LOOP, &loopback) }
    }

    pub fn set_multicast_interface(&self, interface: Ipv4Addr) -> Result<(), std::io::Error> {
        let addr = libc::in_addr { s_addr: u32::from_ne_bytes(interface.octets()) };
        unsafe { setsockopt(self.as_raw_fd(), Ipv4Opt::IP_MULTICAST_IF, &addr) }
    }

    pub fn set_multicast_all(&self, all: bool) -> Result<(), std::io::Error> {
        let all: c_int = if all { 1 } else { 0 };
        unsafe { setsockopt(self.as_raw_fd(), Ipv4Opt::IP_MULTICAST_ALL, &all) }
    }

    /// Receives one datagram: either an IPv4 packet or a kernel upcall.
    pub fn recv(&self, packet: &mut packet::Packet) -> Result<(), std::io::Error> {
        let mut src: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut src_len = std::mem::size_of_val(&src) as libc::socklen_t;
        let len = unsafe {
            libc::recvfrom(
                self.as_raw_fd(),
                packet.data.as_mut_ptr() as *mut libc::c_void,
                packet.data.len(),
                0,
                &mut src as *mut _ as *mut libc::sockaddr,
                &mut src_len,
            )
        };
        if len < 0 {
            return Err(std::io::Error::last_os_error());
        }

        packet.data_len = (len as usize).min(packet.data.len());
        packet.src_addr = Ipv4Addr::from(src.sin_addr.s_addr.to_ne_bytes());
        Ok(())
    }

    pub fn recv_parser(&self, parser: &mut super::IgmpParser) -> Result<(), std::io::Error> {
        self.recv(&mut parser.packet)
    }

    pub fn into_async(self) -> Result<AsyncIgmpSocket, std::io::Error> {
        AsyncIgmpSocket::new(self)
    }
}

impl AsRawFd for RawIgmpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

#[derive(Debug, Clone)]
pub struct AsyncIgmpSocket {
    inner: Arc<AsyncFd<RawIgmpSocket>>,
}

impl AsyncIgmpSocket {
    pub fn new(socket: RawIgmpSocket) -> Result<Self, std::io::Error> {
        socket.set_nonblocking(true)?;
        let inner = Arc::new(AsyncFd::with_interest(socket, Interest::READABLE)?);
        Ok(Self { inner })
    }

    pub fn get_ref(&self) -> &RawIgmpSocket {
        self.inner.get_ref()
    }

    pub async fn recv(&self, packet: &mut packet::Packet) -> Result<(), std::io::Error> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|inner| inner.get_ref().recv(packet)) {
                Ok(res) => {
                    return res;
                }

                Err(_) => continue,
            }
        }
    }

    pub async fn recv_parser(&self, parser: &mut super::IgmpParser) -> Result<(), std::io::Error> {
        self.recv(&mut parser.packet).await
    }
}

impl AsRawFd for AsyncIgmpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.get_ref().as_raw_fd()
    }
}

pub trait SocketOpt {
    fn level(&self) -> c_int;
    fn optname(&self) -> c_int;
}

/// `IPPROTO_IP` level options, including the multicast routing (`MRT_*`) set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Opt(c_int);

impl SocketOpt for Ipv4Opt {
    fn level(&self) -> c_int {
        libc::IPPROTO_IP
    }

    fn optname(&self) -> c_int {
        self.0
    }
}

impl Ipv4Opt {
    pub const IP_ADD_MEMBERSHIP: Self = Self(libc::IP_ADD_MEMBERSHIP);
    pub const IP_DROP_MEMBERSHIP: Self = Self(libc::IP_DROP_MEMBERSHIP);
    pub const IP_MULTICAST_TTL: Self = Self(libc::IP_MULTICAST_TTL);
    pub const IP_MULTICAST_LOOP: Self = Self(libc::IP_MULTICAST_LOOP);
    pub const IP_MULTICAST_IF: Self = Self(libc::IP_MULTICAST_IF);
    pub const IP_MULTICAST_ALL: Self = Self(libc::IP_MULTICAST_ALL);

    pub const MRT_INIT: Self = Self(crate::consts::MRT_INIT);
    pub const MRT_DONE: Self = Self(crate::consts::MRT_DONE);
    pub const MRT_ADD_VIF: Self = Self(crate::consts::MRT_ADD_VIF);
    pub const MRT_DEL_VIF: Self = Self(crate::consts::MRT_DEL_VIF);
    pub const MRT_ADD_MFC: Self = Self(crate::consts::MRT_ADD_MFC);
    pub const MRT_DEL_MFC: Self = Self(crate::consts::MRT_DEL_MFC);
    pub const MRT_VERSION: Self = Self(crate::consts::MRT_VERSION);
    pub const MRT_ASSERT: Self = Self(crate::consts::MRT_ASSERT);
    pub const MRT_PIM: Self = Self(crate::consts::MRT_PIM);
    pub const MRT_TABLE: Self = Self(crate::consts::MRT_TABLE);
    pub const MRT_FLUSH: Self = Self(crate::consts::MRT_FLUSH);
}

/// # Safety
/// `T` must have the layout the kernel expects for `opt`.
pub(crate) unsafe fn setsockopt<T: Sized, O: SocketOpt>(fd: RawFd, opt: O, optval: &T) -> Result<(), std::io::Error> {
    let code = unsafe {
        libc::setsockopt(fd, opt.level(), opt.optname(), optval as *const _ as *const libc::c_void, std::mem::size_of::<T>() as libc::socklen_t)
    };
    if code < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn getsockopt_int<O: SocketOpt>(fd: RawFd, opt: O) -> Result<c_int, std::io::Error> {
    let mut value: c_int = 0;
    let mut len = std::mem::size_of::<c_int>() as libc::socklen_t;
    let code = unsafe {
        libc::getsockopt(fd, opt.level(), opt.optname(), &mut value as *mut _ as *mut libc::c_void, &mut len)
    };
    if code < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mrt_options_sit_on_ip_level() {
        assert_eq!(Ipv4Opt::MRT_INIT.level(), libc::IPPROTO_IP);
        assert_eq!(Ipv4Opt::MRT_INIT.optname(), 200);
        assert_eq!(Ipv4Opt::MRT_FLUSH.optname(), 212);
        assert_eq!(Ipv4Opt::IP_ADD_MEMBERSHIP.optname(), libc::IP_ADD_MEMBERSHIP);
    }
}
