
//! Kernel multicast routing control: virtual interfaces (VIFs) and the multicast
//! forwarding cache (MFC). Every call operates on a socket that has MRT enabled.

use crate::consts::*;
use crate::igmp::socket::{getsockopt_int, setsockopt, Ipv4Opt};
use crate::Error;

use std::ffi::c_int;
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;

/// size of `struct vifctl`
pub const VIFCTL_LEN: usize = 16;

/// size of `struct mfcctl`
pub const MFCCTL_LEN: usize = 60;

/// How a VIF is bound to a local interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VifLocal {
    Address(Ipv4Addr),
    Index(i32),
}

impl VifLocal {
    /// Accepts either a dotted quad or a decimal interface index.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if let Ok(addr) = s.parse::<Ipv4Addr>() {
            return Ok(VifLocal::Address(addr));
        }
        s.parse::<i32>().map(VifLocal::Index).map_err(|_| Error::InvalidAddressFormat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VifCtl {
    pub vifi: u16,
    pub flags: u8,
    pub threshold: u8,
    pub rate_limit: u32,
    pub local: VifLocal,
    pub remote: Ipv4Addr,
}

impl VifCtl {
    pub fn new(vifi: u16, local: VifLocal) -> Self {
        Self {
            vifi,
            flags: 0,
            threshold: 1,
            rate_limit: 0,
            local,
            remote: Ipv4Addr::UNSPECIFIED,
        }
    }

    pub fn from_local_str(vifi: u16, local: &str) -> Result<Self, Error> {
        Ok(Self::new(vifi, VifLocal::parse(local)?))
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// flags as handed to the kernel; index binding implies `VIFF_USE_IFINDEX`
    pub fn effective_flags(&self) -> u8 {
        match self.local {
            VifLocal::Index(_) => self.flags | VIFF_USE_IFINDEX,
            VifLocal::Address(_) => self.flags & !VIFF_USE_IFINDEX,
        }
    }

    /// `struct vifctl` in host layout.
    pub fn to_bytes(&self) -> [u8; VIFCTL_LEN] {
        let mut buf = [0u8; VIFCTL_LEN];
        buf[0..2].copy_from_slice(&self.vifi.to_ne_bytes());
        buf[2] = self.effective_flags();
        buf[3] = self.threshold;
        buf[4..8].copy_from_slice(&self.rate_limit.to_ne_bytes());
        match self.local {
            VifLocal::Address(addr) => buf[8..12].copy_from_slice(&addr.octets()),
            VifLocal::Index(index) => buf[8..12].copy_from_slice(&index.to_ne_bytes()),
        }
        buf[12..16].copy_from_slice(&self.remote.octets());
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfcCtl {
    pub origin: Ipv4Addr,
    pub group: Ipv4Addr,
    pub parent: u16,

    /// per-VIF TTL threshold, indexed by VIF; 0 means do not forward
    pub ttls: Vec<u8>,
    pub expire: i32,
}

impl MfcCtl {
    pub fn new(origin: Ipv4Addr, group: Ipv4Addr, parent: u16, ttls: Vec<u8>) -> Self {
        Self { origin, group, parent, ttls, expire: 0 }
    }

    /// `struct mfcctl` in host layout. TTLs beyond `MAXVIFS` are dropped.
    pub fn to_bytes(&self) -> [u8; MFCCTL_LEN] {
        let mut buf = [0u8; MFCCTL_LEN];
        buf[0..4].copy_from_slice(&self.origin.octets());
        buf[4..8].copy_from_slice(&self.group.octets());
        buf[8..10].copy_from_slice(&self.parent.to_ne_bytes());
        let n = self.ttls.len().min(MAXVIFS);
        buf[10..10 + n].copy_from_slice(&self.ttls[..n]);
        // pkt_cnt, byte_cnt and wrong_if at 44..56 are output only
        buf[56..60].copy_from_slice(&self.expire.to_ne_bytes());
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushFlags(c_int);

impl FlushFlags {
    pub const MFC: Self = Self(MRT_FLUSH_MFC);
    pub const MFC_STATIC: Self = Self(MRT_FLUSH_MFC_STATIC);
    pub const VIFS: Self = Self(MRT_FLUSH_VIFS);
    pub const VIFS_STATIC: Self = Self(MRT_FLUSH_VIFS_STATIC);

    /// Builds the mask from the three switches the daemon exposes.
    pub fn new(vifs: bool, mfc: bool, include_static: bool) -> Self {
        let mut flags = 0;
        if vifs {
            flags |= MRT_FLUSH_VIFS;
            if include_static {
                flags |= MRT_FLUSH_VIFS_STATIC;
            }
        }
        if mfc {
            flags |= MRT_FLUSH_MFC;
            if include_static {
                flags |= MRT_FLUSH_MFC_STATIC;
            }
        }
        Self(flags)
    }

    pub fn all() -> Self {
        Self::new(true, true, true)
    }

    pub fn bits(&self) -> c_int {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FlushFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VifCounters {
    pub in_packets: u64,
    pub out_packets: u64,
    pub in_bytes: u64,
    pub out_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SgCounters {
    pub packets: u64,
    pub bytes: u64,
    pub wrong_if: u64,
}

#[repr(C)]
struct SiocVifReq {
    vifi: u16,
    icount: libc::c_ulong,
    ocount: libc::c_ulong,
    ibytes: libc::c_ulong,
    obytes: libc::c_ulong,
}

#[repr(C)]
struct SiocSgReq {
    src: libc::in_addr,
    grp: libc::in_addr,
    pktcnt: libc::c_ulong,
    bytecnt: libc::c_ulong,
    wrong_if: libc::c_ulong,
}

fn set_int<F: AsRawFd>(fd: &F, opt: Ipv4Opt, value: c_int) -> Result<(), Error> {
    unsafe { setsockopt(fd.as_raw_fd(), opt, &value) }?;
    Ok(())
}

/// Makes this socket the kernel's multicast routing socket.
pub fn enable_mrt<F: AsRawFd>(fd: &F) -> Result<(), Error> {
    set_int(fd, Ipv4Opt::MRT_INIT, 1)?;
    log::debug!("multicast routing enabled on fd {}", fd.as_raw_fd());
    Ok(())
}

pub fn disable_mrt<F: AsRawFd>(fd: &F) -> Result<(), Error> {
    set_int(fd, Ipv4Opt::MRT_DONE, 1)?;
    log::debug!("multicast routing disabled on fd {}", fd.as_raw_fd());
    Ok(())
}

/// `MRT_VERSION`, e.g. 0x0305
pub fn mrt_version<F: AsRawFd>(fd: &F) -> Result<c_int, Error> {
    Ok(getsockopt_int(fd.as_raw_fd(), Ipv4Opt::MRT_VERSION)?)
}

pub fn enable_pim<F: AsRawFd>(fd: &F) -> Result<(), Error> {
    set_int(fd, Ipv4Opt::MRT_PIM, 1)
}

pub fn disable_pim<F: AsRawFd>(fd: &F) -> Result<(), Error> {
    set_int(fd, Ipv4Opt::MRT_PIM, 0)
}

pub fn pim_is_enabled<F: AsRawFd>(fd: &F) -> Result<bool, Error> {
    Ok(getsockopt_int(fd.as_raw_fd(), Ipv4Opt::MRT_PIM)? != 0)
}

pub fn set_assert<F: AsRawFd>(fd: &F, enabled: bool) -> Result<(), Error> {
    set_int(fd, Ipv4Opt::MRT_ASSERT, if enabled { 1 } else { 0 })
}

/// Selects the routing table; must precede `enable_mrt`.
pub fn set_table<F: AsRawFd>(fd: &F, table: u32) -> Result<(), Error> {
    unsafe { setsockopt(fd.as_raw_fd(), Ipv4Opt::MRT_TABLE, &table) }?;
    Ok(())
}

pub fn flush<F: AsRawFd>(fd: &F, flags: FlushFlags) -> Result<(), Error> {
    set_int(fd, Ipv4Opt::MRT_FLUSH, flags.bits())?;
    log::debug!("flushed multicast routing state (flags {:#x})", flags.bits());
    Ok(())
}

pub fn add_vif<F: AsRawFd>(fd: &F, vif: &VifCtl) -> Result<(), Error> {
    let raw = vif.to_bytes();
    unsafe { setsockopt(fd.as_raw_fd(), Ipv4Opt::MRT_ADD_VIF, &raw) }?;
    log::info!("added vif {} ({:?})", vif.vifi, vif.local);
    Ok(())
}

pub fn del_vif<F: AsRawFd>(fd: &F, vifi: u16) -> Result<(), Error> {
    let raw = VifCtl::new(vifi, VifLocal::Address(Ipv4Addr::UNSPECIFIED)).to_bytes();
    unsafe { setsockopt(fd.as_raw_fd(), Ipv4Opt::MRT_DEL_VIF, &raw) }?;
    log::info!("deleted vif {}", vifi);
    Ok(())
}

pub fn add_mfc<F: AsRawFd>(fd: &F, mfc: &MfcCtl) -> Result<(), Error> {
    if mfc.ttls.len() > MAXVIFS {
        log::warn!("mfc ({}, {}) has {} ttls, truncating to {}", mfc.origin, mfc.group, mfc.ttls.len(), MAXVIFS);
    }
    let raw = mfc.to_bytes();
    unsafe { setsockopt(fd.as_raw_fd(), Ipv4Opt::MRT_ADD_MFC, &raw) }?;
    log::info!("added mfc ({}, {}) iif {}", mfc.origin, mfc.group, mfc.parent);
    Ok(())
}

pub fn del_mfc<F: AsRawFd>(fd: &F, origin: Ipv4Addr, group: Ipv4Addr, parent: u16) -> Result<(), Error> {
    let raw = MfcCtl::new(origin, group, parent, Vec::new()).to_bytes();
    unsafe { setsockopt(fd.as_raw_fd(), Ipv4Opt::MRT_DEL_MFC, &raw) }?;
    log::info!("deleted mfc ({}, {}) iif {}", origin, group, parent);
    Ok(())
}

pub fn vif_counters<F: AsRawFd>(fd: &F, vifi: u16) -> Result<VifCounters, Error> {
    let mut req = SiocVifReq { vifi, icount: 0, ocount: 0, ibytes: 0, obytes: 0 };
    let code = unsafe { libc::ioctl(fd.as_raw_fd(), SIOCGETVIFCNT as _, &mut req as *mut SiocVifReq) };
    if code < 0 {
        return Err(Error::last_os_error());
    }
    Ok(VifCounters {
        in_packets: req.icount as u64,
        out_packets: req.ocount as u64,
        in_bytes: req.ibytes as u64,
        out_bytes: req.obytes as u64,
    })
}

pub fn sg_counters<F: AsRawFd>(fd: &F, source: Ipv4Addr, group: Ipv4Addr) -> Result<SgCounters, Error> {
    let mut req = SiocSgReq {
        src: libc::in_addr { s_addr: u32::from_ne_bytes(source.octets()) },
        grp: libc::in_addr { s_addr: u32::from_ne_bytes(group.octets()) },
        pktcnt: 0,
        bytecnt: 0,
        wrong_if: 0,
    };
    let code = unsafe { libc::ioctl(fd.as_raw_fd(), SIOCGETSGCNT as _, &mut req as *mut SiocSgReq) };
    if code < 0 {
        return Err(Error::last_os_error());
    }
    Ok(SgCounters {
        packets: req.pktcnt as u64,
        bytes: req.bytecnt as u64,
        wrong_if: req.wrong_if as u64,
    })
}
