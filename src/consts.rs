
//! Linux multicast routing API values (`linux/mroute.h`, `linux/sockios.h`).

use std::ffi::c_int;

pub const MRT_BASE: c_int = 200;
pub const MRT_INIT: c_int = MRT_BASE;
pub const MRT_DONE: c_int = MRT_BASE + 1;
pub const MRT_ADD_VIF: c_int = MRT_BASE + 2;
pub const MRT_DEL_VIF: c_int = MRT_BASE + 3;
pub const MRT_ADD_MFC: c_int = MRT_BASE + 4;
pub const MRT_DEL_MFC: c_int = MRT_BASE + 5;
pub const MRT_VERSION: c_int = MRT_BASE + 6;
pub const MRT_ASSERT: c_int = MRT_BASE + 7;
pub const MRT_PIM: c_int = MRT_BASE + 8;
pub const MRT_TABLE: c_int = MRT_BASE + 9;
pub const MRT_ADD_MFC_PROXY: c_int = MRT_BASE + 10;
pub const MRT_DEL_MFC_PROXY: c_int = MRT_BASE + 11;
pub const MRT_FLUSH: c_int = MRT_BASE + 12;
pub const MRT_MAX: c_int = MRT_BASE + 12;

pub const MRT_FLUSH_MFC: c_int = 1;
pub const MRT_FLUSH_MFC_STATIC: c_int = 2;
pub const MRT_FLUSH_VIFS: c_int = 4;
pub const MRT_FLUSH_VIFS_STATIC: c_int = 8;

pub const VIFF_TUNNEL: u8 = 0x1;
pub const VIFF_SRCRT: u8 = 0x2;
pub const VIFF_REGISTER: u8 = 0x4;
pub const VIFF_USE_IFINDEX: u8 = 0x8;

pub const MAXVIFS: usize = 32;

const SIOCPROTOPRIVATE: c_int = 0x89E0;
pub const SIOCGETVIFCNT: c_int = SIOCPROTOPRIVATE;
pub const SIOCGETSGCNT: c_int = SIOCPROTOPRIVATE + 1;
pub const SIOCGETRPF: c_int = SIOCPROTOPRIVATE + 2;

pub const IGMPMSG_NOCACHE: u8 = 1;
pub const IGMPMSG_WRONGVIF: u8 = 2;
pub const IGMPMSG_WHOLEPKT: u8 = 3;
pub const IGMPMSG_WRVIFWHOLE: u8 = 4;

pub const INADDR_ANY: u32 = 0;

/// Named kernel constants, for tools that print or look them up by name.
pub static KERNEL_CONSTANTS: &[(&str, i64)] = &[
    ("MRT_BASE", MRT_BASE as i64),
    ("MRT_INIT", MRT_INIT as i64),
    ("MRT_DONE", MRT_DONE as i64),
    ("MRT_ADD_VIF", MRT_ADD_VIF as i64),
    ("MRT_DEL_VIF", MRT_DEL_VIF as i64),
    ("MRT_ADD_MFC", MRT_ADD_MFC as i64),
    ("MRT_DEL_MFC", MRT_DEL_MFC as i64),
    ("MRT_VERSION", MRT_VERSION as i64),
    ("MRT_ASSERT", MRT_ASSERT as i64),
    ("MRT_PIM", MRT_PIM as i64),
    ("MRT_TABLE", MRT_TABLE as i64),
    ("MRT_ADD_MFC_PROXY", MRT_ADD_MFC_PROXY as i64),
    ("MRT_DEL_MFC_PROXY", MRT_DEL_MFC_PROXY as i64),
    ("MRT_FLUSH", MRT_FLUSH as i64),
    ("MRT_MAX", MRT_MAX as i64),
    ("MRT_FLUSH_MFC", MRT_FLUSH_MFC as i64),
    ("MRT_FLUSH_MFC_STATIC", MRT_FLUSH_MFC_STATIC as i64),
    ("MRT_FLUSH_VIFS", MRT_FLUSH_VIFS as i64),
    ("MRT_FLUSH_VIFS_STATIC", MRT_FLUSH_VIFS_STATIC as i64),
    ("VIFF_TUNNEL", VIFF_TUNNEL as i64),
    ("VIFF_SRCRT", VIFF_SRCRT as i64),
    ("VIFF_REGISTER", VIFF_REGISTER as i64),
    ("VIFF_USE_IFINDEX", VIFF_USE_IFINDEX as i64),
    ("MAXVIFS", MAXVIFS as i64),
    ("SIOCGETVIFCNT", SIOCGETVIFCNT as i64),
    ("SIOCGETSGCNT", SIOCGETSGCNT as i64),
    ("SIOCGETRPF", SIOCGETRPF as i64),
    ("IGMPMSG_NOCACHE", IGMPMSG_NOCACHE as i64),
    ("IGMPMSG_WRONGVIF", IGMPMSG_WRONGVIF as i64),
    ("IGMPMSG_WHOLEPKT", IGMPMSG_WHOLEPKT as i64),
    ("IGMPMSG_WRVIFWHOLE", IGMPMSG_WRVIFWHOLE as i64),
    ("INADDR_ANY", INADDR_ANY as i64),
    ("IPPROTO_IGMP", libc::IPPROTO_IGMP as i64),
    ("IPPROTO_IP", libc::IPPROTO_IP as i64),
];

pub fn lookup(name: &str) -> Option<i64> {
    KERNEL_CONSTANTS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}
