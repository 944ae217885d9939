
pub mod error;
pub mod consts;
pub mod addr;
pub mod igmp;
pub mod interface;
pub mod procfs;
pub mod config;

#[cfg(target_os = "linux")]
pub mod mroute;
#[cfg(target_os = "linux")]
pub mod router;

pub use error::Error;
