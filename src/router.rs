
use crate::config::Config;
use crate::consts::MAXVIFS;
use crate::error::invalid_data;
use crate::igmp::control::{ControlMessage, ControlMessageType};
use crate::interface::Interface;
use crate::mroute::{self, FlushFlags, MfcCtl, VifCtl, VifLocal};
use crate::Error;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VifEntry {
    pub vifi: u16,
    pub name: String,
    pub if_index: u32,
    pub threshold: u8,
}

/// VIF indices handed out to the enabled phyints, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VifTable {
    vifs: Vec<VifEntry>,
}

impl VifTable {
    pub fn from_config(config: &Config, interfaces: &BTreeMap<String, Interface>) -> Result<Self, std::io::Error> {
        let mut vifs = Vec::new();
        for phyint in config.enabled_phyints() {
            if vifs.len() >= MAXVIFS {
                return Err(invalid_data(format!("more than {} phyints enabled", MAXVIFS)));
            }
            let interface = interfaces.get(&phyint.name).ok_or_else(|| invalid_data(format!("phyint {} does not exist", phyint.name)))?;
            vifs.push(VifEntry {
                vifi: vifs.len() as u16,
                name: phyint.name.clone(),
                if_index: interface.index,
                threshold: phyint.ttl_threshold,
            });
        }
        Ok(Self { vifs })
    }

    pub fn len(&self) -> usize {
        self.vifs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vifs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VifEntry> {
        self.vifs.iter()
    }

    pub fn vifi(&self, name: &str) -> Option<u16> {
        self.vifs.iter().find(|v| v.name == name).map(|v| v.vifi)
    }

    pub fn get(&self, vifi: u16) -> Option<&VifEntry> {
        self.vifs.get(vifi as usize)
    }

    pub fn vif_ctls(&self) -> Vec<VifCtl> {
        self.vifs.iter()
            .map(|v| VifCtl::new(v.vifi, VifLocal::Index(v.if_index as i32)).with_threshold(v.threshold))
            .collect()
    }

    /// Per-VIF TTL vector forwarding to the named phyints.
    pub fn ttls(&self, outgoing: &[String]) -> Result<Vec<u8>, std::io::Error> {
        let mut ttls = vec![0u8; self.vifs.len()];
        for name in outgoing {
            let vifi = self.vifi(name).ok_or_else(|| invalid_data(format!("no vif for phyint {}", name)))?;
            ttls[vifi as usize] = self.vifs[vifi as usize].threshold.max(1);
        }
        Ok(ttls)
    }
}

/// (*,G) route waiting for traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRoute {
    pub group: Ipv4Addr,
    pub ttls: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    static_routes: Vec<MfcCtl>,

    /// keyed by incoming VIF
    dynamic_routes: BTreeMap<u16, Vec<DynamicRoute>>,
}

impl RouteTable {
    pub fn from_config(config: &Config, vifs: &VifTable) -> Result<Self, std::io::Error> {
        let mut table = Self::default();
        for mroute in &config.mroute {
            let parent = vifs.vifi(&mroute.from).ok_or_else(|| invalid_data(format!("no vif for phyint {}", mroute.from)))?;
            let ttls = vifs.ttls(&mroute.to)?;
            if mroute.is_dynamic() {
                let routes = table.dynamic_routes.entry(parent).or_default();
                match routes.iter_mut().find(|r| r.group == mroute.group) {
                    Some(existing) => existing.ttls = ttls,
                    None => routes.push(DynamicRoute { group: mroute.group, ttls }),
                }
            } else {
                table.static_routes.push(MfcCtl::new(mroute.source, mroute.group, parent, ttls));
            }
        }
        Ok(table)
    }

    pub fn static_routes(&self) -> &[MfcCtl] {
        &self.static_routes
    }

    pub fn dynamic_routes(&self) -> &BTreeMap<u16, Vec<DynamicRoute>> {
        &self.dynamic_routes
    }

    pub fn match_dynamic(&self, vifi: u16, group: Ipv4Addr) -> Option<&DynamicRoute> {
        self.dynamic_routes.get(&vifi)?.iter().find(|r| r.group == group)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Router {
    vifs: VifTable,
    routes: RouteTable,
}

impl Router {
    pub fn new(vifs: VifTable, routes: RouteTable) -> Self {
        Self { vifs, routes }
    }

    pub fn from_config(config: &Config, interfaces: &BTreeMap<String, Interface>) -> Result<Self, std::io::Error> {
        config.validate_interfaces(interfaces)?;
        let vifs = VifTable::from_config(config, interfaces)?;
        let routes = RouteTable::from_config(config, &vifs)?;
        Ok(Self { vifs, routes })
    }

    pub fn vifs(&self) -> &VifTable {
        &self.vifs
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Programs VIFs and static MFC entries into the kernel.
    pub fn install<F: AsRawFd>(&self, fd: &F, flush: bool) -> Result<(), Error> {
        if flush {
            mroute::flush(fd, FlushFlags::all())?;
        }
        for vif in self.vifs.vif_ctls() {
            mroute::add_vif(fd, &vif)?;
        }
        for mfc in self.routes.static_routes() {
            mroute::add_mfc(fd, mfc)?;
        }
        log::info!("installed {} vifs and {} static routes", self.vifs.len(), self.routes.static_routes().len());
        Ok(())
    }

    /// Removes everything `install` added.
    pub fn uninstall<F: AsRawFd>(&self, fd: &F) -> Result<(), Error> {
        mroute::flush(fd, FlushFlags::all())
    }

    /// MFC entry that answers a cache-miss upcall, if a dynamic route covers it.
    pub fn resolve(&self, msg: &ControlMessage) -> Option<MfcCtl> {
        let vifi = msg.vif as u16;
        let route = self.routes.match_dynamic(vifi, msg.dst_addr)?;
        Some(MfcCtl::new(msg.src_addr, msg.dst_addr, vifi, route.ttls.clone()))
    }

    pub fn handle_control<F: AsRawFd>(&self, fd: &F, msg: &ControlMessage) -> Result<Option<MfcCtl>, Error> {
        match msg.kind() {
            ControlMessageType::NoCache => {
                let Some(mfc) = self.resolve(msg) else {
                    log::debug!("no route for ({}, {}) on vif {}", msg.src_addr, msg.dst_addr, msg.vif);
                    return Ok(None);
                };
                mroute::add_mfc(fd, &mfc)?;
                Ok(Some(mfc))
            }

            ControlMessageType::WrongVif | ControlMessageType::WholePacket | ControlMessageType::WrongVifWhole => {
                log::debug!("ignoring {:?} for ({}, {}) on vif {}", msg.kind(), msg.src_addr, msg.dst_addr, msg.vif);
                Ok(None)
            }

            ControlMessageType::Unknown(t) => {
                log::warn!("unknown control message type {}", t);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[[phyint]]
name = "eth0"

[[phyint]]
name = "eth1"
ttl_threshold = 3

[[phyint]]
name = "eth2"
enabled = false

[[phyint]]
name = "eth3"

[[mroute]]
from = "eth0"
group = "239.1.1.1"
source = "10.0.0.5"
to = ["eth1", "eth3"]

[[mroute]]
from = "eth0"
group = "239.0.0.4"
to = ["eth1"]
"#;

    fn host() -> BTreeMap<String, Interface> {
        let flags = (libc::IFF_UP | libc::IFF_MULTICAST) as u32;
        ["eth0", "eth1", "eth2", "eth3"].iter().enumerate().map(|(i, name)| {
            (name.to_string(), Interface {
                name: name.to_string(),
                index: 10 + i as u32,
                flags,
                addresses: vec![format!("10.{}.0.1", i).parse().unwrap()],
            })
        }).collect()
    }

    fn router() -> Router {
        let config = Config::parse(CONFIG).unwrap();
        Router::from_config(&config, &host()).unwrap()
    }

    fn nocache(vif: u8, src: Ipv4Addr, group: Ipv4Addr) -> ControlMessage {
        ControlMessage { msg_type: 1, mbz: 0, vif, src_addr: src, dst_addr: group }
    }

    #[test]
    fn vifs_skip_disabled_phyints() {
        let router = router();
        let vifs = router.vifs();
        assert_eq!(vifs.len(), 3);
        assert_eq!(vifs.vifi("eth0"), Some(0));
        assert_eq!(vifs.vifi("eth1"), Some(1));
        assert_eq!(vifs.vifi("eth2"), None);
        assert_eq!(vifs.vifi("eth3"), Some(2));
        assert_eq!(vifs.get(2).unwrap().if_index, 13);

        let ctls = vifs.vif_ctls();
        assert_eq!(ctls[1].local, VifLocal::Index(11));
        assert_eq!(ctls[1].threshold, 3);
    }

    #[test]
    fn routes_split_static_and_dynamic() {
        let router = router();
        let routes = router.routes();
        assert_eq!(routes.static_routes().len(), 1);
        let mfc = &routes.static_routes()[0];
        assert_eq!(mfc.origin, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(mfc.parent, 0);
        assert_eq!(mfc.ttls, vec![0, 3, 1]);

        let dynamic = routes.match_dynamic(0, Ipv4Addr::new(239, 0, 0, 4)).unwrap();
        assert_eq!(dynamic.ttls, vec![0, 3, 0]);
        assert!(routes.match_dynamic(1, Ipv4Addr::new(239, 0, 0, 4)).is_none());
    }

    #[test]
    fn nocache_resolves_dynamic_route() {
        let router = router();
        let mfc = router.resolve(&nocache(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(239, 0, 0, 4))).unwrap();
        assert_eq!(mfc.origin, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(mfc.group, Ipv4Addr::new(239, 0, 0, 4));
        assert_eq!(mfc.parent, 0);
        assert_eq!(mfc.ttls, vec![0, 3, 0]);

        assert!(router.resolve(&nocache(0, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(239, 9, 9, 9))).is_none());
        assert!(router.resolve(&nocache(2, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(239, 0, 0, 4))).is_none());
    }

    #[test]
    fn missing_host_interface_is_an_error() {
        let config = Config::parse(CONFIG).unwrap();
        let mut host = host();
        host.remove("eth3");
        assert!(Router::from_config(&config, &host).is_err());
    }
}
