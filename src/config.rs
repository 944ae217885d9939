
use crate::error::invalid_data;
use crate::interface::Interface;

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use parking_lot::RwLock;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/igmpd.toml";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: Arc<PathBuf>,
    config: Arc<RwLock<Option<Config>>>,
    broadcast: tokio::sync::broadcast::Sender<()>,
}

impl ConfigManager {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let config = None;
        Self {
            config_path: Arc::new(path),
            config: Arc::new(RwLock::new(config)),
            broadcast: tokio::sync::broadcast::channel(1).0,
        }
    }

    fn notify_change(&self) {
        let _ = self.broadcast.send(());
    }

    pub async fn load(&self) -> Result<(), std::io::Error> {
        tokio::task::block_in_place(|| {
            let config = Config::from_file(self.config_path.as_ref())?;
            let result = Some(config);
            let orig = std::mem::replace(&mut *self.config.write(), result.clone());
            if orig != result {
                self.notify_change();
            }
            Ok(())
        })
    }

    pub fn get(&self) -> Option<Config> {
        self.config.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.config.read().is_some()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.broadcast.subscribe()
    }
}

/// Waits until the configuration has changed. Returns `false` once the manager is gone.
///
/// A lagged receiver still counts as a change: `ConfigManager::get` always yields the latest value.
pub async fn wait_for_change(changes: &mut tokio::sync::broadcast::Receiver<()>) -> bool {
    use tokio::sync::broadcast::error::RecvError;

    match changes.recv().await {
        Ok(()) => true,
        Err(RecvError::Lagged(n)) => {
            log::debug!("Skipped {} configuration change notifications", n);
            true
        }
        Err(RecvError::Closed) => false,
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub phyint: Vec<PhyintConfig>,

    #[serde(default)]
    pub mroute: Vec<MrouteConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(file)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, std::io::Error> {
        let config: Config = toml::from_str(content).map_err(std::io::Error::other)?;
        config.validate()?;
        Ok(config)
    }

    pub fn phyint(&self, name: &str) -> Option<&PhyintConfig> {
        self.phyint.iter().find(|p| p.name == name)
    }

    pub fn enabled_phyints(&self) -> impl Iterator<Item = &PhyintConfig> {
        self.phyint.iter().filter(|p| p.enabled)
    }

    /// Checks internal consistency: unique phyints, multicast groups, and mroutes
    /// that only reference enabled phyints.
    pub fn validate(&self) -> Result<(), std::io::Error> {
        let mut names = HashSet::new();
        for phyint in &self.phyint {
            if !names.insert(phyint.name.as_str()) {
                return Err(invalid_data(format!("phyint {} defined twice", phyint.name)));
            }
        }

        for mroute in &self.mroute {
            if !mroute.group.is_multicast() {
                return Err(invalid_data(format!("invalid group address {}", mroute.group)));
            }
            if mroute.to.is_empty() {
                return Err(invalid_data(format!("mroute for {} has no outgoing phyint", mroute.group)));
            }
            for name in std::iter::once(&mroute.from).chain(mroute.to.iter()) {
                match self.phyint(name) {
                    None => return Err(invalid_data(format!("phyint {} not defined", name))),
                    Some(p) if !p.enabled => return Err(invalid_data(format!("phyint {} not enabled", name))),
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Checks enabled phyints against the host: they must exist, carry an address, and be multicast capable.
    pub fn validate_interfaces(&self, interfaces: &BTreeMap<String, Interface>) -> Result<(), std::io::Error> {
        for phyint in self.enabled_phyints() {
            let interface = interfaces.get(&phyint.name).ok_or_else(|| invalid_data(format!("phyint {} does not exist", phyint.name)))?;
            if interface.addresses.is_empty() {
                return Err(invalid_data(format!("phyint {} has no addresses", phyint.name)));
            }
            if !interface.is_multicast() {
                return Err(invalid_data(format!("phyint {} is not multicast capable", phyint.name)));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_threshold() -> u8 {
    1
}

fn default_source() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// flush VIFs and MFC entries, static ones included, on start
    #[serde(default = "default_true")]
    pub flush_on_start: bool,

    #[serde(default)]
    pub pim: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            flush_on_start: true,
            pim: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PhyintConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_threshold")]
    pub ttl_threshold: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MrouteConfig {
    pub from: String,
    pub group: Ipv4Addr,

    #[serde(default = "default_source")]
    pub source: Ipv4Addr,
    pub to: Vec<String>,
}

impl MrouteConfig {
    /// (*,G) route, installed on demand when the kernel reports a cache miss
    pub fn is_dynamic(&self) -> bool {
        self.source.is_unspecified()
    }
}
