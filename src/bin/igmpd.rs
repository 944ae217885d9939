
use igmpd::config::ConfigManager;
use igmpd::igmp::{AsyncIgmpSocket, IgmpParser, RawIgmpSocket, RoutingMessage};
use igmpd::interface;
use igmpd::mroute;
use igmpd::procfs;
use igmpd::router::Router;

use clap::{Parser, Subcommand};
use parking_lot::RwLock;

use std::path::PathBuf;
use std::sync::Arc;


fn main() {
    env_logger::init();
    let args = Cli::parse();
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async move {
        match args.subcmd {
            Command::Start => start(ConfigManager::new(&args.config)).await,
            Command::ShowVifs => show_vifs(),
            Command::ShowMfc => show_mfc(),
            Command::Interfaces => show_interfaces(),
            Command::Constants => {
                for (name, value) in igmpd::consts::KERNEL_CONSTANTS {
                    println!("{:<24} {:#x}", name, value);
                }
                Ok(())
            }
        }
    });

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn start(config: ConfigManager) -> Result<(), std::io::Error> {
    if let Err(e) = config.load().await {
        log::warn!("Failed to load configuration: {}", e);
    }

    if !config.is_loaded() {
        log::warn!("Configuration not loaded, waiting til configured");
        let mut loaded = config.subscribe();
        let retry = config.clone();
        tokio::spawn(async move {
            while !retry.is_loaded() {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                let _ = retry.load().await;
            }
        });
        if !igmpd::config::wait_for_change(&mut loaded).await {
            return Err(std::io::Error::other("configuration manager closed"));
        }
    }
    log::info!("Configuration loaded");

    let config_data = config.get().ok_or_else(|| std::io::Error::other("configuration vanished"))?;
    log::debug!("Configuration: {:?}", config_data);

    let router = Router::from_config(&config_data, &interface::interfaces_by_name()?)?;

    let raw_socket = RawIgmpSocket::new()?;
    mroute::enable_mrt(&raw_socket)?;
    match mroute::mrt_version(&raw_socket) {
        Ok(version) => log::info!("Kernel multicast routing version {:#06x}", version),
        Err(e) => log::warn!("Failed to query MRT version: {}", e),
    }
    if config_data.global.pim {
        mroute::enable_pim(&raw_socket)?;
    } else {
        mroute::disable_pim(&raw_socket)?;
    }
    router.install(&raw_socket, config_data.global.flush_on_start)?;

    let socket = raw_socket.into_async()?;
    let state = Arc::new(RwLock::new(router));

    enable_config_reloader(config.clone());
    spawn_route_updater(config, socket.clone(), state.clone());

    tokio::select! {
        res = serve(&socket, &state) => {
            if let Err(e) = res {
                log::error!("Receive loop failed: {}", e);
            }
        }

        res = shutdown_signal() => {
            res?;
            log::info!("Shutting down");
        }
    }

    state.read().uninstall(&socket)?;
    mroute::disable_mrt(&socket)?;
    Ok(())
}

fn enable_config_reloader(config: ConfigManager) {
    tokio::spawn(async move {
        let mut signal = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(e) => {
                log::error!("Failed to install SIGHUP handler: {}", e);
                return;
            }
        };
        loop {
            signal.recv().await;
            log::info!("Received SIGHUP, reloading configuration");
            if let Err(e) = config.load().await {
                log::warn!("Failed to reload configuration: {}", e);
            }
        }
    });
}

/// Reprograms the kernel whenever the configuration changes.
fn spawn_route_updater(config: ConfigManager, socket: AsyncIgmpSocket, state: Arc<RwLock<Router>>) {
    tokio::spawn(async move {
        let mut changes = config.subscribe();
        while igmpd::config::wait_for_change(&mut changes).await {
            let Some(config_data) = config.get() else {
                continue;
            };
            let router = match interface::interfaces_by_name()
                .map_err(std::io::Error::from)
                .and_then(|interfaces| Router::from_config(&config_data, &interfaces))
            {
                Ok(router) => router,
                Err(e) => {
                    log::error!("Keeping previous routes, new configuration rejected: {}", e);
                    continue;
                }
            };

            let mut current = state.write();
            if let Err(e) = current.uninstall(&socket) {
                log::error!("Failed to remove previous routes: {}", e);
            }
            if let Err(e) = router.install(&socket, false) {
                log::error!("Failed to install routes: {}", e);
            }
            *current = router;
        }
    });
}

async fn serve(socket: &AsyncIgmpSocket, state: &RwLock<Router>) -> Result<(), std::io::Error> {
    let mut parser = Box::new(IgmpParser::new());
    loop {
        socket.recv_parser(&mut parser).await?;
        let message = match parser.parse() {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Failed to parse packet from {}: {}", parser.packet().src_addr, e);
                continue;
            }
        };

        match message {
            RoutingMessage::Control(msg) => {
                log::info!("Control message received: {:?}", msg);
                let result = state.read().handle_control(socket, &msg);
                match result {
                    Ok(Some(mfc)) => log::info!("Resolved ({}, {}) from vif {}", mfc.origin, mfc.group, mfc.parent),
                    Ok(None) => {}
                    Err(e) => log::error!("Failed to handle control message: {}", e),
                }
            }

            RoutingMessage::Igmp { header, packet } => {
                log::debug!("IGMP {} -> {}: {:?}", header.src_addr, header.dst_addr, packet);
            }

            RoutingMessage::Other { header } => {
                log::debug!("Skipping protocol {} packet from {}", header.protocol, header.src_addr);
            }
        }
    }
}

async fn shutdown_signal() -> Result<(), std::io::Error> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

fn show_vifs() -> Result<(), std::io::Error> {
    println!("{:>3} {:<16} {:>10} {:>8} {:>10} {:>8} {:>5} {:<15} {:<15}", "vif", "interface", "bytes_in", "pkts_in", "bytes_out", "pkts_out", "flags", "local", "remote");
    for vif in procfs::ip_mr_vif()? {
        println!(
            "{:>3} {:<16} {:>10} {:>8} {:>10} {:>8} {:>5x} {:<15} {:<15}",
            vif.index, vif.name, vif.bytes_in, vif.pkts_in, vif.bytes_out, vif.pkts_out, vif.flags, vif.local, vif.remote,
        );
    }
    Ok(())
}

fn show_mfc() -> Result<(), std::io::Error> {
    for entry in procfs::ip_mr_cache()? {
        let oifs = entry.oifs.iter().map(|(vif, ttl)| format!("{}:{}", vif, ttl)).collect::<Vec<_>>().join(" ");
        println!(
            "({}, {}) iif {} pkts {} bytes {} wrong_if {} oifs [{}]",
            entry.origin, entry.group, entry.iif, entry.packets, entry.bytes, entry.wrong_if, oifs,
        );
    }
    Ok(())
}

fn show_interfaces() -> Result<(), std::io::Error> {
    for (name, iface) in interface::interfaces_by_name()? {
        let multicast = if iface.is_multicast() { "multicast" } else { "-" };
        println!("{} ({}) {} {:?}", name, iface.index, multicast, iface.addresses);
    }
    Ok(())
}


/// IGMP static multicast routing daemon
#[derive(Debug, Clone, Parser)]
#[clap(name = "igmpd", version, about)]
pub struct Cli {
    /// Path to the configuration file
    #[clap(short, long, default_value = igmpd::config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub subcmd: Command,
}

#[derive(Debug, Clone, Subcommand)]
#[non_exhaustive]
pub enum Command {
    /// start the daemon
    Start,

    /// print the kernel VIF table
    ShowVifs,

    /// print the kernel multicast forwarding cache
    ShowMfc,

    /// list multicast-capable interfaces and their addresses
    Interfaces,

    /// print the multicast routing constants of this platform
    Constants,
}
