
use igmpd::interface;

fn main() -> std::io::Result<()> {
    env_logger::init();
    for iface in interface::network_interfaces()? {
        println!("Interface: {} ({}) flags {:#x} {}", iface.name, iface.index, iface.flags, iface.address);
    }
    Ok(())
}
