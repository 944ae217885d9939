
use igmpd::igmp::socket::RawIgmpSocket;
use igmpd::igmp::{IgmpPacket, IgmpParser, RoutingMessage};
use igmpd::mroute;

fn main() -> std::io::Result<()> {
    env_logger::init();
    let socket = RawIgmpSocket::new()?;
    mroute::enable_mrt(&socket)?;
    let mut parser = Box::new(IgmpParser::new());
    loop {
        socket.recv_parser(&mut parser)?;
        print!("[{}] ({} bytes)", parser.packet().src_addr, parser.packet().data_len);

        match parser.parse() {
            Ok(RoutingMessage::Control(msg)) => {
                print!(" kernel {:?}: {:?}", msg.kind(), msg);
            }

            Ok(RoutingMessage::Igmp { header, packet }) => {
                print!(" {} -> {} (ttl: {})", header.src_addr, header.dst_addr, header.ttl);
                match packet {
                    IgmpPacket::Legacy(msg) => {
                        print!(" {:?} {:?}", msg.kind(), msg);
                    }

                    IgmpPacket::V3Query(query) => {
                        print!(" IGMPv3 query (max resp {}, qqi {}s) {:?}", query.max_response_time, query.query_interval(), query);
                    }

                    IgmpPacket::V3Report(report) => {
                        print!(" IGMPv3 report {:?}", report);
                    }

                    other => {
                        print!(" {:?}", other);
                    }
                }
            }

            Ok(RoutingMessage::Other { header }) => {
                print!(" protocol {} {} -> {}", header.protocol, header.src_addr, header.dst_addr);
            }

            Err(e) => {
                print!(" IGMP <err: {}>", e);
            }
        }
        println!();
    }
}
