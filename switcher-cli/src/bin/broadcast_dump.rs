//! Dumps every datagram arriving on the discovery port as hex, marking
//! the ones that validate as status broadcasts. Handy when checking what
//! a new device model actually sends.

use std::error::Error;
use switcher_lib::constants::DISCOVERY_PORT;
use switcher_lib::packet::{BroadcastFrame, is_broadcast};
use tokio::net::UdpSocket;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let socket = UdpSocket::bind(("0.0.0.0", DISCOVERY_PORT)).await?;
    println!("Dumping datagrams on udp/{DISCOVERY_PORT} (ctrl-c to stop)...");

    let mut buf = vec![0u8; 2048];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        let data = &buf[..len];
        println!("{from} {len}B: {}", hex::encode(data));
        if is_broadcast(data) {
            let status = BroadcastFrame::try_from(bytes::Bytes::copy_from_slice(data))?.decode();
            println!("  -> {status}");
        }
    }
}
