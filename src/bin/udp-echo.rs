//! UDP echo server
//!
//! ```sh
//! cargo run --bin udp-echo -- --port 6800 --verbose
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;

use dev_echo::udp_echo::{UdpEcho, DEFAULT_PORT};

#[derive(Debug, Parser)]
#[command(name = "udp-echo", version)]
struct Opt {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(short, long, default_value_t = 1500)]
    mtu: usize,
    /// Log every datagram
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opt = Opt::parse();

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, opt.port));
    let mut server = UdpEcho::bind(addr, opt.mtu, opt.verbose)
        .with_context(|| format!("Error binding UDP socket to port {}", opt.port))?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::Release);
    })
    .context("installing Ctrl-C handler")?;

    let stats = server.run(&running)?;
    info!("{} datagrams echoed, {} bytes", stats.datagrams, stats.bytes);
    Ok(())
}
