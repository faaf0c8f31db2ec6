//! UDP echo server
//!
//! Socket-level counterpart of the device echo responder: every datagram
//! received on the bound port is sent back to its sender unchanged. Useful
//! to test a host's IP stack end to end.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};
use socket2::{Domain, Protocol, Socket, Type};

pub const DEFAULT_PORT: u16 = 6800;

/// How often a blocked receive looks at the run flag
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpEchoStats {
    pub datagrams: u64,
    pub bytes: u64,
}

pub struct UdpEcho {
    socket: UdpSocket,
    buf: Vec<u8>,
    verbose: bool,
}

impl UdpEcho {
    /// Bind to `addr` with a receive buffer of `mtu` bytes
    ///
    /// The address is reusable, so a restart can bind the same port again
    /// right away.
    pub fn bind(addr: SocketAddr, mtu: usize, verbose: bool) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        info!("Bound to port {}", socket.local_addr()?.port());
        Ok(UdpEcho {
            socket,
            buf: vec![0u8; mtu],
            verbose,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Whether SO_REUSEADDR is set on the bound socket
    pub fn socket_reuses_address(&self) -> io::Result<bool> {
        socket2::SockRef::from(&self.socket).reuse_address()
    }

    /// Echo datagrams while `running` is set
    pub fn run(&mut self, running: &AtomicBool) -> io::Result<UdpEchoStats> {
        let mut stats = UdpEchoStats::default();
        while running.load(Ordering::Acquire) {
            let (n, peer) = match self.socket.recv_from(&mut self.buf) {
                Ok(received) => received,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e),
            };
            if self.verbose {
                info!("Got {} bytes from {}", n, peer);
            }

            let sent = self.socket.send_to(&self.buf[..n], peer)?;
            if sent != n {
                warn!("short send to {}: {} of {} bytes", peer, sent, n);
            }
            stats.datagrams += 1;
            stats.bytes += sent as u64;
        }
        info!("***Break");
        Ok(stats)
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
