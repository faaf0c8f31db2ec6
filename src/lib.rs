//! Device-level echo responder and protocol dumper
//!
//! This library provides:
//! - a packet device abstraction with one asynchronous request in flight
//!   and cancellation (`device`)
//! - an echo responder that sends every received frame back (`echo`)
//! - Ethernet, ARP, IPv4 and ICMP header access (`network`)
//! - human-readable frame dumps (`dump`)
//! - a UDP echo server (`udp_echo`)

pub mod app;
pub mod config;
pub mod device;
pub mod dump;
pub mod echo;
pub mod network;
pub mod udp_echo;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use device::{CancelSignal, Device, DeviceError, Outcome, Session};
pub use dump::{dump, hex_dump, DumpConfig};
pub use echo::{EchoError, EchoOptions, EchoResponder, EchoStats};
pub use network::icmp::{IcmpHeader, ICMP_TYPE_ECHO_REPLY, ICMP_TYPE_ECHO_REQUEST};
pub use network::ipv4::Ipv4Header;
