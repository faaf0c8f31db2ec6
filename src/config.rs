//! Command line configuration

use std::ffi::OsString;

use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::dump::DumpConfig;
use crate::echo::EchoOptions;
use crate::network::ETH_HDR_SIZE;

pub const DEFAULT_DEVICE: &str = "tap";
pub const DEFAULT_MTU: usize = 1500;
pub const MAX_MTU: usize = 65535;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Args(#[from] clap::Error),
    #[error("mtu {0} out of range ({min}..={max})", min = ETH_HDR_SIZE, max = MAX_MTU)]
    InvalidMtu(usize),
}

/// Echo every frame received on a network device back to its sender
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "dev-echo", version)]
pub struct Config {
    /// Device name; the TAP interface opened is <DEVICE><UNIT>
    #[arg(short, long, default_value = DEFAULT_DEVICE)]
    pub device: String,

    #[arg(short, long, default_value_t = 0)]
    pub unit: u32,

    /// Packet buffer size in bytes
    #[arg(short, long, default_value_t = DEFAULT_MTU)]
    pub mtu: usize,

    /// Dump every frame received
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not decode Ethernet headers
    #[arg(long = "no-eth", action = ArgAction::SetFalse)]
    pub eth: bool,

    /// Do not decode ARP packets
    #[arg(long = "no-arp", action = ArgAction::SetFalse)]
    pub arp: bool,

    /// Do not decode IPv4 headers
    #[arg(long = "no-ip", action = ArgAction::SetFalse)]
    pub ip: bool,

    /// Use the in-process device instead of a TAP interface
    #[arg(long)]
    pub memory: bool,
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = <Config as Parser>::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mtu < ETH_HDR_SIZE || self.mtu > MAX_MTU {
            return Err(ConfigError::InvalidMtu(self.mtu));
        }
        Ok(())
    }

    pub fn dump_config(&self) -> DumpConfig {
        DumpConfig {
            eth: self.eth,
            arp: self.arp,
            ip: self.ip,
        }
    }

    pub fn echo_options(&self) -> EchoOptions {
        EchoOptions {
            verbose: self.verbose,
            dump: self.dump_config(),
        }
    }
}
