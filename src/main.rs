//! Device echo responder
//!
//! Opens a network device, puts it online and sends every frame it receives
//! back to where it came from until Ctrl-C.
//!
//! ```sh
//! cargo run -- --device tap --unit 0 --verbose
//! ```
//!
//! Note: opening a TAP interface requires root or CAP_NET_ADMIN.

use std::process::ExitCode;

use anyhow::Context;
use log::{error, info};

use dev_echo::app::{self, AppError};
use dev_echo::device::memory::MemoryDevice;
use dev_echo::device::tap::TapDevice;
use dev_echo::{CancelSignal, Config, ConfigError};

fn install_cancel(signal: CancelSignal) {
    if let Err(e) = ctrlc::set_handler(move || signal.fire()).context("installing Ctrl-C handler") {
        error!("{:#}", e);
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(ConfigError::Args(e)) => e.exit(),
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    let result = if config.memory {
        info!("using the in-process device, nothing will arrive");
        app::run(
            &config,
            |name, _| Ok(MemoryDevice::new(name).0),
            install_cancel,
        )
    } else {
        app::run(&config, TapDevice::open, install_cancel)
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        // the responder has logged the failed request
        Err(AppError::Echo(_)) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
