//! Responder session lifecycle
//!
//! open → online → echo until cancelled or failed → offline → close

use log::{error, info};
use thiserror::Error;

use crate::config::Config;
use crate::device::{CancelSignal, Device, DeviceError, Session};
use crate::echo::{EchoError, EchoResponder, EchoStats};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Open(DeviceError),
    #[error("Error going online! {0}")]
    Online(#[source] DeviceError),
    #[error(transparent)]
    Echo(#[from] EchoError),
}

/// Run the echo responder on unit `config.unit` of `config.device`
///
/// `on_open` gets the session's cancel signal right after the device is
/// opened, before it goes online. Once online, going offline and closing
/// are attempted whatever the responder's result; an offline failure is
/// logged and does not change the result.
pub fn run<D, F, C>(config: &Config, opener: F, on_open: C) -> Result<EchoStats, AppError>
where
    D: Device,
    F: FnOnce(&str, u32) -> Result<D, DeviceError>,
    C: FnOnce(CancelSignal),
{
    let mut session =
        Session::open(&config.device, config.unit, config.mtu, opener).map_err(AppError::Open)?;
    on_open(session.cancel_signal());

    if let Err(err) = session.go_online() {
        session.close();
        return Err(AppError::Online(err));
    }

    let result = EchoResponder::new(&mut session, config.echo_options()).run();
    if let Ok(stats) = &result {
        info!("{} frames echoed, {} rejected", stats.sent, stats.rejected);
    }

    if let Err(err) = session.go_offline() {
        error!("Error going offline! {}", err);
    }
    session.close();

    result.map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::MemoryDevice;
    use crate::device::{Command, IoError, IoFault};

    fn config() -> Config {
        Config::from_args(["dev-echo", "--memory"]).unwrap()
    }

    #[test]
    fn test_online_failure_skips_offline() {
        let (device, handle) = MemoryDevice::new("memory.device");
        handle.fail_command(Command::Online, IoFault::new(IoError::BadState, 1));

        let err = run(&config(), move |_, _| Ok(device), |_| {}).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error going online! IO failed: cmd=0013 -> error=4, wire_error=1"
        );
        assert_eq!(handle.commands(), vec![Command::Online]);
        assert!(handle.is_closed());
    }

    #[test]
    fn test_offline_failure_keeps_result() {
        let (device, handle) = MemoryDevice::new("memory.device");
        handle.fail_command(Command::Offline, IoFault::new(IoError::BadState, 0));

        let stats = run(&config(), move |_, _| Ok(device), |signal| signal.fire()).unwrap();
        assert_eq!(stats, EchoStats::default());
        assert_eq!(handle.commands(), vec![Command::Online, Command::Offline]);
        assert!(handle.is_closed());
    }

    #[test]
    fn test_loop_failure_still_goes_offline() {
        let (device, handle) = MemoryDevice::new("memory.device");
        handle.fail_next(IoFault::new(IoError::RxFailure, 0));

        let err = run(&config(), move |_, _| Ok(device), |_| {}).unwrap_err();
        assert!(matches!(err, AppError::Echo(EchoError::Receive(_))));
        assert_eq!(handle.commands(), vec![Command::Online, Command::Offline]);
        assert!(handle.is_closed());
    }
}
