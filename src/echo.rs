//! Echo responder
//!
//! Receives every frame the device captures and sends it straight back with
//! source and destination address exchanged. One request is in flight at a
//! time: the send of a frame completes before the next receive is
//! submitted, and only a pending receive can be cancelled.

use log::{error, info, warn};
use thiserror::Error;

use crate::device::{Device, DeviceError, Outcome, Session};
use crate::dump::{dump, hex_dump, DumpConfig};

/// Responder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitingReceive,
    Echoing,
    /// Cancelled by the user
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoOptions {
    pub verbose: bool,
    pub dump: DumpConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EchoStats {
    pub received: u64,
    pub sent: u64,
    /// Frames dropped because the device reported more bytes than the buffer holds
    pub rejected: u64,
}

#[derive(Debug, Error)]
pub enum EchoError {
    #[error("receive failed: {0}")]
    Receive(#[source] DeviceError),
    #[error("send failed: {0}")]
    Send(#[source] DeviceError),
}

pub struct EchoResponder<'a, D: Device> {
    session: &'a mut Session<D>,
    options: EchoOptions,
    state: State,
    stats: EchoStats,
}

impl<'a, D: Device> EchoResponder<'a, D> {
    pub fn new(session: &'a mut Session<D>, options: EchoOptions) -> Self {
        EchoResponder {
            session,
            options,
            state: State::Idle,
            stats: EchoStats::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> EchoStats {
        self.stats
    }

    /// Echo frames until cancelled or an I/O request fails
    ///
    /// A cancel is a normal stop and yields the statistics.
    pub fn run(&mut self) -> Result<EchoStats, EchoError> {
        info!("Waiting for incoming packets...");
        loop {
            let pending = match self.session.submit_receive() {
                Ok(pending) => pending,
                Err(err) => return Err(self.fail(EchoError::Receive(err))),
            };
            self.state = State::AwaitingReceive;

            match self.session.await_or_cancel(pending) {
                Outcome::Cancelled => {
                    self.state = State::Stopped;
                    info!("***Break");
                    return Ok(self.stats);
                }
                Outcome::Done { length, .. } => self.echo(length)?,
                failed => {
                    let err = failed.error().unwrap_or(DeviceError::Closed);
                    return Err(self.fail(EchoError::Receive(err)));
                }
            }
        }
    }

    fn echo(&mut self, length: usize) -> Result<(), EchoError> {
        let capacity = self.session.capacity();
        if length > capacity {
            warn!(
                "device reported {} bytes for a {} byte buffer, frame dropped",
                length, capacity
            );
            self.stats.rejected += 1;
            return Ok(());
        }

        self.state = State::Echoing;
        self.stats.received += 1;
        if self.options.verbose {
            self.report_frame(length);
        }

        // the captured destination becomes our source
        self.session.swap_addresses();

        let pending = match self.session.submit_send(length) {
            Ok(pending) => pending,
            Err(err) => return Err(self.fail(EchoError::Send(err))),
        };
        let outcome = self.session.wait(pending);
        if let Some(err) = outcome.error() {
            return Err(self.fail(EchoError::Send(err)));
        }

        self.stats.sent += 1;
        if self.options.verbose {
            info!("tx");
        }
        Ok(())
    }

    fn report_frame(&self, length: usize) {
        info!("rx");
        let buffer = match self.session.buffer() {
            Some(buffer) => buffer,
            None => return,
        };
        for line in hex_dump(buffer, length) {
            info!("{}", line);
        }
        for line in dump(buffer, length, &self.options.dump) {
            info!("{}", line);
        }
    }

    fn fail(&mut self, err: EchoError) -> EchoError {
        self.state = State::Failed;
        error!("{}", err);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::{MemoryDevice, MemoryHandle};
    use crate::device::{CancelSignal, IoError, IoFault, MAX_ADDR_BYTES};
    use std::thread;
    use std::time::Duration;

    const PEER: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
    const LOCAL: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

    fn open(mtu: usize) -> (Session<MemoryDevice>, MemoryHandle) {
        let (device, handle) = MemoryDevice::new("memory.device");
        let mut session = Session::open("memory.device", 0, mtu, move |_, _| Ok(device)).unwrap();
        session.go_online().unwrap();
        (session, handle)
    }

    fn frame(len: usize) -> Vec<u8> {
        let mut frame: Vec<u8> = (0..len).map(|i| i as u8).collect();
        frame[0..6].copy_from_slice(&LOCAL);
        frame[6..12].copy_from_slice(&PEER);
        frame
    }

    /// Fire `signal` once `sent` frames went out and a receive is waiting
    fn cancel_when_idle(
        handle: MemoryHandle,
        signal: CancelSignal,
        sent: usize,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            while !(handle.read_pending() && handle.sent().len() >= sent) {
                thread::sleep(Duration::from_millis(1));
            }
            signal.fire();
        })
    }

    #[test]
    fn test_echo_swaps_addresses() {
        let (mut session, handle) = open(1500);
        handle.inject(frame(60));
        handle.inject(frame(1500));
        let canceller = cancel_when_idle(handle.clone(), session.cancel_signal(), 2);

        let mut responder = EchoResponder::new(&mut session, EchoOptions::default());
        let stats = responder.run().unwrap();
        assert_eq!(responder.state(), State::Stopped);
        canceller.join().unwrap();

        assert_eq!(
            stats,
            EchoStats {
                received: 2,
                sent: 2,
                rejected: 0
            }
        );
        let sent = handle.sent();
        for (out, len) in sent.iter().zip([60usize, 1500]) {
            assert_eq!(out.data.len(), len);
            assert_eq!(&out.data[0..6], &PEER);
            assert_eq!(&out.data[6..12], &LOCAL);
            assert_eq!(&out.data[12..], &frame(len)[12..]);
            assert_eq!(&out.src_addr[..6], &LOCAL);
            assert_eq!(&out.dst_addr[..6], &PEER);
        }
    }

    #[test]
    fn test_runt_does_not_reuse_previous_addresses() {
        let (mut session, handle) = open(1500);
        handle.inject(frame(60));
        let runt = vec![0x5a; 10];
        handle.inject(runt.clone());
        let canceller = cancel_when_idle(handle.clone(), session.cancel_signal(), 2);

        let stats = EchoResponder::new(&mut session, EchoOptions::default())
            .run()
            .unwrap();
        canceller.join().unwrap();

        assert_eq!(stats.sent, 2);
        let sent = handle.sent();
        assert_eq!(&sent[0].src_addr[..6], &LOCAL);
        assert_eq!(&sent[0].dst_addr[..6], &PEER);
        assert_eq!(sent[1].data, runt);
        assert_eq!(sent[1].src_addr, [0; MAX_ADDR_BYTES]);
        assert_eq!(sent[1].dst_addr, [0; MAX_ADDR_BYTES]);
    }

    #[test]
    fn test_oversized_length_is_not_echoed() {
        let (mut session, handle) = open(64);
        handle.inject_with_length(frame(64), 4000);
        handle.inject(frame(42));
        let canceller = cancel_when_idle(handle.clone(), session.cancel_signal(), 1);

        let stats = EchoResponder::new(&mut session, EchoOptions::default())
            .run()
            .unwrap();
        canceller.join().unwrap();

        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.sent, 1);
        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data.len(), 42);
    }

    #[test]
    fn test_cancel_while_waiting_sends_nothing() {
        let (mut session, handle) = open(1500);
        let canceller = cancel_when_idle(handle.clone(), session.cancel_signal(), 0);

        let stats = EchoResponder::new(&mut session, EchoOptions::default())
            .run()
            .unwrap();
        canceller.join().unwrap();

        assert_eq!(stats, EchoStats::default());
        assert!(handle.sent().is_empty());
        assert_eq!(handle.aborts(), 1);
    }

    #[test]
    fn test_receive_failure_ends_loop() {
        let (mut session, handle) = open(1500);
        handle.fail_next(IoFault::new(IoError::RxFailure, 4));

        let mut responder = EchoResponder::new(&mut session, EchoOptions::default());
        let err = responder.run().unwrap_err();
        assert_eq!(responder.state(), State::Failed);
        assert!(matches!(
            err,
            EchoError::Receive(DeviceError::CommandFailed { wire_status: 4, .. })
        ));
        assert!(handle.sent().is_empty());
    }

    #[test]
    fn test_send_failure_ends_loop() {
        let (mut session, handle) = open(1500);
        handle.inject(frame(42));
        handle.fail_next_send(IoFault::new(IoError::TxFailure, 9));

        let mut responder = EchoResponder::new(&mut session, EchoOptions::default());
        let err = responder.run().unwrap_err();
        assert_eq!(responder.state(), State::Failed);
        assert_eq!(
            err.to_string(),
            "send failed: IO failed: cmd=0003 -> error=11, wire_error=9"
        );
        assert_eq!(responder.stats().received, 1);
        assert_eq!(responder.stats().sent, 0);
    }

    #[test]
    fn test_verbose_run_dumps_without_side_effects() {
        let (mut session, handle) = open(1500);
        handle.inject(frame(42));
        let canceller = cancel_when_idle(handle.clone(), session.cancel_signal(), 1);

        let options = EchoOptions {
            verbose: true,
            dump: DumpConfig::ALL,
        };
        let stats = EchoResponder::new(&mut session, options).run().unwrap();
        canceller.join().unwrap();
        assert_eq!(stats.sent, 1);
        assert_eq!(handle.sent()[0].data.len(), 42);
    }
}
