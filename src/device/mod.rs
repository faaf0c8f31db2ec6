//! Packet device abstraction
//!
//! A [`Device`] executes one asynchronous [`IoRequest`] at a time. The
//! request owns the packet buffer while the device works on it and is handed
//! back through a [`Completion`] when it finishes, fails or is aborted.
//! Online/offline transitions are synchronous commands.
//!
//! Backends:
//! - [`tap::TapDevice`]: a Linux TAP interface
//! - [`memory::MemoryDevice`]: an in-process device fed from a handle

pub mod memory;
pub mod session;
pub mod tap;

use std::fmt;
use std::sync::mpsc::Sender;

use thiserror::Error;

pub use session::{CancelSignal, Outcome, Pending, Session};

/// Largest hardware address a request can carry
pub const MAX_ADDR_BYTES: usize = 16;

/// Wire status reported when the medium has nothing more specific to say
pub const WIRE_OK: u32 = 0;

pub type HwAddr = [u8; MAX_ADDR_BYTES];

/// Device commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Read = 0x0002,
    Write = 0x0003,
    ReadOrphan = 0x000e,
    Online = 0x0013,
    Offline = 0x0014,
}

impl Command {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.code())
    }
}

/// Generic completion status of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    Aborted,
    BadLength,
    NoResources,
    BadState,
    Offline,
    TxFailure,
    RxFailure,
    Software,
}

impl IoError {
    /// Numeric status as printed in diagnostics
    pub fn code(self) -> i32 {
        match self {
            IoError::Aborted => -2,
            IoError::BadLength => -4,
            IoError::NoResources => 1,
            IoError::BadState => 4,
            IoError::Offline => 10,
            IoError::TxFailure => 11,
            IoError::RxFailure => 12,
            IoError::Software => 9,
        }
    }
}

/// Status of a failed request: generic error plus medium-specific wire error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoFault {
    pub error: IoError,
    pub wire_error: u32,
}

impl IoFault {
    pub fn new(error: IoError, wire_error: u32) -> Self {
        IoFault { error, wire_error }
    }

    /// Fault for an OS level I/O error, keeping the errno as wire status
    pub fn from_io(error: IoError, err: &std::io::Error) -> Self {
        let wire_error = err.raw_os_error().map_or(WIRE_OK, |code| code as u32);
        IoFault { error, wire_error }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device {name} unit {unit} not found")]
    NotFound { name: String, unit: u32 },
    #[error("error opening device({name},{unit}): {reason}")]
    OpenFailed {
        name: String,
        unit: u32,
        reason: String,
    },
    #[error("IO failed: cmd={command} -> error={status}, wire_error={wire_status}")]
    CommandFailed {
        command: Command,
        status: i32,
        wire_status: u32,
    },
    #[error("an I/O request is already in flight")]
    Busy,
    #[error("device is closed")]
    Closed,
}

impl DeviceError {
    pub fn command_failed(command: Command, fault: IoFault) -> Self {
        DeviceError::CommandFailed {
            command,
            status: fault.error.code(),
            wire_status: fault.wire_error,
        }
    }
}

/// Fixed-capacity packet buffer, zeroed at allocation
#[derive(Debug)]
pub struct PacketBuffer {
    data: Box<[u8]>,
}

impl PacketBuffer {
    pub fn new(capacity: usize) -> Self {
        PacketBuffer {
            data: vec![0u8; capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// One I/O operation against a device
#[derive(Debug)]
pub struct IoRequest {
    pub command: Command,
    pub data: PacketBuffer,
    /// Requested length on submission, resulting length on completion
    pub length: usize,
    pub packet_type: u16,
    pub src_addr: HwAddr,
    pub dst_addr: HwAddr,
    pub fault: Option<IoFault>,
}

impl IoRequest {
    pub fn new(data: PacketBuffer) -> Self {
        IoRequest {
            command: Command::Read,
            length: 0,
            data,
            packet_type: 0,
            src_addr: [0; MAX_ADDR_BYTES],
            dst_addr: [0; MAX_ADDR_BYTES],
            fault: None,
        }
    }

    /// Finish the request with a failure
    pub fn fail(&mut self, fault: IoFault) {
        self.fault = Some(fault);
    }
}

/// Events arriving at a session's port
#[derive(Debug)]
pub(crate) enum Event {
    Completed(IoRequest),
    /// The device dropped a request without completing it
    Lost,
    Cancel,
}

/// Reply path for an asynchronous request
///
/// Handed to the device together with the request; consumed when the
/// request is returned. Dropping it unanswered reports the request as lost,
/// so the session never waits for it forever.
#[derive(Debug)]
pub struct Completion {
    port: Option<Sender<Event>>,
}

impl Completion {
    pub(crate) fn new(port: Sender<Event>) -> Self {
        Completion { port: Some(port) }
    }

    /// Return the finished request to its session
    pub fn reply(mut self, request: IoRequest) {
        if let Some(port) = self.port.take() {
            // a closed port means the session is gone and nobody waits
            let _ = port.send(Event::Completed(request));
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(port) = self.port.take() {
            let _ = port.send(Event::Lost);
        }
    }
}

/// Identification of an opened device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id_string: String,
    pub version: u16,
    pub revision: u16,
    /// Significant bytes of a hardware address
    pub addr_size: usize,
}

/// A packet device that runs at most one asynchronous request at a time
pub trait Device: Send {
    fn info(&self) -> &DeviceInfo;

    /// Execute a synchronous command such as online or offline
    fn do_command(&mut self, command: Command) -> Result<(), IoFault>;

    /// Start `request`; the device must eventually hand it to `completion`
    ///
    /// A completion dropped without a reply fails the request with
    /// `IoError::Software` and costs the session its buffer contents.
    fn begin_io(&mut self, request: IoRequest, completion: Completion);

    /// Ask the device to finish the request in flight early with
    /// `IoError::Aborted`. The request still arrives through its completion.
    fn abort_io(&mut self);

    /// Release device resources
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        assert_eq!(Command::Write.to_string(), "0003");
        assert_eq!(Command::Online.to_string(), "0013");
    }

    #[test]
    fn test_command_failed_message() {
        let err = DeviceError::command_failed(Command::Online, IoFault::new(IoError::Offline, 3));
        assert_eq!(err.to_string(), "IO failed: cmd=0013 -> error=10, wire_error=3");
    }

    #[test]
    fn test_packet_buffer_zeroed() {
        let buf = PacketBuffer::new(1500);
        assert_eq!(buf.capacity(), 1500);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fault_from_io() {
        let err = std::io::Error::from_raw_os_error(5);
        let fault = IoFault::from_io(IoError::RxFailure, &err);
        assert_eq!(fault.wire_error, 5);
        let other = std::io::Error::new(std::io::ErrorKind::Other, "x");
        assert_eq!(IoFault::from_io(IoError::RxFailure, &other).wire_error, WIRE_OK);
    }
}
