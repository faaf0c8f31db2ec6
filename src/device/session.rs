//! Device session
//!
//! A [`Session`] owns everything needed to talk to one device unit: the
//! completion port, the single [`IoRequest`] with its packet buffer and the
//! opened device. Requests are submitted without blocking and resolved with
//! [`Session::await_or_cancel`] or [`Session::wait`].
//!
//! Device completions and cancel events are delivered to the same port, so
//! waiting for "data ready or cancel" is one blocking receive.

use std::mem;
use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, info, warn};

use super::{
    Command, Completion, Device, DeviceError, DeviceInfo, Event, HwAddr, IoError, IoRequest,
    PacketBuffer, MAX_ADDR_BYTES, WIRE_OK,
};

/// Token for the request in flight
///
/// Exactly one exists at a time; it is consumed when the request is
/// resolved.
#[must_use = "a pending request has to be awaited before the next submission"]
#[derive(Debug)]
pub struct Pending {
    command: Command,
}

impl Pending {
    pub fn command(&self) -> Command {
        self.command
    }
}

/// Result of waiting for a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done {
        length: usize,
        status: i32,
    },
    Failed {
        command: Command,
        status: i32,
        wire_status: u32,
    },
    Cancelled,
}

impl Outcome {
    /// Device error equivalent of a failed outcome
    pub fn error(&self) -> Option<DeviceError> {
        match *self {
            Outcome::Failed {
                command,
                status,
                wire_status,
            } => Some(DeviceError::CommandFailed {
                command,
                status,
                wire_status,
            }),
            _ => None,
        }
    }
}

/// Handle to interrupt a session waiting in [`Session::await_or_cancel`]
///
/// Cloneable and usable from any thread, e.g. a Ctrl-C handler.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    port: Sender<Event>,
}

impl CancelSignal {
    pub fn fire(&self) {
        let _ = self.port.send(Event::Cancel);
    }
}

pub struct Session<D: Device> {
    name: String,
    unit: u32,
    capacity: usize,
    info: DeviceInfo,
    port_tx: Sender<Event>,
    port: Option<Receiver<Event>>,
    /// None while the request is with the device
    request: Option<IoRequest>,
    device: Option<D>,
    /// Cancel seen while waiting on a non-cancellable request
    cancel_latched: bool,
}

impl<D: Device> Session<D> {
    /// Open unit `unit` of device `name` with a packet buffer of `mtu` bytes
    ///
    /// The port and request are set up before `opener` runs; if opening
    /// fails they are released again.
    pub fn open<F>(name: &str, unit: u32, mtu: usize, opener: F) -> Result<Self, DeviceError>
    where
        F: FnOnce(&str, u32) -> Result<D, DeviceError>,
    {
        info!("device: {}:{}", name, unit);

        let (port_tx, port) = mpsc::channel();
        let request = IoRequest::new(PacketBuffer::new(mtu));
        let device = opener(name, unit)?;

        let info = device.info().clone();
        info!("[{} ({}.{})]", info.id_string, info.version, info.revision);

        Ok(Session {
            name: name.to_string(),
            unit,
            capacity: mtu,
            info,
            port_tx,
            port: Some(port),
            request: Some(request),
            device: Some(device),
            cancel_latched: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> u32 {
        self.unit
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Packet buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        CancelSignal {
            port: self.port_tx.clone(),
        }
    }

    pub fn go_online(&mut self) -> Result<(), DeviceError> {
        self.command(Command::Online)
    }

    pub fn go_offline(&mut self) -> Result<(), DeviceError> {
        self.command(Command::Offline)
    }

    fn command(&mut self, command: Command) -> Result<(), DeviceError> {
        if self.device.is_some() && self.request.is_none() {
            return Err(DeviceError::Busy);
        }
        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;
        device
            .do_command(command)
            .map_err(|fault| DeviceError::command_failed(command, fault))
    }

    /// Packet buffer contents, unavailable while a request is in flight
    pub fn buffer(&self) -> Option<&[u8]> {
        self.request.as_ref().map(|request| request.data.as_slice())
    }

    pub fn buffer_mut(&mut self) -> Option<&mut [u8]> {
        self.request.as_mut().map(|request| request.data.as_mut_slice())
    }

    /// Source and destination address of the last request
    pub fn addresses(&self) -> Option<(HwAddr, HwAddr)> {
        self.request
            .as_ref()
            .map(|request| (request.src_addr, request.dst_addr))
    }

    /// Exchange source and destination address for the next request
    pub fn swap_addresses(&mut self) {
        if let Some(request) = self.request.as_mut() {
            mem::swap(&mut request.src_addr, &mut request.dst_addr);
        }
    }

    /// Start receiving any frame into the packet buffer
    ///
    /// Addressing and packet type are cleared first, so a frame too short to
    /// carry them leaves them zero.
    pub fn submit_receive(&mut self) -> Result<Pending, DeviceError> {
        let mut request = self.take_request()?;
        request.command = Command::ReadOrphan;
        request.length = request.data.capacity();
        request.packet_type = 0;
        request.src_addr = [0; MAX_ADDR_BYTES];
        request.dst_addr = [0; MAX_ADDR_BYTES];
        self.begin(request)
    }

    /// Start sending the first `length` bytes of the packet buffer
    ///
    /// `length` is clamped to the buffer capacity.
    pub fn submit_send(&mut self, length: usize) -> Result<Pending, DeviceError> {
        let mut request = self.take_request()?;
        request.command = Command::Write;
        request.length = length.min(request.data.capacity());
        self.begin(request)
    }

    fn take_request(&mut self) -> Result<IoRequest, DeviceError> {
        if self.device.is_none() {
            return Err(DeviceError::Closed);
        }
        let mut request = self.request.take().ok_or(DeviceError::Busy)?;
        request.fault = None;
        Ok(request)
    }

    fn begin(&mut self, request: IoRequest) -> Result<Pending, DeviceError> {
        let command = request.command;
        let completion = Completion::new(self.port_tx.clone());
        match self.device.as_mut() {
            Some(device) => device.begin_io(request, completion),
            None => {
                self.request = Some(request);
                return Err(DeviceError::Closed);
            }
        }
        Ok(Pending { command })
    }

    /// Block until the pending request completes or a cancel arrives
    ///
    /// On cancel the request is aborted and awaited before
    /// `Outcome::Cancelled` is returned, so the buffer is back with the
    /// session either way. A cancel latched by [`Session::wait`] counts.
    pub fn await_or_cancel(&mut self, pending: Pending) -> Outcome {
        let mut cancelled = mem::take(&mut self.cancel_latched);
        if cancelled {
            self.abort();
        }

        loop {
            match self.next_event() {
                Event::Cancel => {
                    if !cancelled {
                        cancelled = true;
                        self.abort();
                    }
                }
                Event::Completed(request) => return self.finish(pending, request, cancelled),
                Event::Lost => return self.lost(pending, cancelled),
            }
        }
    }

    /// Block until the pending request completes
    ///
    /// Cancel events arriving meanwhile are kept for the next
    /// [`Session::await_or_cancel`].
    pub fn wait(&mut self, pending: Pending) -> Outcome {
        loop {
            match self.next_event() {
                Event::Cancel => self.cancel_latched = true,
                Event::Completed(request) => return self.finish(pending, request, false),
                Event::Lost => return self.lost(pending, false),
            }
        }
    }

    fn next_event(&self) -> Event {
        self.port
            .as_ref()
            .and_then(|port| port.recv().ok())
            .unwrap_or(Event::Lost)
    }

    fn abort(&mut self) {
        if let Some(device) = self.device.as_mut() {
            device.abort_io();
        }
    }

    fn finish(&mut self, pending: Pending, request: IoRequest, cancelled: bool) -> Outcome {
        let outcome = if cancelled {
            Outcome::Cancelled
        } else {
            match request.fault {
                None => Outcome::Done {
                    length: request.length,
                    status: 0,
                },
                Some(fault) => Outcome::Failed {
                    command: pending.command,
                    status: fault.error.code(),
                    wire_status: fault.wire_error,
                },
            }
        };
        self.request = Some(request);
        outcome
    }

    /// The device dropped the request: start over with a fresh buffer
    fn lost(&mut self, pending: Pending, cancelled: bool) -> Outcome {
        warn!("device {}:{} dropped request cmd={}", self.name, self.unit, pending.command);
        self.request = Some(IoRequest::new(PacketBuffer::new(self.capacity)));
        if cancelled {
            return Outcome::Cancelled;
        }
        Outcome::Failed {
            command: pending.command,
            status: IoError::Software.code(),
            wire_status: WIRE_OK,
        }
    }

    /// Release device, request and port, in that order
    ///
    /// Safe to call repeatedly. A request still with the device is aborted
    /// and collected first.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            if self.request.is_none() {
                warn!("closing {} with a request in flight, aborting it", self.name);
                device.abort_io();
                if let Some(request) = self.collect_request() {
                    self.request = Some(request);
                }
            }
            device.close();
            debug!("device {}:{} closed", self.name, self.unit);
        }
        if self.request.take().is_some() {
            debug!("request released");
        }
        if self.port.take().is_some() {
            debug!("port released");
        }
    }

    fn collect_request(&self) -> Option<IoRequest> {
        let port = self.port.as_ref()?;
        loop {
            match port.recv() {
                Ok(Event::Cancel) => continue,
                Ok(Event::Completed(request)) => return Some(request),
                Ok(Event::Lost) | Err(_) => return None,
            }
        }
    }
}

impl<D: Device> Drop for Session<D> {
    fn drop(&mut self) {
        self.close();
    }
}
