//! In-process packet device
//!
//! [`MemoryDevice`] behaves like an Ethernet device without any hardware:
//! inbound frames are injected through a [`MemoryHandle`], outbound frames
//! are recorded there. Reads with no frame available stay pending until a
//! frame is injected or the read is aborted.
//!
//! The handle can also make the device misbehave (fail requests or
//! commands, report wrong lengths, stall sends), which is what the session
//! and responder tests use it for.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;

use super::{
    Command, Completion, Device, DeviceInfo, HwAddr, IoError, IoFault, IoRequest, WIRE_OK,
};
use crate::network::ethernet::{self, ETH_HDR_SIZE};
use crate::network::{get_word, read_addr, MAC_LEN};

/// Wire status for frames that do not fit the request buffer
pub const WIRE_MTU_EXCEEDED: u32 = 6;

/// A frame recorded by a write request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub data: Vec<u8>,
    pub src_addr: HwAddr,
    pub dst_addr: HwAddr,
}

#[derive(Debug)]
struct Inbound {
    data: Vec<u8>,
    reported_len: Option<usize>,
}

#[derive(Debug, Default)]
struct Shared {
    online: bool,
    closed: bool,
    inbound: VecDeque<Inbound>,
    pending_read: Option<(IoRequest, Completion)>,
    held_send: Option<(IoRequest, Completion)>,
    hold_sends: bool,
    sent: Vec<SentFrame>,
    fail_next: Option<IoFault>,
    fail_send: Option<IoFault>,
    fail_command: Option<(Command, IoFault)>,
    commands: Vec<Command>,
    aborts: usize,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fill a read request from an inbound frame and return it
fn deliver(mut request: IoRequest, completion: Completion, frame: Inbound) {
    let capacity = request.data.capacity();
    let copy_len = frame.data.len().min(capacity);

    if frame.reported_len.is_none() && frame.data.len() > capacity {
        request.fail(IoFault::new(IoError::BadLength, WIRE_MTU_EXCEEDED));
        completion.reply(request);
        return;
    }

    request.data.as_mut_slice()[..copy_len].copy_from_slice(&frame.data[..copy_len]);
    request.length = frame.reported_len.unwrap_or(frame.data.len());
    if frame.data.len() >= ETH_HDR_SIZE {
        request.dst_addr[..MAC_LEN].copy_from_slice(&frame.data[0..MAC_LEN]);
        request.src_addr[..MAC_LEN].copy_from_slice(&frame.data[MAC_LEN..2 * MAC_LEN]);
        request.packet_type = get_word(&frame.data[12..]);
    }
    trace!("memory device: delivered {} bytes", request.length);
    completion.reply(request);
}

pub struct MemoryDevice {
    info: DeviceInfo,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryDevice {
    /// Create a device and the handle that drives it
    pub fn new(id_string: &str) -> (Self, MemoryHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let device = MemoryDevice {
            info: DeviceInfo {
                id_string: id_string.to_string(),
                version: 1,
                revision: 0,
                addr_size: MAC_LEN,
            },
            shared: shared.clone(),
        };
        (device, MemoryHandle { shared })
    }
}

impl Device for MemoryDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn do_command(&mut self, command: Command) -> Result<(), IoFault> {
        let mut shared = lock(&self.shared);
        shared.commands.push(command);
        if let Some((failing, fault)) = shared.fail_command {
            if failing == command {
                return Err(fault);
            }
        }
        match command {
            Command::Online => shared.online = true,
            Command::Offline => shared.online = false,
            _ => return Err(IoFault::new(IoError::BadState, WIRE_OK)),
        }
        Ok(())
    }

    fn begin_io(&mut self, mut request: IoRequest, completion: Completion) {
        let mut shared = lock(&self.shared);

        if let Some(fault) = shared.fail_next.take() {
            request.fail(fault);
            completion.reply(request);
            return;
        }
        if !shared.online {
            request.fail(IoFault::new(IoError::Offline, WIRE_OK));
            completion.reply(request);
            return;
        }

        match request.command {
            Command::Read | Command::ReadOrphan => match shared.inbound.pop_front() {
                Some(frame) => deliver(request, completion, frame),
                None => shared.pending_read = Some((request, completion)),
            },
            Command::Write => {
                if let Some(fault) = shared.fail_send.take() {
                    request.fail(fault);
                    completion.reply(request);
                    return;
                }
                let mut data = request.data.as_slice()[..request.length].to_vec();
                let dst: [u8; MAC_LEN] = read_addr(&request.dst_addr, 0);
                let src: [u8; MAC_LEN] = read_addr(&request.src_addr, 0);
                ethernet::set_addresses(&mut data, &dst, &src);
                shared.sent.push(SentFrame {
                    data,
                    src_addr: request.src_addr,
                    dst_addr: request.dst_addr,
                });
                if shared.hold_sends {
                    shared.held_send = Some((request, completion));
                } else {
                    completion.reply(request);
                }
            }
            _ => {
                request.fail(IoFault::new(IoError::BadState, WIRE_OK));
                completion.reply(request);
            }
        }
    }

    fn abort_io(&mut self) {
        let mut shared = lock(&self.shared);
        shared.aborts += 1;
        let in_flight = match shared.pending_read.take() {
            Some(read) => Some(read),
            None => shared.held_send.take(),
        };
        if let Some((mut request, completion)) = in_flight {
            request.fail(IoFault::new(IoError::Aborted, WIRE_OK));
            completion.reply(request);
        }
    }

    fn close(&mut self) {
        lock(&self.shared).closed = true;
    }
}

/// Test-side control of a [`MemoryDevice`]
#[derive(Clone)]
pub struct MemoryHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryHandle {
    /// Queue an inbound frame, completing a pending read right away
    pub fn inject(&self, frame: Vec<u8>) {
        self.push(Inbound {
            data: frame,
            reported_len: None,
        });
    }

    /// Queue an inbound frame whose reported length is `reported_len`
    /// regardless of its real size
    pub fn inject_with_length(&self, frame: Vec<u8>, reported_len: usize) {
        self.push(Inbound {
            data: frame,
            reported_len: Some(reported_len),
        });
    }

    fn push(&self, frame: Inbound) {
        let mut shared = lock(&self.shared);
        match shared.pending_read.take() {
            Some((request, completion)) => deliver(request, completion, frame),
            None => shared.inbound.push_back(frame),
        }
    }

    /// Fail the next submitted request with `fault`
    pub fn fail_next(&self, fault: IoFault) {
        lock(&self.shared).fail_next = Some(fault);
    }

    /// Fail the next write request with `fault`
    pub fn fail_next_send(&self, fault: IoFault) {
        lock(&self.shared).fail_send = Some(fault);
    }

    /// Fail every `command` with `fault`
    pub fn fail_command(&self, command: Command, fault: IoFault) {
        lock(&self.shared).fail_command = Some((command, fault));
    }

    /// Keep write requests in flight until [`MemoryHandle::release_send`]
    pub fn hold_sends(&self, hold: bool) {
        lock(&self.shared).hold_sends = hold;
    }

    pub fn release_send(&self) {
        let held = lock(&self.shared).held_send.take();
        if let Some((request, completion)) = held {
            completion.reply(request);
        }
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        lock(&self.shared).sent.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        lock(&self.shared).commands.clone()
    }

    pub fn aborts(&self) -> usize {
        lock(&self.shared).aborts
    }

    pub fn is_online(&self) -> bool {
        lock(&self.shared).online
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }

    /// True while a read request waits for a frame
    pub fn read_pending(&self) -> bool {
        lock(&self.shared).pending_read.is_some()
    }
}
