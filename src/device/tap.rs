//! TAP interface backend
//!
//! Unit `n` of device `name` is the Linux TAP interface `<name><n>`. Frames
//! are read and written whole, Ethernet header included. Online and offline
//! bring the link up and down with `ip link`.
//!
//! Asynchronous requests run on one I/O worker thread per device. The
//! worker polls the interface descriptor with a short timeout so that an
//! abort of the request in flight is noticed.
//!
//! Note: creating a TAP interface requires root or CAP_NET_ADMIN.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::Command as Process;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use tun_tap::{Iface, Mode};

use super::{
    Command, Completion, Device, DeviceError, DeviceInfo, IoError, IoFault, IoRequest, WIRE_OK,
};
use crate::network::ethernet::{self, ETH_HDR_SIZE};
use crate::network::{get_word, read_addr, MAC_LEN};

/// How long the worker blocks in poll before looking for an abort
const POLL_INTERVAL_MS: i32 = 50;

struct Job {
    id: u64,
    request: IoRequest,
    completion: Completion,
}

pub struct TapDevice {
    info: DeviceInfo,
    iface: Arc<Iface>,
    online: Arc<AtomicBool>,
    abort: Arc<AtomicU64>,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
    in_flight: u64,
}

impl TapDevice {
    /// Open TAP interface `<name><unit>`
    pub fn open(name: &str, unit: u32) -> Result<Self, DeviceError> {
        let ifname = format!("{}{}", name, unit);
        let iface = Iface::without_packet_info(&ifname, Mode::Tap)
            .map_err(|e| map_open_error(name, unit, e))?;
        iface
            .set_non_blocking()
            .map_err(|e| map_open_error(name, unit, e))?;
        let iface = Arc::new(iface);

        let online = Arc::new(AtomicBool::new(false));
        let abort = Arc::new(AtomicU64::new(0));
        let (jobs, queue) = mpsc::channel();

        let worker = {
            let iface = iface.clone();
            let online = online.clone();
            let abort = abort.clone();
            thread::Builder::new()
                .name(format!("{}-io", ifname))
                .spawn(move || io_worker(iface, online, abort, queue))
                .map_err(|e| map_open_error(name, unit, e))?
        };

        let info = DeviceInfo {
            id_string: format!("tap.device {}", iface.name()),
            version: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            revision: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            addr_size: MAC_LEN,
        };

        Ok(TapDevice {
            info,
            iface,
            online,
            abort,
            jobs: Some(jobs),
            worker: Some(worker),
            next_id: 1,
            in_flight: 0,
        })
    }

    pub fn interface_name(&self) -> &str {
        self.iface.name()
    }

    fn set_link(&self, up: bool) -> Result<(), IoFault> {
        let state = if up { "up" } else { "down" };
        let status = Process::new("ip")
            .arg("link")
            .arg("set")
            .arg(state)
            .arg("dev")
            .arg(self.iface.name())
            .status()
            .map_err(|e| IoFault::from_io(IoError::Software, &e))?;

        if !status.success() {
            let code = status.code().map_or(WIRE_OK, |code| code as u32);
            return Err(IoFault::new(IoError::BadState, code));
        }
        debug!("interface {} is {}", self.iface.name(), state);
        Ok(())
    }
}

fn map_open_error(name: &str, unit: u32, err: io::Error) -> DeviceError {
    match err.kind() {
        io::ErrorKind::NotFound => DeviceError::NotFound {
            name: name.to_string(),
            unit,
        },
        _ => DeviceError::OpenFailed {
            name: name.to_string(),
            unit,
            reason: err.to_string(),
        },
    }
}

impl Device for TapDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn do_command(&mut self, command: Command) -> Result<(), IoFault> {
        match command {
            Command::Online => {
                self.set_link(true)?;
                self.online.store(true, Ordering::Release);
                Ok(())
            }
            Command::Offline => {
                self.online.store(false, Ordering::Release);
                self.set_link(false)
            }
            _ => Err(IoFault::new(IoError::BadState, WIRE_OK)),
        }
    }

    fn begin_io(&mut self, mut request: IoRequest, completion: Completion) {
        if !self.online.load(Ordering::Acquire) {
            request.fail(IoFault::new(IoError::Offline, WIRE_OK));
            completion.reply(request);
            return;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.in_flight = id;

        let job = Job {
            id,
            request,
            completion,
        };
        let jobs = match self.jobs.as_ref() {
            Some(jobs) => jobs,
            None => return fail_job(job, IoError::Offline),
        };
        if let Err(mpsc::SendError(job)) = jobs.send(job) {
            warn!("I/O worker of {} is gone", self.iface.name());
            fail_job(job, IoError::Software);
        }
    }

    fn abort_io(&mut self) {
        self.abort.store(self.in_flight, Ordering::Release);
    }

    fn close(&mut self) {
        self.abort_io();
        self.online.store(false, Ordering::Release);
        // dropping the queue ends the worker loop
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("I/O worker of {} panicked", self.iface.name());
            }
        }
    }
}

impl Drop for TapDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn fail_job(job: Job, error: IoError) {
    let Job {
        mut request,
        completion,
        ..
    } = job;
    request.fail(IoFault::new(error, WIRE_OK));
    completion.reply(request);
}

fn io_worker(
    iface: Arc<Iface>,
    online: Arc<AtomicBool>,
    abort: Arc<AtomicU64>,
    queue: Receiver<Job>,
) {
    for job in queue {
        let Job {
            id,
            mut request,
            completion,
        } = job;

        match request.command {
            Command::Read | Command::ReadOrphan => {
                read_frame(&iface, &online, &abort, id, &mut request)
            }
            Command::Write => write_frame(&iface, &mut request),
            _ => request.fail(IoFault::new(IoError::BadState, WIRE_OK)),
        }
        completion.reply(request);
    }
}

fn read_frame(
    iface: &Iface,
    online: &AtomicBool,
    abort: &AtomicU64,
    id: u64,
    request: &mut IoRequest,
) {
    let fd = iface.as_raw_fd();
    loop {
        if abort.load(Ordering::Acquire) == id {
            request.fail(IoFault::new(IoError::Aborted, WIRE_OK));
            return;
        }
        if !online.load(Ordering::Acquire) {
            request.fail(IoFault::new(IoError::Offline, WIRE_OK));
            return;
        }

        match wait_readable(fd, POLL_INTERVAL_MS) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                request.fail(IoFault::from_io(IoError::RxFailure, &e));
                return;
            }
        }

        match iface.recv(request.data.as_mut_slice()) {
            Ok(n) => {
                request.length = n;
                let data = &request.data.as_slice()[..n];
                if n >= ETH_HDR_SIZE {
                    request.dst_addr[..MAC_LEN].copy_from_slice(&data[0..MAC_LEN]);
                    request.src_addr[..MAC_LEN].copy_from_slice(&data[MAC_LEN..2 * MAC_LEN]);
                    request.packet_type = get_word(&data[12..]);
                }
                return;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                request.fail(IoFault::from_io(IoError::RxFailure, &e));
                return;
            }
        }
    }
}

fn write_frame(iface: &Iface, request: &mut IoRequest) {
    let length = request.length;
    let dst: [u8; MAC_LEN] = read_addr(&request.dst_addr, 0);
    let src: [u8; MAC_LEN] = read_addr(&request.src_addr, 0);
    let data = &mut request.data.as_mut_slice()[..length];
    ethernet::set_addresses(data, &dst, &src);

    match iface.send(data) {
        Ok(n) if n == length => {}
        Ok(n) => {
            warn!("short write: {} of {} bytes", n, length);
            request.length = n;
            request.fail(IoFault::new(IoError::TxFailure, WIRE_OK));
        }
        Err(e) => request.fail(IoFault::from_io(IoError::TxFailure, &e)),
    }
}

/// Wait up to `timeout_ms` for `fd` to become readable
fn wait_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: pfd is a valid pollfd and the count matches
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0 && pfd.revents & libc::POLLIN != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_mapping() {
        let err = map_open_error("testdev", 3, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, DeviceError::NotFound { unit: 3, .. }));
        assert_eq!(err.to_string(), "device testdev unit 3 not found");

        let err = map_open_error(
            "testdev",
            3,
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().starts_with("error opening device(testdev,3): "));
    }

    #[test]
    fn test_wait_readable_on_pipe() {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: fds has room for the two descriptors
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (rd, wr) = (fds[0], fds[1]);

        assert_eq!(wait_readable(rd, 0).unwrap(), false);
        let byte = [1u8];
        // SAFETY: writing one byte from a valid buffer
        assert_eq!(unsafe { libc::write(wr, byte.as_ptr() as *const libc::c_void, 1) }, 1);
        assert_eq!(wait_readable(rd, 0).unwrap(), true);

        // SAFETY: both descriptors are owned by this test
        unsafe {
            libc::close(rd);
            libc::close(wr);
        }
    }
}
