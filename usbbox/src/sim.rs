//! A simulated box for exercising the transport without hardware.
//!
//! A [`SimDevice`] behaves like an opened HID interface. It is paired with a
//! [`SimController`] used to inject input reports, inspect written output
//! reports and provoke failures.
//!
//! ```
//! use std::time::Duration;
//!
//! use usbbox::{Message, Transport, TransportConfig, sim::SimDevice};
//!
//! let (device, controller) = SimDevice::new();
//! let transport = Transport::from_interface(device, TransportConfig::default()).unwrap();
//!
//! controller.inject(Message::with_tag(0x52));
//! let msg = transport.read(Duration::from_millis(500)).unwrap();
//! assert_eq!(msg.tag(), 0x52);
//!
//! transport.close().unwrap();
//! assert!(controller.is_closed());
//! ```

use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    device::{DeviceCandidate, DeviceIdentity, DeviceInterface, Discovery, ReportCallback},
    message::{MESSAGE_SIZE, Message},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between a simulated device and its controller.
#[derive(Default)]
struct SimState {
    /// Every output report accepted by the device, oldest first.
    written: Mutex<Vec<Message>>,

    /// Whether output reports are rejected.
    reject_writes: AtomicBool,

    /// Whether accepted output reports are echoed back as input reports.
    loopback: AtomicBool,

    /// Whether the next dispatch fails.
    fail_dispatch: AtomicBool,

    /// Whether starting the report queues fails.
    fail_start: AtomicBool,

    closed: AtomicBool,
}

/// A simulated, already opened HID interface.
pub struct SimDevice {
    state: Arc<SimState>,

    /// Sends input reports to [`Self::reports`], used for loopback.
    loopback_tx: flume::Sender<Vec<u8>>,

    /// Input reports waiting to be dispatched.
    reports: flume::Receiver<Vec<u8>>,

    /// The registered callback along with the size of its report buffer.
    callback: Mutex<Option<(usize, ReportCallback)>>,

    started: AtomicBool,
}

impl SimDevice {
    /// Creates a simulated device and the controller steering it.
    pub fn new() -> (Self, SimController) {
        let (tx, rx) = flume::unbounded();
        let state = Arc::new(SimState::default());

        let device = Self {
            state: Arc::clone(&state),
            loopback_tx: tx.clone(),
            reports: rx,
            callback: Mutex::new(None),
            started: AtomicBool::new(false),
        };

        (device, SimController { state, reports: tx })
    }

    fn deliver(&self, report: &[u8]) {
        let mut guard = lock(&self.callback);
        let Some((buffer_size, callback)) = guard.as_mut() else {
            return;
        };

        let len = report.len().min(*buffer_size);
        callback(&report[..len]);
    }
}

impl DeviceInterface for SimDevice {
    type Error = SimError;

    fn set_output_report(
        &self,
        report: &[u8; MESSAGE_SIZE],
        _timeout: Duration,
    ) -> Result<(), Self::Error> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(SimError::Closed);
        }
        if self.state.reject_writes.load(Ordering::Acquire) {
            return Err(SimError::WriteRejected);
        }

        let msg = Message::new(*report);
        lock(&self.state.written).push(msg);

        if self.state.loopback.load(Ordering::Acquire) {
            // The device itself holds a receiver, so this cannot fail.
            let _ = self.loopback_tx.send(report.to_vec());
        }

        Ok(())
    }

    fn register_report_callback(
        &self,
        buffer_size: usize,
        callback: ReportCallback,
    ) -> Result<(), Self::Error> {
        *lock(&self.callback) = Some((buffer_size, callback));
        Ok(())
    }

    fn start_queues(&self) -> Result<(), Self::Error> {
        if self.state.fail_start.load(Ordering::Acquire) {
            return Err(SimError::StartFailed);
        }

        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn run_dispatch(&self, timeout: Duration) -> Result<(), Self::Error> {
        if self.state.fail_dispatch.swap(false, Ordering::AcqRel) {
            return Err(SimError::DispatchFailed);
        }

        if !self.started.load(Ordering::Acquire) {
            thread::sleep(timeout);
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        while let Ok(report) = self.reports.recv_deadline(deadline) {
            self.deliver(&report);
        }

        Ok(())
    }

    fn close(self) -> Result<(), Self::Error> {
        self.state.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Steers a [`SimDevice`] from the outside.
#[derive(Clone)]
pub struct SimController {
    state: Arc<SimState>,
    reports: flume::Sender<Vec<u8>>,
}

impl SimController {
    /// Delivers a message as an input report.
    pub fn inject(&self, msg: Message) {
        self.inject_report(msg.as_bytes());
    }

    /// Delivers raw bytes as an input report.
    pub fn inject_report(&self, report: &[u8]) {
        // The device holds its own sender, so the channel never disconnects
        // while the receiver is alive. A closed device ignores the report.
        let _ = self.reports.send(report.to_vec());
    }

    /// Makes the device reject (`true`) or accept (`false`) output reports.
    pub fn reject_writes(&self, reject: bool) {
        self.state.reject_writes.store(reject, Ordering::Release);
    }

    /// Makes the device echo every accepted output report back as an input
    /// report.
    pub fn set_loopback(&self, loopback: bool) {
        self.state.loopback.store(loopback, Ordering::Release);
    }

    /// Makes the next dispatch of the device fail.
    pub fn fail_next_dispatch(&self) {
        self.state.fail_dispatch.store(true, Ordering::Release);
    }

    /// Makes starting the report queues of the device fail.
    pub fn fail_start(&self) {
        self.state.fail_start.store(true, Ordering::Release);
    }

    /// All output reports the device accepted so far.
    pub fn written(&self) -> Vec<Message> {
        lock(&self.state.written).clone()
    }

    /// Whether the device was closed.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

/// A simulated device found by [`SimDiscovery`].
#[derive(Clone, Copy, Debug)]
pub struct SimCandidate {
    identity: DeviceIdentity,
    slot: usize,
}

impl DeviceCandidate for SimCandidate {
    fn identity(&self) -> DeviceIdentity {
        self.identity
    }
}

/// Discovers simulated devices plugged in via [`Self::plug`].
///
/// Every device can be opened only once.
#[derive(Default)]
pub struct SimDiscovery {
    slots: Mutex<Vec<(DeviceIdentity, Option<SimDevice>)>>,
}

impl SimDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugs in a simulated device reporting `identity`.
    pub fn plug(&self, identity: DeviceIdentity) -> SimController {
        let (device, controller) = SimDevice::new();
        lock(&self.slots).push((identity, Some(device)));
        controller
    }
}

impl Discovery for SimDiscovery {
    type Candidate = SimCandidate;
    type Interface = SimDevice;

    fn enumerate(&self) -> Result<Vec<Self::Candidate>, SimError> {
        Ok(lock(&self.slots)
            .iter()
            .enumerate()
            .map(|(slot, (identity, _))| SimCandidate {
                identity: *identity,
                slot,
            })
            .collect())
    }

    fn open(&self, candidate: Self::Candidate) -> Result<Self::Interface, SimError> {
        lock(&self.slots)
            .get_mut(candidate.slot)
            .and_then(|(_, device)| device.take())
            .ok_or(SimError::AlreadyOpen)
    }
}

/// Represents an error returned by a simulated device.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SimError {
    /// Indicates that the device was configured to reject output reports.
    #[error("the device rejected the output report")]
    WriteRejected,

    /// Indicates that the device was configured to fail dispatching.
    #[error("dispatching input reports failed")]
    DispatchFailed,

    /// Indicates that the device was configured to fail starting its report
    /// queues.
    #[error("the report queues could not be started")]
    StartFailed,

    /// Indicates that the device was already opened.
    #[error("the device is already open")]
    AlreadyOpen,

    /// Indicates that the device was closed.
    #[error("the device is closed")]
    Closed,
}
