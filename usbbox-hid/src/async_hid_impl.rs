//! Implements HID communication using the `async-hid` crate.

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

use async_hid::{
    AsyncHidRead,
    AsyncHidWrite,
    Device,
    DeviceInfo,
    DeviceReader,
    DeviceWriter,
    HidBackend,
    HidError,
};
use futures_lite::StreamExt;
use itertools::Itertools;
use thiserror::Error;
use tokio::{
    runtime::{self, Runtime},
    task::JoinHandle,
};
use tracing::{debug, trace};
use usbbox::{
    DeviceIdentity,
    DeviceInterface,
    Discovery,
    MESSAGE_SIZE,
    device::{DeviceCandidate, ReportCallback},
};

/// The report ID prepended to output reports. The box does not use numbered
/// reports.
const OUTPUT_REPORT_ID: u8 = 0x00;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Finds HID devices using the platform's default `async-hid` backend.
///
/// All I/O is driven by a small tokio runtime shared with every interface
/// opened through this discovery.
pub struct AsyncHidDiscovery {
    runtime: Arc<Runtime>,
}

impl AsyncHidDiscovery {
    /// Starts the runtime used to drive HID I/O.
    pub fn new() -> Result<Self, AsyncHidError> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("usbbox-hid")
            .enable_all()
            .build()
            .map_err(AsyncHidError::Runtime)?;

        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

/// A HID device found by [`AsyncHidDiscovery`].
pub struct AsyncHidCandidate {
    device: Device,
    info: DeviceInfo,
}

impl DeviceCandidate for AsyncHidCandidate {
    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.info.vendor_id, self.info.product_id)
    }
}

impl Discovery for AsyncHidDiscovery {
    type Candidate = AsyncHidCandidate;
    type Interface = AsyncHidInterface;

    fn enumerate(&self) -> Result<Vec<Self::Candidate>, AsyncHidError> {
        let devices: Vec<Device> = self.runtime.block_on(async {
            let hid = HidBackend::default();
            Ok::<_, HidError>(hid.enumerate().await?.collect::<Vec<Device>>().await)
        })?;

        Ok(devices
            .into_iter()
            .unique_by(|x| x.id.clone())
            .map(|device| AsyncHidCandidate {
                info: (*device).clone(),
                device,
            })
            .collect())
    }

    fn open(&self, candidate: Self::Candidate) -> Result<Self::Interface, AsyncHidError> {
        let (reader, writer) = self.runtime.block_on(candidate.device.open())?;

        debug!(
            vendor_id = candidate.info.vendor_id,
            product_id = candidate.info.product_id,
            "opened HID device"
        );

        let (report_tx, reports) = flume::unbounded();
        Ok(AsyncHidInterface {
            runtime: Arc::clone(&self.runtime),
            reader: Mutex::new(Some((reader, report_tx))),
            reader_task: Mutex::new(None),
            reports,
            writer: tokio::sync::Mutex::new(writer),
            info: candidate.info,
            registration: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }
}

/// The report callback along with the size of the buffer reports are read
/// into.
struct Registration {
    buffer_size: usize,
    callback: ReportCallback,
}

/// Input reports read by the reader task, or the error that ended it.
type ReportResult = Result<Vec<u8>, HidError>;

/// An open connection to a HID device.
///
/// Once started, a task on the shared runtime continuously reads input
/// reports and forwards them through a channel. Dispatching only hands
/// them to the callback, so no read is ever cancelled.
pub struct AsyncHidInterface {
    runtime: Arc<Runtime>,

    /// Moved into the reader task by [`DeviceInterface::start_queues`].
    reader: Mutex<Option<(DeviceReader, flume::Sender<ReportResult>)>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    reports: flume::Receiver<ReportResult>,

    writer: tokio::sync::Mutex<DeviceWriter>,
    info: DeviceInfo,
    registration: Mutex<Option<Registration>>,
    started: AtomicBool,
}

impl AsyncHidInterface {
    /// Information about the opened device.
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

impl DeviceInterface for AsyncHidInterface {
    type Error = AsyncHidError;

    fn set_output_report(
        &self,
        report: &[u8; MESSAGE_SIZE],
        timeout: Duration,
    ) -> Result<(), Self::Error> {
        let mut buf = [0u8; MESSAGE_SIZE + 1];
        buf[0] = OUTPUT_REPORT_ID;
        buf[1..].copy_from_slice(report);

        self.runtime.block_on(async {
            let write = async {
                let mut guard = self.writer.lock().await;
                guard.write_output_report(&buf).await
            };

            match tokio::time::timeout(timeout, write).await {
                Ok(res) => res.map_err(AsyncHidError::from),
                Err(_) => Err(AsyncHidError::WriteTimeout),
            }
        })
    }

    fn register_report_callback(
        &self,
        buffer_size: usize,
        callback: ReportCallback,
    ) -> Result<(), Self::Error> {
        *lock(&self.registration) = Some(Registration {
            buffer_size: buffer_size.max(MESSAGE_SIZE),
            callback,
        });
        Ok(())
    }

    fn start_queues(&self) -> Result<(), Self::Error> {
        let Some((reader, report_tx)) = lock(&self.reader).take() else {
            return Ok(());
        };

        let buffer_size = lock(&self.registration)
            .as_ref()
            .map_or(MESSAGE_SIZE, |registration| registration.buffer_size);

        let task = self
            .runtime
            .spawn(read_reports(reader, report_tx, buffer_size));
        *lock(&self.reader_task) = Some(task);

        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn run_dispatch(&self, timeout: Duration) -> Result<(), Self::Error> {
        if !self.started.load(Ordering::Acquire) {
            thread::sleep(timeout);
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.reports.recv_deadline(deadline) {
                Ok(Ok(report)) => {
                    let mut guard = lock(&self.registration);
                    if let Some(Registration { callback, .. }) = guard.as_mut() {
                        callback(&report);
                    }
                },
                Ok(Err(err)) => return Err(AsyncHidError::from(err)),
                Err(flume::RecvTimeoutError::Timeout) => return Ok(()),
                Err(flume::RecvTimeoutError::Disconnected) => {
                    return Err(AsyncHidError::ReaderStopped);
                },
            }
        }
    }

    fn close(self) -> Result<(), Self::Error> {
        if let Some(task) = lock(&self.reader_task).take() {
            task.abort();
        }

        debug!(
            vendor_id = self.info.vendor_id,
            product_id = self.info.product_id,
            "closing HID device"
        );
        Ok(())
    }
}

/// Reads input reports until reading fails or the interface is gone.
async fn read_reports(
    mut reader: DeviceReader,
    report_tx: flume::Sender<ReportResult>,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];
    loop {
        let res = reader.read_input_report(&mut buffer).await;
        let report = res.map(|len| buffer[..len].to_vec());

        let failed = report.is_err();
        if report_tx.send(report).is_err() || failed {
            trace!(failed, "reader task stopped");
            return;
        }
    }
}

/// Represents an error returned by the `async-hid` based implementation.
#[derive(Debug, Error)]
pub enum AsyncHidError {
    /// Indicates that the `async-hid` backend returned an error.
    #[error("the HID backend returned an error")]
    Hid(#[from] HidError),

    /// Indicates that the device did not accept an output report in time.
    #[error("the device did not accept the output report in time")]
    WriteTimeout,

    /// Indicates that input reports are no longer read from the device.
    #[error("the input report reader stopped")]
    ReaderStopped,

    /// Indicates that the runtime driving HID I/O could not be started.
    #[error("could not start the HID runtime")]
    Runtime(#[source] std::io::Error),
}
