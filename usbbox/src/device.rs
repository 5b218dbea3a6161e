//! Defines the collaborators the transport relies on to reach the device.
//!
//! This crate does not implement HID communication itself. Discovering the
//! box and talking to its HID interface is left to an implementation of
//! [`Discovery`] and [`DeviceInterface`], such as the one provided by the
//! `usbbox-hid` crate or the simulated device in [`crate::sim`].

use std::{error::Error, time::Duration};

use crate::message::MESSAGE_SIZE;

/// Identifies a kind of USB device by its vendor and product ID.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

/// Called with the raw bytes of every input report the device delivers.
pub type ReportCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Represents an open connection to the HID interface of a device.
///
/// Input reports are delivered asynchronously: after registering a callback
/// via [`Self::register_report_callback`] and starting the report queues via
/// [`Self::start_queues`], repeatedly calling [`Self::run_dispatch`] invokes
/// the callback for every report that arrived.
///
/// Dispatching happens on a dedicated background thread while writes are
/// issued from the thread owning the transport, so both must be callable
/// concurrently.
pub trait DeviceInterface: Send + Sync + 'static {
    /// An implementation-specific error type.
    type Error: Error + Send + Sync + 'static;

    /// Sends an output report to the device, waiting at most `timeout` for it
    /// to be accepted.
    fn set_output_report(
        &self,
        report: &[u8; MESSAGE_SIZE],
        timeout: Duration,
    ) -> Result<(), Self::Error>;

    /// Registers the callback incoming reports are passed to.
    ///
    /// Reports are read into a buffer of `buffer_size` bytes. Registering a
    /// second callback replaces the first one.
    fn register_report_callback(
        &self,
        buffer_size: usize,
        callback: ReportCallback,
    ) -> Result<(), Self::Error>;

    /// Starts delivering input reports.
    fn start_queues(&self) -> Result<(), Self::Error>;

    /// Runs the event dispatch for at most `timeout`, invoking the registered
    /// callback for every report that arrives in the meantime.
    ///
    /// Implementations must return once `timeout` has elapsed, even if no
    /// report arrived.
    fn run_dispatch(&self, timeout: Duration) -> Result<(), Self::Error>;

    /// Closes the connection.
    ///
    /// This also drops the registered report callback.
    fn close(self) -> Result<(), Self::Error>
    where
        Self: Sized;
}

/// Represents a HID device found during enumeration.
pub trait DeviceCandidate {
    /// The identity the device reports.
    fn identity(&self) -> DeviceIdentity;
}

/// Finds and opens HID devices.
pub trait Discovery {
    /// The reference to an enumerated device.
    type Candidate: DeviceCandidate;

    /// The connection established to an opened device.
    type Interface: DeviceInterface;

    /// Lists all connected HID-class devices.
    fn enumerate(
        &self,
    ) -> Result<Vec<Self::Candidate>, <Self::Interface as DeviceInterface>::Error>;

    /// Establishes a connection to an enumerated device.
    fn open(
        &self,
        candidate: Self::Candidate,
    ) -> Result<Self::Interface, <Self::Interface as DeviceInterface>::Error>;

    /// Opens the first enumerated device matching `identity`.
    ///
    /// Returns `Ok(None)` if no such device is connected.
    fn open_matching(
        &self,
        identity: DeviceIdentity,
    ) -> Result<Option<Self::Interface>, <Self::Interface as DeviceInterface>::Error> {
        let Some(candidate) = self
            .enumerate()?
            .into_iter()
            .find(|candidate| candidate.identity() == identity)
        else {
            return Ok(None);
        };

        self.open(candidate).map(Some)
    }
}
