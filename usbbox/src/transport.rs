//! Implements the handle representing one open session with the box.

use std::{
    error::Error,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    config::TransportConfig,
    device::{DeviceInterface, Discovery},
    ingest::IngestionLoop,
    message::Message,
    queue::{self, MessageQueue, QueueReceiver},
};

/// An open session with the box.
///
/// Incoming messages are received on a background thread and buffered until
/// they are retrieved via [`Self::read`]. Outgoing messages are written
/// synchronously via [`Self::write`]; replies to them arrive later and have to
/// be matched by their tag, see [`Self::read_reply`].
///
/// Only one transport should exist per physical device at a time. Dropping
/// the transport closes it, but [`Self::close`] allows observing errors
/// returned while releasing the connection.
pub struct Transport<I: DeviceInterface> {
    /// The connection to the device, shared with the ingestion thread.
    ///
    /// Only [`None`] once the transport has been shut down.
    interface: Option<Arc<I>>,

    /// The loop pushing incoming reports onto the queue.
    ingestion: IngestionLoop,

    /// The consuming half of the message queue.
    queue: QueueReceiver,

    config: TransportConfig,
}

impl<I: DeviceInterface> Transport<I> {
    /// Looks up the device identified by [`TransportConfig::identity`] and
    /// opens a transport to it.
    ///
    /// Returns `Ok(None)` if no such device is connected.
    pub fn open<D>(
        discovery: &D,
        config: TransportConfig,
    ) -> Result<Option<Self>, TransportError<I::Error>>
    where
        D: Discovery<Interface = I>,
    {
        let Some(interface) = discovery.open_matching(config.identity)? else {
            debug!(
                vendor_id = config.identity.vendor_id,
                product_id = config.identity.product_id,
                "no matching device found"
            );
            return Ok(None);
        };

        Self::from_interface(interface, config).map(Some)
    }

    /// Starts a transport on an already opened device connection.
    ///
    /// The connection is closed again if the ingestion loop cannot be
    /// started.
    pub fn from_interface(
        interface: I,
        config: TransportConfig,
    ) -> Result<Self, TransportError<I::Error>> {
        let (sender, queue) =
            queue::channel(config.initial_queue_capacity, config.queue_capacity_limit);
        let interface = Arc::new(interface);

        let ingestion = match IngestionLoop::start(Arc::clone(&interface), sender, &config) {
            Ok(ingestion) => ingestion,
            Err(err) => {
                if let Ok(interface) = Arc::try_unwrap(interface) {
                    if let Err(close_err) = interface.close() {
                        warn!(err = %close_err, "could not close device after failed start");
                    }
                }
                return Err(err);
            },
        };

        Ok(Self {
            interface: Some(interface),
            ingestion,
            queue,
            config,
        })
    }

    /// Reads the oldest buffered message, waiting at most `timeout` for one
    /// to arrive.
    ///
    /// A zero timeout checks the queue once and returns immediately.
    /// Otherwise the queue is polled every [`TransportConfig::poll_interval`]
    /// until a message is found or the timeout elapsed.
    ///
    /// Returns [`TransportError::Timeout`] if no message was available in
    /// time and [`TransportError::IngestionStopped`] if no message is
    /// available and none can arrive anymore.
    pub fn read(&self, timeout: Duration) -> Result<Message, TransportError<I::Error>> {
        if let Some(msg) = self.poll()? {
            return Ok(msg);
        }

        if timeout.is_zero() {
            return Err(TransportError::Timeout);
        }

        let start = Instant::now();
        loop {
            thread::sleep(self.config.poll_interval);

            if let Some(msg) = self.poll()? {
                return Ok(msg);
            }

            if start.elapsed() >= timeout {
                return Err(TransportError::Timeout);
            }
        }
    }

    fn poll(&self) -> Result<Option<Message>, TransportError<I::Error>> {
        if let Some(msg) = self.queue.pop() {
            return Ok(Some(msg));
        }

        if !self.ingestion.is_running() {
            // A report may have been pushed right before the loop exited.
            return match self.queue.pop() {
                Some(msg) => Ok(Some(msg)),
                None => Err(TransportError::IngestionStopped),
            };
        }

        Ok(None)
    }

    /// Reads messages until one carrying `tag` arrives.
    ///
    /// Up to `attempts` messages are read, each with the given timeout.
    /// Messages with a different tag are discarded.
    pub fn read_reply(
        &self,
        tag: u8,
        timeout: Duration,
        attempts: usize,
    ) -> Result<Message, TransportError<I::Error>> {
        for _ in 0..attempts {
            let msg = self.read(timeout)?;
            if msg.tag() == tag {
                return Ok(msg);
            }

            trace!(%msg, expected = tag, "discarding unrelated message");
        }

        Err(TransportError::Timeout)
    }

    /// Discards buffered and incoming messages until no message arrives
    /// within `timeout`.
    ///
    /// Returns the amount of discarded messages.
    pub fn drain(&self, timeout: Duration) -> Result<usize, TransportError<I::Error>> {
        let mut discarded = 0;
        loop {
            match self.read(timeout) {
                Ok(_) => discarded += 1,
                Err(TransportError::Timeout) => break,
                Err(err) => return Err(err),
            }
        }

        debug!(discarded, "drained pending messages");
        Ok(discarded)
    }

    /// Writes a message to the device as an output report.
    ///
    /// This blocks for at most [`TransportConfig::write_timeout`] and does not
    /// touch the queue of incoming messages.
    pub fn write(&self, msg: &Message) -> Result<(), TransportError<I::Error>> {
        let Some(interface) = self.interface.as_deref() else {
            return Err(TransportError::Closed);
        };

        trace!(%msg, "writing message");
        interface
            .set_output_report(msg.as_bytes(), self.config.write_timeout)
            .map_err(|err| {
                debug!(%err, %msg, "device rejected message");
                TransportError::Connection(err)
            })
    }

    /// Whether incoming reports are still being received.
    ///
    /// This turns `false` if the device's dispatch failed.
    pub fn is_ingesting(&self) -> bool {
        self.ingestion.is_running()
    }

    /// Provides access to the diagnostics of the message queue.
    pub fn queue(&self) -> &MessageQueue {
        self.queue.queue()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Stops receiving messages and closes the device connection.
    ///
    /// Buffered messages that were not read yet are discarded.
    pub fn close(mut self) -> Result<(), TransportError<I::Error>> {
        self.shutdown()
    }

    /// Stops the ingestion loop before releasing the connection, so the
    /// report callback can never fire into a released queue.
    fn shutdown(&mut self) -> Result<(), TransportError<I::Error>> {
        self.ingestion.stop();

        let Some(interface) = self.interface.take() else {
            return Ok(());
        };

        // The ingestion thread held the only other reference and has been
        // joined above, so unwrapping cannot fail.
        let result = match Arc::try_unwrap(interface) {
            Ok(interface) => interface.close().map_err(TransportError::Connection),
            Err(_) => Ok(()),
        };

        debug!(undelivered = self.queue.queue().len(), "transport closed");
        result
    }
}

impl<I: DeviceInterface> Drop for Transport<I> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(%err, "could not close transport cleanly");
        }
    }
}

/// Represents an error returned by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError<E: Error> {
    /// Indicates that no message was received within the requested timeout.
    #[error("no message was received within the timeout")]
    Timeout,

    /// Indicates that the [`DeviceInterface`] implementation returned an
    /// error.
    #[error("the device connection returned an error")]
    Connection(#[from] E),

    /// Indicates that the ingestion loop stopped, so no further messages can
    /// be received.
    #[error("the ingestion loop is no longer running")]
    IngestionStopped,

    /// Indicates that the transport was already closed.
    #[error("the transport was closed")]
    Closed,

    /// Indicates that the ingestion thread could not be spawned.
    #[error("could not spawn the ingestion thread")]
    Spawn(#[source] std::io::Error),
}

impl<E: Error> TransportError<E> {
    /// Maps the error to its integer status code.
    pub fn status(&self) -> Status {
        match self {
            Self::Timeout => Status::Timeout,
            _ => Status::Error,
        }
    }
}

/// The status code of a successful operation.
pub const STATUS_OK: i32 = Status::Ok as i32;

/// The status code of a read that timed out.
pub const STATUS_TIMEOUT: i32 = Status::Timeout as i32;

/// Integer status codes for C-style bindings of the transport.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum Status {
    /// The operation succeeded.
    Ok = 0,

    /// No message was read within the timeout.
    Timeout = -1,

    /// The device or its connection reported an error.
    Error = -2,
}

impl Status {
    /// Computes the status of an operation's result.
    pub fn of<T, E: Error>(result: &Result<T, TransportError<E>>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(err) => err.status(),
        }
    }
}
