//! Implements the background loop moving incoming reports into the queue.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, error, trace};

use crate::{
    config::TransportConfig,
    device::DeviceInterface,
    message::Message,
    queue::QueueSender,
    transport::TransportError,
};

/// Owns the thread dispatching the device's report callbacks.
///
/// The report callback is the only producer of queue entries.
pub(crate) struct IngestionLoop {
    /// Whether the loop should keep running. Cleared exactly once, by
    /// [`Self::stop`].
    is_open: Arc<AtomicBool>,

    /// Whether the thread is still inside its dispatch loop.
    running: Arc<AtomicBool>,

    /// The handle to the dispatch thread. Joined by [`Self::stop`].
    thread_hdl: Option<JoinHandle<()>>,
}

impl IngestionLoop {
    /// Registers the report callback, starts the device's report queues and
    /// spawns the dispatch thread.
    pub(crate) fn start<I: DeviceInterface>(
        interface: Arc<I>,
        sender: QueueSender,
        config: &TransportConfig,
    ) -> Result<Self, TransportError<I::Error>> {
        interface.register_report_callback(
            config.report_buffer_size,
            Box::new(move |report| {
                let Some(msg) = Message::from_report(report) else {
                    trace!("ignoring empty report");
                    return;
                };

                trace!(%msg, "report received");
                sender.push(msg);
            }),
        )?;
        interface.start_queues()?;

        let is_open = Arc::new(AtomicBool::new(true));
        let running = Arc::new(AtomicBool::new(true));
        let interval = config.dispatch_interval;

        let thread_hdl = thread::Builder::new()
            .name("usbbox-ingest".into())
            .spawn({
                let is_open = Arc::clone(&is_open);
                let running = Arc::clone(&running);

                move || {
                    dispatch_until_closed(&*interface, &is_open, interval);
                    running.store(false, Ordering::Release);
                }
            })
            .map_err(TransportError::Spawn)?;

        debug!(interval = ?interval, "ingestion loop started");

        Ok(Self {
            is_open,
            running,
            thread_hdl: Some(thread_hdl),
        })
    }

    /// Whether the dispatch thread is still running.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signals the dispatch thread to stop and waits for it to terminate.
    ///
    /// This takes up to one dispatch interval. Calling it again is a no-op.
    pub(crate) fn stop(&mut self) {
        self.is_open.store(false, Ordering::Release);

        let Some(thread_hdl) = self.thread_hdl.take() else {
            return;
        };

        if thread_hdl.join().is_err() {
            error!("ingestion thread panicked");
        }
    }
}

impl Drop for IngestionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_until_closed<I: DeviceInterface>(
    interface: &I,
    is_open: &AtomicBool,
    interval: Duration,
) {
    while is_open.load(Ordering::Acquire) {
        if let Err(err) = interface.run_dispatch(interval) {
            error!(%err, "report dispatch failed, stopping ingestion");
            return;
        }
    }

    debug!("ingestion loop stopped");
}
