//! Tunables of the transport.

use std::time::Duration;

use crate::device::DeviceIdentity;

/// The vendor ID of the ioLab USB box.
pub const USB_BOX_VENDOR_ID: u16 = 0x19bc;

/// The product ID of the ioLab USB box.
pub const USB_BOX_PRODUCT_ID: u16 = 0x0001;

/// The size of the buffer interrupt reports are delivered into.
pub const DEFAULT_REPORT_BUFFER_SIZE: usize = 338;

/// The capacity the message queue starts out with.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Configures how a [`crate::Transport`] talks to the device.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TransportConfig {
    /// The vendor and product ID looked up when opening a transport.
    pub identity: DeviceIdentity,

    /// The size of the buffer registered with the report callback.
    pub report_buffer_size: usize,

    /// The amount of messages the queue can hold before it has to grow.
    pub initial_queue_capacity: usize,

    /// An optional ceiling for the queue's capacity.
    ///
    /// Growing past this ceiling is treated like an allocation failure: the
    /// incoming message is dropped.
    pub queue_capacity_limit: Option<usize>,

    /// How long the ingestion loop may stay inside a single dispatch call
    /// before checking whether the transport was closed.
    pub dispatch_interval: Duration,

    /// How long a read sleeps between two attempts to pop a message.
    pub poll_interval: Duration,

    /// The timeout passed to the device when writing an output report.
    pub write_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::new(USB_BOX_VENDOR_ID, USB_BOX_PRODUCT_ID),
            report_buffer_size: DEFAULT_REPORT_BUFFER_SIZE,
            initial_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_capacity_limit: None,
            dispatch_interval: Duration::from_millis(100),
            poll_interval: Duration::from_micros(100),
            write_timeout: Duration::from_millis(100),
        }
    }
}

impl TransportConfig {
    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_report_buffer_size(mut self, size: usize) -> Self {
        self.report_buffer_size = size;
        self
    }

    pub fn with_initial_queue_capacity(mut self, capacity: usize) -> Self {
        self.initial_queue_capacity = capacity;
        self
    }

    pub fn with_queue_capacity_limit(mut self, limit: Option<usize>) -> Self {
        self.queue_capacity_limit = limit;
        self
    }

    pub fn with_dispatch_interval(mut self, interval: Duration) -> Self {
        self.dispatch_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_the_usb_box() {
        let config = TransportConfig::default();
        assert_eq!(config.identity, DeviceIdentity::new(0x19bc, 0x0001));
        assert_eq!(config.dispatch_interval, Duration::from_millis(100));
        assert_eq!(config.poll_interval, Duration::from_micros(100));
        assert_eq!(config.write_timeout, Duration::from_millis(100));
        assert_eq!(config.initial_queue_capacity, 100);
        assert!(config.queue_capacity_limit.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: TransportConfig =
            serde_json::from_str(r#"{ "initial_queue_capacity": 4 }"#).unwrap();
        assert_eq!(config.initial_queue_capacity, 4);
        assert_eq!(config.write_timeout, TransportConfig::default().write_timeout);
    }
}
