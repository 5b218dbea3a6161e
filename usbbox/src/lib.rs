//! A transport for the ioLab USB box.
//!
//! The box is a USB HID device exchanging fixed-size 8-byte messages with the
//! host. Commands are written as output reports, while replies and
//! spontaneous events arrive as interrupt input reports at any time.
//!
//! This crate implements the host side of that exchange:
//!
//! - incoming reports are received on a dedicated background thread and
//!   buffered in a growable queue that never blocks the device
//! - a [`Transport`] hands out buffered messages via a timeout-bounded
//!   [`Transport::read`] and writes commands via [`Transport::write`]
//! - [`codec`] converts messages from and to their textual `0xHH,...` form
//!
//! # Quickstart
//!
//! This crate does not talk to HID devices directly. The trait used for
//! bridging a HID implementation to this crate is [`device::DeviceInterface`],
//! with [`device::Discovery`] finding the box among the connected devices.
//! The `usbbox-hid` crate implements both using `async-hid`, and
//! [`sim`] provides a simulated box for testing.
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use usbbox::{Message, Transport, TransportConfig, TransportError};
//! use usbbox_hid::AsyncHidDiscovery;
//!
//! let discovery = AsyncHidDiscovery::new()?;
//! let Some(transport) = Transport::open(&discovery, TransportConfig::default())? else {
//!     panic!("the box is not connected");
//! };
//!
//! // Replies arrive asynchronously. The first byte of every message is a
//! // tag matching a reply to the command that caused it.
//! transport.write(&Message::with_tag(0x52))?;
//! match transport.read_reply(0x52, Duration::from_millis(500), 5) {
//!     Ok(reply) => println!("clock was reset: {reply}"),
//!     Err(TransportError::Timeout) => println!("the box did not reply"),
//!     Err(err) => return Err(err.into()),
//! }
//!
//! // Closing waits for the background thread before releasing the device.
//! transport.close()?;
//! ```

pub mod codec;
pub mod config;
pub mod device;
mod ingest;
pub mod message;
pub mod queue;
pub mod sim;
pub mod transport;

pub use codec::CodecError;
pub use config::TransportConfig;
pub use device::{DeviceIdentity, DeviceInterface, Discovery};
pub use message::{MESSAGE_SIZE, Message};
pub use transport::{STATUS_OK, STATUS_TIMEOUT, Status, Transport, TransportError};
