//! Connects the `usbbox` transport to real devices.
//!
//! [`AsyncHidDiscovery`] enumerates HID devices using the `async-hid` crate
//! and opens them as [`AsyncHidInterface`]s, which can be handed to
//! [`usbbox::Transport::open`]:
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use usbbox::{Message, Transport, TransportConfig};
//! use usbbox_hid::AsyncHidDiscovery;
//!
//! let discovery = AsyncHidDiscovery::new().expect("could not start HID runtime");
//! let transport = Transport::open(&discovery, TransportConfig::default())
//!     .expect("could not open the box")
//!     .expect("the box is not connected");
//!
//! transport.write(&Message::with_tag(0x52)).unwrap();
//! let reply = transport.read(Duration::from_millis(500)).unwrap();
//! println!("{reply}");
//! ```

mod async_hid_impl;

pub use async_hid_impl::{AsyncHidCandidate, AsyncHidDiscovery, AsyncHidError, AsyncHidInterface};
