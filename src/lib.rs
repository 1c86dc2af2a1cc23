//! # linebridge: latest-line serial reader
//!
//! Reads newline-terminated text from a serial device (typically a
//! microcontroller printing sensor values) on a background thread and hands
//! the newest complete line to a consumer through a single-slot mailbox.
//!
//! ## Architecture
//!
//! - **Device**: [`DeviceLink`] trait over a serial connection; [`SerialLink`]
//!   for real ports, [`ScriptedLink`] for tests and demos
//! - **Framing**: [`LineFramer`] skips the partial line a reader attaches
//!   into, then captures the next full line, dropping invalid UTF-8
//! - **Bridge**: [`LineBridge`] runs the reconnecting read loop on its own
//!   thread and publishes into a [`Mailbox`]
//! - **Cancellation**: [`StopToken`] passed in at construction; reads are
//!   bounded so a stop request is seen promptly
//!
//! ## Configuration
//!
//! [`BridgeConfig`] is loaded from TOML; see [`config`] for the format and
//! the default file location.
//!
//! ## Example
//!
//! ```
//! use linebridge::{BridgeConfig, BridgeState, LineBridge, ScriptedLink};
//! use std::time::{Duration, Instant};
//!
//! let device = ScriptedLink::new();
//! let mut bridge = LineBridge::new(device.clone(), BridgeConfig::default());
//! bridge.start()?;
//!
//! device.feed(b"junk\r\n12.5 3.2\r\n");
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! let record = loop {
//!     if let Some(record) = bridge.latest() {
//!         break record;
//!     }
//!     assert!(Instant::now() < deadline);
//!     std::thread::sleep(Duration::from_millis(5));
//! };
//! assert_eq!(record.text, "12.5 3.2");
//! assert_eq!(record.values().unwrap(), vec![12.5, 3.2]);
//!
//! bridge.stop()?;
//! assert_eq!(bridge.state(), BridgeState::Stopped);
//! # Ok::<(), linebridge::BridgeError>(())
//! ```

pub mod backoff;
pub mod bridge;
pub mod cancel;
pub mod config;
pub mod device;
pub mod error;
pub mod framing;
pub mod mailbox;
pub mod types;

// Re-export commonly used types
pub use bridge::LineBridge;
pub use cancel::StopToken;
pub use config::{BridgeConfig, BridgeSettings, DeviceConfig};
pub use device::{DeviceHandle, DeviceLink, ScriptedLink, SerialLink};
pub use error::{BridgeError, ConnectionError, ReadError, Result};
pub use framing::LineFramer;
pub use mailbox::Mailbox;
pub use types::{BridgeEvent, BridgeState, BridgeStats, TextRecord};
