//! Serial device access
//!
//! This module provides the [`DeviceLink`] trait, the boundary between the
//! bridge and the byte source, along with its implementations:
//!
//! - [`SerialLink`] - Real serial ports via the `serialport` crate
//! - [`ScriptedLink`] - In-memory device whose input, open failures and
//!   disconnects are driven by the caller (tests, `--mock` mode)
//!
//! A link never retries on its own. Every failure is reported to the caller,
//! which owns the retry policy.

pub mod scripted;
pub mod serial;

pub use scripted::ScriptedLink;
pub use serial::{list_ports, PortSummary, SerialLink};

use crate::error::{ConnectionError, ReadError};
use std::time::Duration;

/// Identity and state of the connection a link manages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Port path or identifier
    pub port: String,
    /// Baud rate the port was opened at
    pub baud_rate: u32,
    /// Whether the port is currently open
    pub open: bool,
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.open { "open" } else { "closed" };
        write!(f, "{} @ {} baud ({})", self.port, self.baud_rate, state)
    }
}

/// Lifecycle and byte-level access to one serial connection
///
/// Implementations must be `Send` so the bridge can own the link on its
/// worker thread.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceLink: Send {
    /// Open the device
    ///
    /// An already-open link is closed first.
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ConnectionError>;

    /// Read one byte
    ///
    /// `None` blocks until a byte arrives or the device goes away.
    fn read_byte(&mut self, timeout: Option<Duration>) -> Result<u8, ReadError>;

    /// Discard any bytes received but not yet read
    fn flush_input(&mut self) -> Result<(), ReadError>;

    /// Release the device; calling it on a closed link does nothing
    fn close(&mut self);

    /// Whether the device is open
    fn is_open(&self) -> bool;

    /// The current (or last) connection, if the link was ever opened
    fn handle(&self) -> Option<DeviceHandle>;
}

impl DeviceLink for Box<dyn DeviceLink> {
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ConnectionError> {
        (**self).open(port, baud_rate)
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> Result<u8, ReadError> {
        (**self).read_byte(timeout)
    }

    fn flush_input(&mut self) -> Result<(), ReadError> {
        (**self).flush_input()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn handle(&self) -> Option<DeviceHandle> {
        (**self).handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        let handle = DeviceHandle {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            open: true,
        };
        assert_eq!(handle.to_string(), "/dev/ttyACM0 @ 115200 baud (open)");
    }

    #[test]
    fn test_boxed_link_forwards() {
        let mut link: Box<dyn DeviceLink> = Box::new(ScriptedLink::new());
        assert!(!link.is_open());
        link.open("mock0", 9600).unwrap();
        assert!(link.is_open());
        assert_eq!(link.handle().map(|h| h.baud_rate), Some(9600));
        link.close();
        assert!(!link.is_open());
    }
}
