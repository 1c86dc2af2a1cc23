//! Device and bridge settings
//!
//! These are the two halves of [`BridgeConfig`](super::BridgeConfig):
//!
//! - [`DeviceConfig`] - Which port to open and how (baud rate, 8N1 framing)
//! - [`BridgeSettings`] - Timing and limits for the reader loop
//!
//! Every field has a default, so a config file only needs to name what it
//! changes.

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity as SpParity, StopBits};
use std::time::Duration;

/// Default serial port
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM3";
/// Default serial port
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

/// Default baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default bounded read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Default first reconnect delay in milliseconds
pub const DEFAULT_RETRY_BASE_MS: u64 = 100;

/// Default cap on the reconnect delay in milliseconds
pub const DEFAULT_RETRY_MAX_MS: u64 = 2_000;

/// Default cap on a single line, in characters
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Default number of back-to-back decode errors tolerated before reconnecting
pub const DEFAULT_MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 64;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Parity setting for serial port configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl From<Parity> for SpParity {
    fn from(p: Parity) -> Self {
        match p {
            Parity::None => SpParity::None,
            Parity::Odd => SpParity::Odd,
            Parity::Even => SpParity::Even,
        }
    }
}

/// Serial device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Port path or identifier (e.g. `/dev/ttyACM0`, `COM3`)
    pub port: String,

    /// Baud rate
    pub baud_rate: u32,

    /// Data bits per character (5-8)
    pub data_bits: u8,

    /// Parity
    pub parity: Parity,

    /// Stop bits (1 or 2)
    pub stop_bits: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl DeviceConfig {
    /// Create a config for a port with the given baud rate and 8N1 framing
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Data bits as the serialport type (anything out of range falls back to 8)
    pub fn serial_data_bits(&self) -> DataBits {
        match self.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        }
    }

    /// Stop bits as the serialport type
    pub fn serial_stop_bits(&self) -> StopBits {
        match self.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        }
    }
}

/// Timing and limits for the bridge worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Upper bound on a single blocking read; the stop token is checked
    /// every time it expires
    pub read_timeout_ms: u64,

    /// First reconnect delay after a failed open
    pub retry_base_ms: u64,

    /// Reconnect delay cap
    pub retry_max_ms: u64,

    /// Longest line kept, in characters; longer lines are discarded
    pub max_line_length: usize,

    /// Decode errors in a row that are treated as a lost connection
    pub max_consecutive_decode_errors: u32,

    /// Capacity of the event channel handed to subscribers
    pub event_capacity: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            retry_max_ms: DEFAULT_RETRY_MAX_MS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_consecutive_decode_errors: DEFAULT_MAX_CONSECUTIVE_DECODE_ERRORS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl BridgeSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }
}
