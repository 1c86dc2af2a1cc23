//! Core data types shared between the bridge worker and its consumer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One complete line received from the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRecord {
    /// Decoded line, without its terminator
    pub text: String,
    /// Position of this record in the bridge's output (first record is 1)
    pub sequence: u64,
    /// Wall-clock time the terminator was seen
    pub received_at: DateTime<Utc>,
}

impl TextRecord {
    /// Create a record stamped with the current time
    pub fn new(text: impl Into<String>, sequence: u64) -> Self {
        Self {
            text: text.into(),
            sequence,
            received_at: Utc::now(),
        }
    }

    /// Whitespace-separated fields of the line
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.text.split_whitespace()
    }

    /// Parse every field as a number
    ///
    /// Sensor sketches typically print lines like `12.5 3.2`. Fails on the
    /// first field that is not a number.
    pub fn values(&self) -> Result<Vec<f64>, std::num::ParseFloatError> {
        self.fields().map(str::parse::<f64>).collect()
    }
}

impl std::fmt::Display for TextRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Lifecycle state of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BridgeState {
    /// No open handle; the worker keeps trying to open the device
    #[default]
    Disconnected,
    /// Reading and framing lines
    Connected,
    /// Terminal; the device has been closed and the worker has exited
    Stopped,
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeState::Disconnected => write!(f, "Disconnected"),
            BridgeState::Connected => write!(f, "Connected"),
            BridgeState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Counters maintained by the bridge worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    /// Records written to the mailbox
    pub records_published: u64,
    /// Raw bytes read from the device
    pub bytes_read: u64,
    /// Bytes dropped because they were not valid text
    pub bytes_dropped: u64,
    /// Lines discarded for exceeding the length limit
    pub lines_discarded: u64,
    /// Calls to open
    pub connect_attempts: u64,
    /// Failed calls to open
    pub connect_failures: u64,
    /// Connected -> Disconnected transitions
    pub disconnects: u64,
    /// Input flushes after publishing
    pub flushes: u64,
    /// Events dropped because the subscriber did not keep up
    pub dropped_events: u64,
}

impl BridgeStats {
    /// Percentage of open attempts that succeeded
    pub fn connect_success_rate(&self) -> f64 {
        if self.connect_attempts == 0 {
            100.0
        } else {
            let ok = self.connect_attempts - self.connect_failures;
            (ok as f64 / self.connect_attempts as f64) * 100.0
        }
    }
}

/// Notification sent from the worker to a subscribed consumer
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The bridge moved to a new state
    StateChanged(BridgeState),
    /// Opening the device failed
    ConnectionFailed(String),
    /// A record was published to the mailbox
    RecordPublished { sequence: u64 },
}
