//! Bridge Worker Thread Implementation
//!
//! This module contains the loop that runs on the bridge's background thread.
//! It owns the [`DeviceLink`] and drives it through three states:
//!
//! - **Disconnected**: try to open the device; on failure wait a backoff
//!   delay (cut short by a stop request) and try again
//! - **Connected**: read bytes with a bounded timeout, frame them into a
//!   line, publish the line to the mailbox, then flush the device's input
//! - **Stopped**: close the device and exit; nothing leaves this state
//!
//! # Error Recovery
//!
//! Nothing that goes wrong with the device is fatal. A failed open is retried,
//! a lost device sends the worker back to Disconnected, and an undecodable
//! byte is dropped. Only a long run of undecodable bytes (a baud mismatch, a
//! disconnected line picking up noise) is treated as a lost connection.
//!
//! # Stop Latency
//!
//! Each read waits at most `read_timeout_ms`, and the stop token is checked
//! after every read, so a stop request is honoured within one read timeout
//! even when the device has gone silent mid-line.

use crate::backoff::Backoff;
use crate::bridge::SharedStatus;
use crate::cancel::StopToken;
use crate::config::{BridgeSettings, DeviceConfig};
use crate::device::DeviceLink;
use crate::error::ReadError;
use crate::framing::{FrameOutput, LineFramer};
use crate::mailbox::Mailbox;
use crate::types::{BridgeEvent, BridgeState, BridgeStats, TextRecord};
use crossbeam_channel::Sender;

/// The worker that runs the read loop
pub struct BridgeWorker {
    /// Port and baud rate to open
    device: DeviceConfig,
    /// Timing and limits
    settings: BridgeSettings,
    /// Device access
    link: Box<dyn DeviceLink>,
    /// Line framer for the current connection
    framer: LineFramer,
    /// Where records are published
    mailbox: Mailbox<TextRecord>,
    /// Stop signal
    token: StopToken,
    /// State and stats visible to the consumer
    status: SharedStatus,
    /// Event sender to the consumer
    events: Sender<BridgeEvent>,
    /// Reconnect delay
    backoff: Backoff,
    /// Current state
    state: BridgeState,
    /// Local stats, copied to `status` at checkpoints
    stats: BridgeStats,
    /// Sequence number of the last published record
    sequence: u64,
    /// Undecodable bytes seen since the last good one
    consecutive_decode_errors: u32,
}

impl BridgeWorker {
    /// Create a new worker
    pub fn new(
        device: DeviceConfig,
        settings: BridgeSettings,
        link: Box<dyn DeviceLink>,
        mailbox: Mailbox<TextRecord>,
        token: StopToken,
        status: SharedStatus,
        events: Sender<BridgeEvent>,
    ) -> Self {
        let framer = LineFramer::new(settings.max_line_length);
        let backoff = Backoff::new(settings.retry_base(), settings.retry_max());

        Self {
            device,
            settings,
            link,
            framer,
            mailbox,
            token,
            status,
            events,
            backoff,
            state: BridgeState::Disconnected,
            stats: BridgeStats::default(),
            sequence: 0,
            consecutive_decode_errors: 0,
        }
    }

    /// Run until the stop token is cancelled
    pub fn run(&mut self) {
        tracing::info!("Bridge worker started on {}", self.device.port);

        while !self.token.is_cancelled() {
            self.step();
        }

        self.stop();
        tracing::info!("Bridge worker stopped");
    }

    /// One iteration of the state machine
    fn step(&mut self) {
        match self.state {
            BridgeState::Disconnected => self.try_connect(),
            BridgeState::Connected => self.read_once(),
            BridgeState::Stopped => {}
        }
    }

    /// Attempt to open the device
    fn try_connect(&mut self) {
        self.stats.connect_attempts += 1;

        match self.link.open(&self.device.port, self.device.baud_rate) {
            Ok(()) => {
                if self.backoff.attempt() > 0 {
                    tracing::info!(
                        "Connected to {} after {} failed attempts",
                        self.device.port,
                        self.backoff.attempt()
                    );
                } else {
                    tracing::info!(
                        "Connected to {} at {} baud",
                        self.device.port,
                        self.device.baud_rate
                    );
                }
                self.backoff.reset();
                self.framer.reset();
                self.consecutive_decode_errors = 0;
                self.set_state(BridgeState::Connected);
            }
            Err(e) => {
                self.stats.connect_failures += 1;
                // Only the first failure of a run is worth a warning
                if self.backoff.attempt() == 0 {
                    tracing::warn!("{}; retrying", e);
                } else {
                    tracing::debug!("{} (attempt {})", e, self.backoff.attempt() + 1);
                }
                self.try_send_event(BridgeEvent::ConnectionFailed(e.to_string()));
                self.sync_status();

                let delay = self.backoff.next_delay();
                self.token.wait_timeout(delay);
            }
        }
    }

    /// Read one byte and feed it to the framer
    fn read_once(&mut self) {
        match self.link.read_byte(Some(self.settings.read_timeout())) {
            Ok(byte) => {
                self.stats.bytes_read += 1;
                let output = self.framer.push(byte);

                // Only a decoded character ends a run of bad bytes; a byte
                // that starts or continues a multi-byte sequence does not
                if output.is_decoded() {
                    self.stats.bytes_dropped += output.dropped() as u64;
                    self.consecutive_decode_errors = 0;
                } else if output.dropped() > 0 {
                    self.record_decode_errors(output.dropped() as u32);
                }

                match output {
                    FrameOutput::Line { text, .. } => self.publish(text),
                    FrameOutput::Overflow { .. } => {
                        self.stats.lines_discarded += 1;
                        tracing::debug!(
                            "Discarded line longer than {} characters",
                            self.settings.max_line_length
                        );
                    }
                    FrameOutput::Pending
                    | FrameOutput::Decoded { .. }
                    | FrameOutput::Dropped(_) => {}
                }
            }
            Err(ReadError::TimedOut) => {
                // Quiet line; good moment to refresh what the consumer sees
                self.sync_status();
            }
            Err(ReadError::Decode(_)) => self.record_decode_errors(1),
            Err(ReadError::Closed) => self.disconnect("device closed"),
        }
    }

    /// Publish a completed line and flush the device's backlog
    fn publish(&mut self, text: String) {
        self.sequence += 1;
        let record = TextRecord::new(text, self.sequence);
        tracing::trace!(sequence = record.sequence, "Publishing {:?}", record.text);

        if self.mailbox.publish(record).is_some() {
            tracing::trace!("Previous record replaced before it was read");
        }
        self.stats.records_published += 1;
        self.try_send_event(BridgeEvent::RecordPublished {
            sequence: self.sequence,
        });

        match self.link.flush_input() {
            Ok(()) => self.stats.flushes += 1,
            Err(ReadError::Closed) => {
                self.disconnect("device closed during flush");
                return;
            }
            Err(e) => tracing::debug!("Flush failed: {}", e),
        }
        self.sync_status();
    }

    /// Count undecodable bytes; a long run of them means the link is bad
    fn record_decode_errors(&mut self, count: u32) {
        self.stats.bytes_dropped += u64::from(count);
        self.consecutive_decode_errors = self.consecutive_decode_errors.saturating_add(count);

        if self.consecutive_decode_errors > self.settings.max_consecutive_decode_errors {
            tracing::warn!(
                "{} undecodable bytes in a row from {}",
                self.consecutive_decode_errors,
                self.device.port
            );
            self.disconnect("too many decode errors");
        }
    }

    /// Close the link and go back to Disconnected
    fn disconnect(&mut self, reason: &str) {
        tracing::warn!("Lost connection to {}: {}", self.device.port, reason);
        self.link.close();
        self.framer.reset();
        self.consecutive_decode_errors = 0;
        self.stats.disconnects += 1;
        self.set_state(BridgeState::Disconnected);
    }

    /// Close the link unconditionally and enter the terminal state
    fn stop(&mut self) {
        self.link.close();
        self.framer.reset();
        self.set_state(BridgeState::Stopped);
    }

    fn set_state(&mut self, state: BridgeState) {
        if self.state == state {
            return;
        }
        tracing::debug!("Bridge state {} -> {}", self.state, state);
        self.state = state;
        self.try_send_event(BridgeEvent::StateChanged(state));
        self.sync_status();
    }

    /// Copy state and stats to the consumer-visible snapshot
    fn sync_status(&self) {
        self.status.update(self.state, &self.stats);
    }

    /// Send an event without blocking; count it if the consumer is behind
    fn try_send_event(&mut self, event: BridgeEvent) {
        if self.events.try_send(event).is_err() {
            self.stats.dropped_events += 1;
        }
    }
}
