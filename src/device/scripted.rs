//! Scripted device for testing without hardware
//!
//! [`ScriptedLink`] behaves like a serial port whose behaviour is decided by
//! the caller: bytes are fed in as if the device had sent them, opens can be
//! made to fail, and the device can be unplugged mid-read. Clones share the
//! same device, so a test keeps one clone to drive and inspect it while the
//! bridge owns another.
//!
//! # Example
//!
//! ```
//! use linebridge::device::{DeviceLink, ScriptedLink};
//! use std::time::Duration;
//!
//! let device = ScriptedLink::new();
//! let mut link = device.clone();
//!
//! device.fail_next_opens(1, "busy");
//! assert!(link.open("mock0", 115_200).is_err());
//! assert!(link.open("mock0", 115_200).is_ok());
//!
//! device.feed(b"ok\n");
//! assert_eq!(link.read_byte(Some(Duration::from_millis(10))), Ok(b'o'));
//! ```

use super::{DeviceHandle, DeviceLink};
use crate::error::{ConnectionError, ReadError};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One unit of scripted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Byte(u8),
    Fail(ReadError),
}

#[derive(Debug, Default)]
struct ScriptState {
    open: bool,
    handle: Option<DeviceHandle>,
    open_results: VecDeque<Result<(), String>>,
    input: VecDeque<Input>,
    open_attempts: u64,
    close_calls: u64,
    closes: u64,
    flushes: u64,
    flushed_bytes: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ScriptState>,
    arrived: Condvar,
}

/// In-memory [`DeviceLink`] driven by the caller
#[derive(Debug, Clone, Default)]
pub struct ScriptedLink {
    shared: Arc<Shared>,
}

impl ScriptedLink {
    /// Create a device that opens successfully and has no pending input
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` opens fail with `reason`
    pub fn fail_next_opens(&self, count: usize, reason: &str) {
        let mut state = self.state();
        for _ in 0..count {
            state.open_results.push_back(Err(reason.to_string()));
        }
    }

    /// Bytes the device sends
    pub fn feed(&self, bytes: &[u8]) {
        self.state()
            .input
            .extend(bytes.iter().copied().map(Input::Byte));
        self.shared.arrived.notify_all();
    }

    /// Queue a read failure after any input already fed
    pub fn inject_error(&self, err: ReadError) {
        self.state().input.push_back(Input::Fail(err));
        self.shared.arrived.notify_all();
    }

    /// Simulate pulling the cable: the pending input is lost and the next
    /// read fails with [`ReadError::Closed`]
    pub fn unplug(&self) {
        let mut state = self.state();
        state.input.clear();
        state.input.push_back(Input::Fail(ReadError::Closed));
        drop(state);
        self.shared.arrived.notify_all();
    }

    /// Whether the device is currently open
    pub fn is_device_open(&self) -> bool {
        self.state().open
    }

    /// Number of calls to `open`, successful or not
    pub fn open_attempts(&self) -> u64 {
        self.state().open_attempts
    }

    /// Number of calls to `close`
    pub fn close_calls(&self) -> u64 {
        self.state().close_calls
    }

    /// Number of times an open device was actually closed
    pub fn closes(&self) -> u64 {
        self.state().closes
    }

    /// Number of calls to `flush_input` on an open device
    pub fn flushes(&self) -> u64 {
        self.state().flushes
    }

    /// Bytes discarded by `flush_input`
    pub fn flushed_bytes(&self) -> u64 {
        self.state().flushed_bytes
    }

    /// Bytes fed but not yet read or flushed
    pub fn pending_input(&self) -> usize {
        self.state()
            .input
            .iter()
            .filter(|i| matches!(i, Input::Byte(_)))
            .count()
    }
}

impl DeviceLink for ScriptedLink {
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<(), ConnectionError> {
        let mut state = self.state();
        state.open_attempts += 1;
        if state.open {
            state.open = false;
            state.closes += 1;
        }
        if let Some(Err(reason)) = state.open_results.pop_front() {
            return Err(ConnectionError::new(port, reason));
        }
        // A read failure left over from the previous connection is stale
        state.input.retain(|i| matches!(i, Input::Byte(_)));
        state.open = true;
        state.handle = Some(DeviceHandle {
            port: port.to_string(),
            baud_rate,
            open: true,
        });
        Ok(())
    }

    fn read_byte(&mut self, timeout: Option<Duration>) -> Result<u8, ReadError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state();
        loop {
            if !state.open {
                return Err(ReadError::Closed);
            }
            match state.input.pop_front() {
                Some(Input::Byte(b)) => return Ok(b),
                Some(Input::Fail(err)) => {
                    if err == ReadError::Closed {
                        state.open = false;
                        state.closes += 1;
                        if let Some(ref mut handle) = state.handle {
                            handle.open = false;
                        }
                    }
                    return Err(err);
                }
                None => {}
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(ReadError::TimedOut);
                    }
                    self.shared
                        .arrived
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .shared
                    .arrived
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn flush_input(&mut self) -> Result<(), ReadError> {
        let mut state = self.state();
        if !state.open {
            return Err(ReadError::Closed);
        }
        let before = state.input.len();
        state.input.retain(|i| !matches!(i, Input::Byte(_)));
        state.flushed_bytes += (before - state.input.len()) as u64;
        state.flushes += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.close_calls += 1;
        if state.open {
            state.open = false;
            state.closes += 1;
            if let Some(ref mut handle) = state.handle {
                handle.open = false;
            }
        }
        drop(state);
        // Wake a reader blocked without a timeout
        self.shared.arrived.notify_all();
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn handle(&self) -> Option<DeviceHandle> {
        self.state().handle.clone()
    }
}
