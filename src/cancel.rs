//! Cooperative cancellation for the bridge worker
//!
//! A [`StopToken`] is handed to the worker at construction and checked on
//! every loop iteration. Cancelling also wakes any
//! [`wait_timeout`](StopToken::wait_timeout) in progress, so a worker sleeping
//! through a reconnect backoff stops immediately instead of finishing the
//! delay.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Shared stop signal
///
/// Clones observe and control the same signal. Once cancelled a token stays
/// cancelled.
#[derive(Debug, Clone)]
pub struct StopToken {
    cancelled: Arc<AtomicBool>,
    // Dropping the sender disconnects every receiver, which wakes waiters
    wake_tx: Arc<Mutex<Option<Sender<()>>>>,
    wake_rx: Receiver<()>,
}

impl StopToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            wake_tx: Arc::new(Mutex::new(Some(tx))),
            wake_rx: rx,
        }
    }

    /// Request stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether stop has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for up to `timeout`, returning early if cancelled
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.is_cancelled(),
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
