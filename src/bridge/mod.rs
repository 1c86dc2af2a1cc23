//! Line bridge: background serial reader with a latest-only mailbox
//!
//! The bridge runs a [`BridgeWorker`] on its own thread. The worker owns the
//! device link, turns its byte stream into lines and publishes each line to
//! a single-slot [`Mailbox`]. The consumer polls that mailbox whenever it is
//! ready for a sample and only ever sees the newest line.
//!
//! # Architecture
//!
//! - [`LineBridge`] - Consumer-side handle: start, stop, read the latest line
//! - [`BridgeWorker`] - The read loop running on the background thread
//! - [`SharedStatus`] - State and counters the worker publishes for the consumer
//! - [`BridgeEvent`] - Optional notifications over a bounded channel
//!
//! # Example
//!
//! ```no_run
//! use linebridge::{BridgeConfig, LineBridge};
//! use std::time::Duration;
//!
//! let mut config = BridgeConfig::default();
//! config.device.port = "/dev/ttyACM0".to_string();
//!
//! let mut bridge = LineBridge::serial(config);
//! bridge.start()?;
//!
//! for _ in 0..50 {
//!     if let Some(record) = bridge.latest() {
//!         println!("{}", record.text);
//!     }
//!     std::thread::sleep(Duration::from_millis(100));
//! }
//!
//! bridge.stop()?;
//! # Ok::<(), linebridge::BridgeError>(())
//! ```

pub mod worker;

pub use worker::BridgeWorker;

use crate::cancel::StopToken;
use crate::config::BridgeConfig;
use crate::device::{DeviceLink, SerialLink};
use crate::error::{BridgeError, Result};
use crate::mailbox::Mailbox;
use crate::types::{BridgeEvent, BridgeState, BridgeStats, TextRecord};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

#[derive(Debug, Default)]
struct StatusSnapshot {
    state: BridgeState,
    stats: BridgeStats,
}

/// Bridge state and counters shared between the worker and the consumer
#[derive(Debug, Clone, Default)]
pub struct SharedStatus {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl SharedStatus {
    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the snapshot
    pub fn update(&self, state: BridgeState, stats: &BridgeStats) {
        let mut snapshot = self.lock();
        snapshot.state = state;
        snapshot.stats.clone_from(stats);
    }

    pub fn state(&self) -> BridgeState {
        self.lock().state
    }

    pub fn stats(&self) -> BridgeStats {
        self.lock().stats.clone()
    }
}

/// Background serial line reader
///
/// A bridge runs once: after it has been stopped a new one must be
/// constructed to read again. Dropping a running bridge stops it and waits
/// for the worker thread to exit.
pub struct LineBridge {
    config: BridgeConfig,
    /// Handed to the worker on start
    link: Option<Box<dyn DeviceLink>>,
    mailbox: Mailbox<TextRecord>,
    token: StopToken,
    status: SharedStatus,
    event_tx: Sender<BridgeEvent>,
    event_rx: Receiver<BridgeEvent>,
    worker: Option<JoinHandle<()>>,
}

impl LineBridge {
    /// Create a bridge over `link`
    pub fn new(link: impl DeviceLink + 'static, config: BridgeConfig) -> Self {
        Self::with_token(link, config, StopToken::new())
    }

    /// Create a bridge that stops when `token` is cancelled
    pub fn with_token(
        link: impl DeviceLink + 'static,
        config: BridgeConfig,
        token: StopToken,
    ) -> Self {
        let (event_tx, event_rx) = bounded(config.bridge.event_capacity);
        Self {
            config,
            link: Some(Box::new(link)),
            mailbox: Mailbox::new(),
            token,
            status: SharedStatus::default(),
            event_tx,
            event_rx,
            worker: None,
        }
    }

    /// Create a bridge over a real serial port described by `config.device`
    pub fn serial(config: BridgeConfig) -> Self {
        let link = SerialLink::new(config.device.clone());
        Self::new(link, config)
    }

    /// Spawn the worker thread
    ///
    /// Fails with [`BridgeError::Config`] if the configuration is invalid
    /// and with [`BridgeError::AlreadyStarted`] on a bridge that was
    /// started before.
    pub fn start(&mut self) -> Result<()> {
        self.config.validate()?;
        let link = self.link.take().ok_or(BridgeError::AlreadyStarted)?;

        let mut worker = BridgeWorker::new(
            self.config.device.clone(),
            self.config.bridge.clone(),
            link,
            self.mailbox.clone(),
            self.token.clone(),
            self.status.clone(),
            self.event_tx.clone(),
        );

        let handle = std::thread::Builder::new()
            .name(format!("linebridge-{}", self.config.device.port))
            .spawn(move || worker.run())
            .map_err(|e| BridgeError::Worker(format!("Failed to spawn worker: {}", e)))?;

        self.worker = Some(handle);
        Ok(())
    }

    /// Ask the worker to stop; returns immediately
    pub fn request_stop(&self) {
        self.token.cancel();
    }

    /// Wait for the worker thread to exit
    ///
    /// Returns immediately if the bridge was never started.
    pub fn join(&mut self) -> Result<()> {
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| BridgeError::Worker("Worker thread panicked".to_string())),
            None => Ok(()),
        }
    }

    /// Request stop and wait for the worker to exit
    pub fn stop(&mut self) -> Result<()> {
        self.request_stop();
        self.join()
    }

    /// Take the newest record, if one arrived since the last call
    pub fn latest(&self) -> Option<TextRecord> {
        self.mailbox.take()
    }

    /// Copy of the newest record without consuming it
    pub fn peek_latest(&self) -> Option<TextRecord> {
        self.mailbox.peek()
    }

    pub fn state(&self) -> BridgeState {
        self.status.state()
    }

    pub fn stats(&self) -> BridgeStats {
        self.status.stats()
    }

    /// Receiver for worker events
    ///
    /// Events that do not fit in the channel are dropped and counted in
    /// [`BridgeStats::dropped_events`].
    pub fn events(&self) -> Receiver<BridgeEvent> {
        self.event_rx.clone()
    }

    /// The token this bridge stops on
    pub fn stop_token(&self) -> StopToken {
        self.token.clone()
    }

    /// Whether the worker thread is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl Drop for LineBridge {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.request_stop();
            if let Err(e) = self.join() {
                tracing::error!("{}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ScriptedLink;

    #[test]
    fn test_bridge_creation() {
        let bridge = LineBridge::new(ScriptedLink::new(), BridgeConfig::default());
        assert_eq!(bridge.state(), BridgeState::Disconnected);
        assert!(!bridge.is_running());
        assert!(bridge.latest().is_none());
        assert_eq!(bridge.stats(), BridgeStats::default());
    }

    #[test]
    fn test_start_twice_fails() {
        let mut bridge = LineBridge::new(ScriptedLink::new(), BridgeConfig::default());
        bridge.start().unwrap();
        assert!(matches!(bridge.start(), Err(BridgeError::AlreadyStarted)));
        bridge.stop().unwrap();
        assert!(matches!(bridge.start(), Err(BridgeError::AlreadyStarted)));
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let mut config = BridgeConfig::default();
        config.bridge.retry_base_ms = 0;
        let mut bridge = LineBridge::new(ScriptedLink::new(), config);
        assert!(matches!(bridge.start(), Err(BridgeError::Config(_))));
        assert!(!bridge.is_running());

        let mut config = BridgeConfig::default();
        config.bridge.read_timeout_ms = 0;
        let device = ScriptedLink::new();
        let mut bridge = LineBridge::new(device.clone(), config);
        assert!(matches!(bridge.start(), Err(BridgeError::Config(_))));
        assert_eq!(device.open_attempts(), 0);
    }

    #[test]
    fn test_join_without_start() {
        let mut bridge = LineBridge::new(ScriptedLink::new(), BridgeConfig::default());
        assert!(bridge.join().is_ok());
    }

    #[test]
    fn test_shared_status_update() {
        let status = SharedStatus::default();
        let stats = BridgeStats {
            records_published: 3,
            ..Default::default()
        };
        status.update(BridgeState::Connected, &stats);
        assert_eq!(status.state(), BridgeState::Connected);
        assert_eq!(status.stats().records_published, 3);
    }

    #[test]
    fn test_external_token_stops_bridge() {
        let token = StopToken::new();
        let mut bridge =
            LineBridge::with_token(ScriptedLink::new(), BridgeConfig::default(), token.clone());
        bridge.start().unwrap();
        token.cancel();
        bridge.join().unwrap();
        assert_eq!(bridge.state(), BridgeState::Stopped);
    }
}
