//! Single-slot, last-write-wins handoff between the worker and the consumer
//!
//! A live consumer only cares about the newest sample, so publishing replaces
//! whatever is in the slot. Nothing queues up behind a slow consumer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared single-slot container
///
/// Cloning yields another handle to the same slot.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Mailbox<T> {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    // A panic while holding the lock cannot leave the slot half-written
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the contents, returning the value that was never read
    pub fn publish(&self, value: T) -> Option<T> {
        self.lock().replace(value)
    }

    /// Take the contents, leaving the slot empty
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    /// Whether the slot is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

impl<T: Clone> Mailbox<T> {
    /// Copy of the contents, leaving them in place
    pub fn peek(&self) -> Option<T> {
        self.lock().clone()
    }
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
